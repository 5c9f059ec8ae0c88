/*!
Random-walk Metropolis engine.

Classic Metropolis with an isotropic Gaussian proposal: propose
`q' = q + step_size * z`, accept with probability
`min(1, exp(logp(q') - logp(q)))`. No trajectory is built, so the recorded
tree depths are zero and nothing can diverge; the energy trace carries the
negative log-density, the potential-energy analogue the E-BFMI check reads.
*/

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use indicatif::MultiProgress;

use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::fit::{ChainTrace, RunResult};
use crate::model::Model;
use crate::sampler::{chain_progress_bar, Engine, RunSettings};

#[derive(Debug)]
pub struct RandomWalkEngine;

impl Engine for RandomWalkEngine {
    fn key(&self) -> &'static str {
        "rwm"
    }

    fn run(&self, model: &Model, settings: &RunSettings) -> Result<RunResult> {
        let multi = MultiProgress::new();
        let chains: Vec<Result<ChainTrace>> = (0..settings.chains)
            .into_par_iter()
            .map(|chain| {
                let pb =
                    chain_progress_bar(&multi, chain, settings.iter as u64, settings.progress);
                let trace = run_chain(&model.kind, settings, chain, &pb);
                pb.finish_with_message("Done!");
                trace
            })
            .collect();
        let chains = chains.into_iter().collect::<Result<Vec<_>>>()?;

        Ok(RunResult {
            engine: self.key().to_string(),
            param_names: model.kind.param_names(),
            chains,
            seed: settings.seed,
            thin: settings.thin,
            max_depth: settings.max_depth,
        })
    }
}

fn run_chain(
    target: &(impl Target + Sync),
    settings: &RunSettings,
    chain: usize,
    pb: &indicatif::ProgressBar,
) -> Result<ChainTrace> {
    let mut rng = SmallRng::seed_from_u64(settings.seed.wrapping_add(chain as u64));
    let mut q = settings.init[chain].clone();
    let mut logp = target.unnorm_logp(&q);
    if !logp.is_finite() {
        return Err(Error::Model(format!(
            "chain {chain}: initial position has non-finite log-density"
        )));
    }

    let recorded = settings.warmup + settings.kept_iterations();
    let mut trace = ChainTrace {
        draws: Vec::with_capacity(recorded),
        lp: Vec::with_capacity(recorded),
        divergent: Vec::with_capacity(recorded),
        treedepth: Vec::with_capacity(recorded),
        energy: Vec::with_capacity(recorded),
        is_sample: Vec::with_capacity(recorded),
    };

    let mut accepted = 0u64;
    let record = |trace: &mut ChainTrace, q: &[f64], logp: f64, is_sample: bool| {
        trace.draws.push(q.to_vec());
        trace.lp.push(logp);
        trace.divergent.push(false);
        trace.treedepth.push(0);
        trace.energy.push(-logp);
        trace.is_sample.push(is_sample);
    };

    for i in 0..settings.iter {
        let proposal: Vec<f64> = q
            .iter()
            .map(|&x| {
                let z: f64 = StandardNormal.sample(&mut rng);
                x + settings.step_size * z
            })
            .collect();
        let proposal_logp = target.unnorm_logp(&proposal);
        if (rng.gen::<f64>()).ln() < proposal_logp - logp {
            q = proposal;
            logp = proposal_logp;
            accepted += 1;
        }

        if i < settings.warmup {
            record(&mut trace, &q, logp, false);
        } else if (i - settings.warmup) % settings.thin == 0 {
            record(&mut trace, &q, logp, true);
        }

        pb.inc(1);
        if (i + 1) % 100 == 0 {
            pb.set_message(format!("AcceptRate={:.3}", accepted as f64 / (i + 1) as f64));
        }
    }

    Ok(trace)
}
