/*!
Direct Gaussian generator engine.

Not a Markov chain: every iteration draws an independent sample from the
configured `gaussian` model. Useful as a data generator and as a baseline
whose diagnostics are trivially clean — independent draws have ESS near the
draw count and R-hat near 1.
*/

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use indicatif::MultiProgress;

use crate::distributions::{DiagGaussian, Target};
use crate::error::{Error, Result};
use crate::fit::{ChainTrace, RunResult};
use crate::model::{Model, ModelKind};
use crate::sampler::{chain_progress_bar, Engine, RunSettings};

#[derive(Debug)]
pub struct GaussianEngine;

impl Engine for GaussianEngine {
    fn key(&self) -> &'static str {
        "gaussian"
    }

    fn run(&self, model: &Model, settings: &RunSettings) -> Result<RunResult> {
        let gaussian = match &model.kind {
            ModelKind::Gaussian(g) => g,
            other => {
                return Err(Error::Config(format!(
                    "the gaussian engine requires a gaussian model, got {other:?}"
                )))
            }
        };
        gaussian.validate()?;

        let multi = MultiProgress::new();
        let chains: Vec<Result<ChainTrace>> = (0..settings.chains)
            .into_par_iter()
            .map(|chain| {
                let pb =
                    chain_progress_bar(&multi, chain, settings.iter as u64, settings.progress);
                let trace = run_chain(gaussian, settings, chain, &pb);
                pb.finish_with_message("Done!");
                trace
            })
            .collect();
        let chains = chains.into_iter().collect::<Result<Vec<_>>>()?;

        Ok(RunResult {
            engine: self.key().to_string(),
            param_names: gaussian.param_names(),
            chains,
            seed: settings.seed,
            thin: settings.thin,
            max_depth: settings.max_depth,
        })
    }
}

fn run_chain(
    gaussian: &DiagGaussian,
    settings: &RunSettings,
    chain: usize,
    pb: &indicatif::ProgressBar,
) -> Result<ChainTrace> {
    let mut rng = SmallRng::seed_from_u64(settings.seed.wrapping_add(chain as u64));
    let normals: Vec<Normal<f64>> = gaussian
        .mean
        .iter()
        .zip(gaussian.sigma.iter())
        .map(|(&m, &s)| {
            Normal::new(m, s).map_err(|err| Error::Model(format!("invalid gaussian: {err}")))
        })
        .collect::<Result<_>>()?;

    let recorded = settings.warmup + settings.kept_iterations();
    let mut trace = ChainTrace {
        draws: Vec::with_capacity(recorded),
        lp: Vec::with_capacity(recorded),
        divergent: Vec::with_capacity(recorded),
        treedepth: Vec::with_capacity(recorded),
        energy: Vec::with_capacity(recorded),
        is_sample: Vec::with_capacity(recorded),
    };

    for i in 0..settings.iter {
        let draw: Vec<f64> = normals.iter().map(|n| n.sample(&mut rng)).collect();
        let logp = gaussian.unnorm_logp(&draw);

        let keep = if i < settings.warmup {
            Some(false)
        } else if (i - settings.warmup) % settings.thin == 0 {
            Some(true)
        } else {
            None
        };
        if let Some(is_sample) = keep {
            trace.draws.push(draw);
            trace.lp.push(logp);
            trace.divergent.push(false);
            trace.treedepth.push(0);
            trace.energy.push(-logp);
            trace.is_sample.push(is_sample);
        }
        pb.inc(1);
    }

    Ok(trace)
}
