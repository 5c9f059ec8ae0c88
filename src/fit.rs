/*!
The result of a sampling run.

[`RunResult`] owns everything an engine produced: per-chain draw matrices
(warm-up included), the sampler-internal diagnostic traces, the log-density
trace, and an `is_sample` indicator marking which iterations are post-warm-up
keepers. The convergence checks in [`crate::diagnostics`] and the output
writers in [`crate::io`] both read from this one immutable value.
*/

use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats;

/// Name under which the log-density trace is exposed by [`RunResult::extract`].
pub const LP_NAME: &str = "lp__";

/// Everything recorded for a single chain, warm-up iterations included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTrace {
    /// Draw matrix, one row per recorded iteration.
    pub draws: Vec<Vec<f64>>,
    /// Unnormalized log-density per iteration.
    pub lp: Vec<f64>,
    /// Divergence flag per iteration.
    pub divergent: Vec<bool>,
    /// Tree depth per iteration (0 for engines without trajectory trees).
    pub treedepth: Vec<u32>,
    /// Energy per iteration.
    pub energy: Vec<f64>,
    /// False during warm-up, true for kept iterations.
    pub is_sample: Vec<bool>,
}

impl ChainTrace {
    /// Number of leading warm-up iterations.
    pub fn warmup_len(&self) -> usize {
        self.is_sample.iter().filter(|&&s| !s).count()
    }

    /// Number of kept iterations.
    pub fn kept_len(&self) -> usize {
        self.is_sample.len() - self.warmup_len()
    }
}

/// Per-chain sampler-internal diagnostic traces.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerParams {
    pub divergent: Vec<bool>,
    pub treedepth: Vec<u32>,
    pub energy: Vec<f64>,
}

/// Immutable result of a full multi-chain sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Registry key of the engine that produced this result.
    pub engine: String,
    /// Parameter names, in draw-column order.
    pub param_names: Vec<String>,
    pub chains: Vec<ChainTrace>,
    /// Base seed of the run.
    pub seed: u64,
    /// Thinning interval applied to the kept iterations.
    pub thin: usize,
    /// Maximum tree depth the run was configured with.
    pub max_depth: usize,
}

impl RunResult {
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    pub fn n_params(&self) -> usize {
        self.param_names.len()
    }

    /// Total kept iterations across all chains.
    pub fn total_kept(&self) -> usize {
        self.chains.iter().map(|c| c.kept_len()).sum()
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    /// Sampler-internal traces per chain, optionally with warm-up included.
    pub fn sampler_params(&self, inc_warmup: bool) -> Vec<SamplerParams> {
        self.chains
            .iter()
            .map(|chain| {
                let skip = if inc_warmup { 0 } else { chain.warmup_len() };
                SamplerParams {
                    divergent: chain.divergent[skip..].to_vec(),
                    treedepth: chain.treedepth[skip..].to_vec(),
                    energy: chain.energy[skip..].to_vec(),
                }
            })
            .collect()
    }

    /// Combined post-warm-up trace of a named parameter (or [`LP_NAME`]),
    /// chains concatenated in order.
    pub fn extract(&self, name: &str) -> Result<Vec<f64>> {
        if name == LP_NAME {
            return Ok(self
                .chains
                .iter()
                .flat_map(|chain| chain.lp[chain.warmup_len()..].iter().copied())
                .collect());
        }
        let index = self
            .param_index(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;
        Ok(self
            .chains
            .iter()
            .flat_map(|chain| {
                chain.draws[chain.warmup_len()..]
                    .iter()
                    .map(move |draw| draw[index])
            })
            .collect())
    }

    /// Post-warm-up draws as a `[chain][draw][param]` array.
    ///
    /// All chains are expected to keep the same number of iterations; the
    /// shortest chain bounds the array otherwise.
    pub fn draws_array(&self) -> Array3<f64> {
        let n_chains = self.n_chains();
        let n_params = self.n_params();
        let kept = self
            .chains
            .iter()
            .map(|c| c.kept_len())
            .min()
            .unwrap_or(0);
        let mut out = Array3::<f64>::zeros((n_chains, kept, n_params));
        for (c, chain) in self.chains.iter().enumerate() {
            let warmup = chain.warmup_len();
            for d in 0..kept {
                for p in 0..n_params {
                    out[[c, d, p]] = chain.draws[warmup + d][p];
                }
            }
        }
        out
    }

    /// The summary table: one row per parameter with mean, MCSE of the mean,
    /// standard deviation, the requested quantiles, effective sample size and
    /// potential scale reduction. Computed on demand, never cached.
    pub fn summary(&self, probs: &[f64]) -> Summary {
        let draws = self.draws_array();
        let (rhat, n_eff) = stats::split_rhat_ess(draws.view());

        let rows = self
            .param_names
            .iter()
            .enumerate()
            .map(|(p, name)| {
                let combined: Vec<f64> = draws
                    .axis_iter(Axis(0))
                    .flat_map(|chain| chain.column(p).to_vec())
                    .collect();
                let mean = stats::mean(&combined);
                let sd = stats::sample_variance(&combined).sqrt();
                let se_mean = if n_eff[p] > 0.0 {
                    sd / n_eff[p].sqrt()
                } else {
                    f64::NAN
                };
                let mut sorted = combined;
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Greater));
                let quantiles = probs
                    .iter()
                    .map(|&q| stats::quantile_sorted(&sorted, q))
                    .collect();
                SummaryRow {
                    name: name.clone(),
                    mean,
                    se_mean,
                    sd,
                    quantiles,
                    n_eff: n_eff[p],
                    rhat: rhat[p],
                }
            })
            .collect();

        Summary {
            probs: probs.to_vec(),
            rows,
        }
    }
}

/// Per-parameter summary table derived from a [`RunResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Quantile probabilities the rows were computed with.
    pub probs: Vec<f64>,
    pub rows: Vec<SummaryRow>,
}

/// One summary table row.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub name: String,
    pub mean: f64,
    pub se_mean: f64,
    pub sd: f64,
    pub quantiles: Vec<f64>,
    pub n_eff: f64,
    pub rhat: f64,
}
