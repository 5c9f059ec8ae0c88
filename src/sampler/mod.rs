/*!
Sampling engines.

An [`Engine`] takes a resolved model plus [`RunSettings`] and produces a
[`RunResult`]. Engines are looked up by string key in a fixed registry —
the job file's `run.engine` selects one of a closed set of statically-known
implementations:

- `"nuts"` — No-U-Turn sampler with dual-averaging step size adaptation
- `"rwm"` — random-walk Metropolis with an isotropic Gaussian proposal
- `"gaussian"` — direct Gaussian generator (no Markov chain at all)

Chains run in parallel via `rayon`, each with its own progress bar.
*/

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::config::RunConfig;
use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::fit::RunResult;
use crate::model::Model;

pub mod gaussian;
pub mod metropolis;
pub mod nuts;

/// Resolved per-run sampling parameters shared by all engines.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Total iterations per chain, warm-up included.
    pub iter: usize,
    /// Warm-up iterations per chain.
    pub warmup: usize,
    pub chains: usize,
    /// Base seed; chain `i` uses `seed + i`.
    pub seed: u64,
    /// Keep every `thin`-th post-warm-up iteration.
    pub thin: usize,
    /// Maximum NUTS tree depth.
    pub max_depth: usize,
    /// Dual-averaging target acceptance probability.
    pub target_accept: f64,
    /// Random-walk proposal standard deviation.
    pub step_size: f64,
    /// Initial position per chain.
    pub init: Vec<Vec<f64>>,
    /// Render per-chain progress bars.
    pub progress: bool,
}

impl RunSettings {
    /// Resolves run configuration against a model (init broadcast and
    /// dimension checks).
    pub fn from_config(run: &RunConfig, model: &Model, progress: bool) -> Result<Self> {
        let init = run.init_positions(&model.kind.initial_position())?;
        let dim = model.kind.dim();
        for (chain, position) in init.iter().enumerate() {
            if position.len() != dim {
                return Err(Error::Config(format!(
                    "run.init for chain {chain} has {} entries but model {} has dimension {dim}",
                    position.len(),
                    model.name
                )));
            }
        }
        Ok(Self {
            iter: run.iter,
            warmup: run.warmup(),
            chains: run.chains,
            seed: run.seed,
            thin: run.thin,
            max_depth: run.max_depth,
            target_accept: run.target_accept,
            step_size: run.step_size,
            init,
            progress,
        })
    }

    /// Post-warm-up transitions per chain.
    pub fn sampling_iterations(&self) -> usize {
        self.iter - self.warmup
    }

    /// Iterations actually kept per chain after thinning.
    pub fn kept_iterations(&self) -> usize {
        let sampling = self.sampling_iterations();
        (sampling + self.thin - 1) / self.thin
    }
}

/// A sampling engine producing a complete [`RunResult`].
pub trait Engine: Sync + std::fmt::Debug {
    /// Registry key of this engine.
    fn key(&self) -> &'static str;

    fn run(&self, model: &Model, settings: &RunSettings) -> Result<RunResult>;
}

type EngineFactory = fn() -> Box<dyn Engine>;

fn make_nuts() -> Box<dyn Engine> {
    Box::new(nuts::NutsEngine)
}

fn make_rwm() -> Box<dyn Engine> {
    Box::new(metropolis::RandomWalkEngine)
}

fn make_gaussian() -> Box<dyn Engine> {
    Box::new(gaussian::GaussianEngine)
}

/// The closed engine registry, in lookup order.
const REGISTRY: &[(&str, EngineFactory)] = &[
    ("nuts", make_nuts),
    ("rwm", make_rwm),
    ("gaussian", make_gaussian),
];

/// Looks up an engine by registry key.
pub fn engine_for(key: &str) -> Result<Box<dyn Engine>> {
    REGISTRY
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, factory)| factory())
        .ok_or_else(|| Error::UnknownEngine {
            key: key.to_string(),
            known: known_engines(),
        })
}

/// Comma-separated registry keys, for error messages and `--help`.
pub fn known_engines() -> String {
    REGISTRY
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One progress bar per chain, in the shared multi-bar area.
pub(crate) fn chain_progress_bar(
    multi: &MultiProgress,
    chain: usize,
    len: u64,
    enabled: bool,
) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = multi.add(ProgressBar::new(len));
    pb.set_prefix(format!("Chain {chain}"));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    pb
}
