/*!
Job configuration.

A sampling job is described by a single YAML file with four sections:

```yaml
job_id: "0"
model:
  file: model.yaml
  cache: ./cache
run:
  engine: nuts
  iter: 2000
  warmup: 1000
  chains: 4
  seed: 314159
output:
  format: csv
  name: results/mcmc_out
  fit: results/fit.bin
```

Every field except `model.file` has a default, so a minimal job file is just
the model path. See [`JobConfig`] for the full schema.
*/

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::OutputFormat;

/// Top-level YAML job description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job identifier, appended to output file stems when not `"0"`.
    #[serde(default = "default_job_id")]
    pub job_id: String,
    /// Model file and cache location.
    pub model: ModelConfig,
    /// Sampler run conditions.
    #[serde(default)]
    pub run: RunConfig,
    /// Output destination and format.
    #[serde(default)]
    pub output: OutputConfig,
    /// Convergence diagnostics behaviour.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

fn default_job_id() -> String {
    "0".to_string()
}

impl JobConfig {
    /// Reads and parses a job file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: JobConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.run.chains == 0 {
            return Err(Error::Config("run.chains must be at least 1".to_string()));
        }
        if self.run.thin == 0 {
            return Err(Error::Config("run.thin must be at least 1".to_string()));
        }
        let warmup = self.run.warmup();
        if warmup > self.run.iter {
            return Err(Error::Config(format!(
                "run.warmup ({}) exceeds run.iter ({})",
                warmup, self.run.iter
            )));
        }
        Ok(())
    }
}

/// Model file location and compile cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the model specification file.
    pub file: PathBuf,
    /// Optional model name used in cache entry names.
    #[serde(default)]
    pub name: Option<String>,
    /// Directory holding cached parsed models.
    #[serde(default = "default_cache_dir")]
    pub cache: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

/// Sampler run conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Registry key of the sampling engine.
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Total iterations per chain, warm-up included.
    #[serde(default = "default_iter")]
    pub iter: usize,
    /// Warm-up iterations per chain; defaults to `iter / 2`.
    #[serde(default)]
    warmup: Option<usize>,
    /// Number of chains.
    #[serde(default = "default_chains")]
    pub chains: usize,
    /// Base RNG seed; chain `i` uses `seed + i`.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Keep every `thin`-th post-warm-up iteration.
    #[serde(default = "default_thin")]
    pub thin: usize,
    /// Initial position: one vector broadcast to all chains, or one per chain.
    #[serde(default)]
    pub init: Option<InitSpec>,
    /// Maximum tree depth for the NUTS engine, also the saturation threshold
    /// used by the tree-depth diagnostic.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Dual-averaging target acceptance probability for NUTS.
    #[serde(default = "default_target_accept")]
    pub target_accept: f64,
    /// Proposal standard deviation for the random-walk engine.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
}

fn default_engine() -> String {
    "nuts".to_string()
}

fn default_iter() -> usize {
    2000
}

fn default_chains() -> usize {
    4
}

fn default_seed() -> u64 {
    314159
}

fn default_thin() -> usize {
    1
}

fn default_max_depth() -> usize {
    10
}

fn default_target_accept() -> f64 {
    0.8
}

fn default_step_size() -> f64 {
    1.0
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            iter: default_iter(),
            warmup: None,
            chains: default_chains(),
            seed: default_seed(),
            thin: default_thin(),
            init: None,
            max_depth: default_max_depth(),
            target_accept: default_target_accept(),
            step_size: default_step_size(),
        }
    }
}

impl RunConfig {
    /// Warm-up length, defaulting to half the total iterations.
    pub fn warmup(&self) -> usize {
        self.warmup.unwrap_or(self.iter / 2)
    }

    /// Resolves the configured `init` into one position per chain.
    ///
    /// A single vector is broadcast to every chain; a per-chain list must
    /// have exactly `chains` entries. With no `init`, every chain starts at
    /// `fallback`.
    pub fn init_positions(&self, fallback: &[f64]) -> Result<Vec<Vec<f64>>> {
        match &self.init {
            None => Ok(vec![fallback.to_vec(); self.chains]),
            Some(InitSpec::Single(position)) => Ok(vec![position.clone(); self.chains]),
            Some(InitSpec::PerChain(positions)) => {
                if positions.len() == 1 {
                    return Ok(vec![positions[0].clone(); self.chains]);
                }
                if positions.len() != self.chains {
                    return Err(Error::Config(format!(
                        "run.init lists {} positions but run.chains is {}",
                        positions.len(),
                        self.chains
                    )));
                }
                Ok(positions.clone())
            }
        }
    }
}

/// Initial chain position(s): `[0.0, 1.0]` or `[[0.0, 1.0], [1.0, 0.0]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitSpec {
    Single(Vec<f64>),
    PerChain(Vec<Vec<f64>>),
}

/// Output destination and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output file format.
    #[serde(default)]
    pub format: OutputFormat,
    /// Output path stem; the format's extension is appended.
    #[serde(default = "default_output_name")]
    pub name: PathBuf,
    /// Subset of parameters to write; all parameters when absent.
    #[serde(default)]
    pub params: Option<Vec<String>>,
    /// Optional path for the binary dump of the full run result.
    #[serde(default)]
    pub fit: Option<PathBuf>,
}

fn default_output_name() -> PathBuf {
    PathBuf::from("mcmc_out")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            name: default_output_name(),
            params: None,
            fit: None,
        }
    }
}

/// Convergence diagnostics behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Run the convergence checks after sampling.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
