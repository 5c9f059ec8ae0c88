/*!
Model specification loading and caching.

A model file is a YAML description of the target posterior:

```yaml
kind: gaussian
mean: [0.0, 1.0]
sigma: [1.0, 2.0]
params: [mu, tau]
```

Lines of the form `#include "other.yaml"` are substituted with the referenced
file's contents before parsing (paths resolve relative to the model file), so
shared blocks can live in one place. The SHA-256 digest of the substituted
text keys a binary cache entry under the configured cache directory; loading
an unchanged model file skips parsing entirely.
*/

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::distributions::{DiagGaussian, NormalMean, Rosenbrock2D, Target};
use crate::error::{Error, Result};

/// A resolved, validated model ready for sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Name used in cache entries and logs.
    pub name: String,
    /// Hex SHA-256 digest of the substituted model text.
    pub digest: String,
    pub kind: ModelKind,
}

/// The closed set of supported target kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelKind {
    Gaussian(DiagGaussian),
    Rosenbrock(Rosenbrock2D),
    NormalMean(NormalMean),
}

impl Target for ModelKind {
    fn dim(&self) -> usize {
        match self {
            ModelKind::Gaussian(t) => t.dim(),
            ModelKind::Rosenbrock(t) => t.dim(),
            ModelKind::NormalMean(t) => t.dim(),
        }
    }

    fn param_names(&self) -> Vec<String> {
        match self {
            ModelKind::Gaussian(t) => t.param_names(),
            ModelKind::Rosenbrock(t) => t.param_names(),
            ModelKind::NormalMean(t) => t.param_names(),
        }
    }

    fn unnorm_logp(&self, theta: &[f64]) -> f64 {
        match self {
            ModelKind::Gaussian(t) => t.unnorm_logp(theta),
            ModelKind::Rosenbrock(t) => t.unnorm_logp(theta),
            ModelKind::NormalMean(t) => t.unnorm_logp(theta),
        }
    }

    fn grad_unnorm_logp(&self, theta: &[f64]) -> Vec<f64> {
        match self {
            ModelKind::Gaussian(t) => t.grad_unnorm_logp(theta),
            ModelKind::Rosenbrock(t) => t.grad_unnorm_logp(theta),
            ModelKind::NormalMean(t) => t.grad_unnorm_logp(theta),
        }
    }

    fn initial_position(&self) -> Vec<f64> {
        match self {
            ModelKind::Gaussian(t) => t.initial_position(),
            ModelKind::Rosenbrock(t) => t.initial_position(),
            ModelKind::NormalMean(t) => t.initial_position(),
        }
    }
}

/// Raw model file schema, prior to data resolution.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawModelSpec {
    Gaussian {
        mean: Vec<f64>,
        sigma: Vec<f64>,
        #[serde(default)]
        params: Option<Vec<String>>,
    },
    Rosenbrock {
        #[serde(default = "default_rosenbrock_a")]
        a: f64,
        #[serde(default = "default_rosenbrock_b")]
        b: f64,
    },
    NormalMean {
        sigma: f64,
        data: DataSource,
    },
}

fn default_rosenbrock_a() -> f64 {
    1.0
}

fn default_rosenbrock_b() -> f64 {
    100.0
}

/// Observations given inline or as a reference to a JSON/YAML file with a
/// `y` variable.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataSource {
    File { file: PathBuf },
    Inline { y: Vec<f64> },
}

/// Loads a model, hitting the binary cache when the file is unchanged.
pub fn load(config: &ModelConfig) -> Result<Model> {
    let text = fs::read_to_string(&config.file).map_err(|err| {
        Error::Model(format!(
            "cannot read model file {}: {err}",
            config.file.display()
        ))
    })?;
    let base_dir = config.file.parent().unwrap_or_else(|| Path::new("."));
    let expanded = expand_includes(&text, base_dir)?;

    let digest = hex_digest(&expanded);
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| "model".to_string());
    let cache_path = config
        .cache
        .join(format!("cached-{}-{}.bin", name, &digest[..16]));

    if let Some(kind) = read_cache(&cache_path) {
        info!(model = %name, cache = %cache_path.display(), "using cached model");
        return Ok(Model { name, digest, kind });
    }

    let raw: RawModelSpec = serde_yaml::from_str(&expanded)?;
    let kind = resolve(raw, base_dir)?;

    fs::create_dir_all(&config.cache)?;
    fs::write(&cache_path, bincode::serialize(&kind)?)?;
    debug!(cache = %cache_path.display(), "cached parsed model");

    Ok(Model { name, digest, kind })
}

/// Substitutes `#include "<path>"` lines with the referenced file contents.
fn expand_includes(text: &str, base_dir: &Path) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("#include ") {
            let path = rest.trim().trim_matches('"');
            let included = fs::read_to_string(base_dir.join(path)).map_err(|err| {
                Error::Model(format!("cannot read included file {path:?}: {err}"))
            })?;
            out.push_str(&included);
            if !included.ends_with('\n') {
                out.push('\n');
            }
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

fn hex_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A corrupt or unreadable cache entry falls back to a fresh parse.
fn read_cache(path: &Path) -> Option<ModelKind> {
    let bytes = fs::read(path).ok()?;
    bincode::deserialize(&bytes).ok()
}

fn resolve(raw: RawModelSpec, base_dir: &Path) -> Result<ModelKind> {
    match raw {
        RawModelSpec::Gaussian {
            mean,
            sigma,
            params,
        } => {
            let gaussian = DiagGaussian {
                mean,
                sigma,
                params,
            };
            gaussian.validate()?;
            Ok(ModelKind::Gaussian(gaussian))
        }
        RawModelSpec::Rosenbrock { a, b } => Ok(ModelKind::Rosenbrock(Rosenbrock2D { a, b })),
        RawModelSpec::NormalMean { sigma, data } => {
            let y = match data {
                DataSource::Inline { y } => y,
                DataSource::File { file } => {
                    let path = base_dir.join(file);
                    let mut variables = crate::io::json::read_variables(&path, &["y"])?;
                    variables.remove("y").expect("requested variable present")
                }
            };
            Ok(ModelKind::NormalMean(NormalMean::new(y, sigma)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn model_config(dir: &TempDir, file: &str) -> ModelConfig {
        ModelConfig {
            file: dir.path().join(file),
            name: None,
            cache: dir.path().join("cache"),
        }
    }

    #[test]
    fn test_load_gaussian_model() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("model.yaml"),
            "kind: gaussian\nmean: [0.0, 1.0]\nsigma: [1.0, 2.0]\n",
        )
        .unwrap();

        let model = load(&model_config(&dir, "model.yaml")).unwrap();
        assert_eq!(model.name, "model");
        match &model.kind {
            ModelKind::Gaussian(g) => assert_eq!(g.mean, vec![0.0, 1.0]),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_cache_hit_round_trips() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("model.yaml"),
            "kind: rosenbrock\na: 1.0\nb: 100.0\n",
        )
        .unwrap();
        let config = model_config(&dir, "model.yaml");

        let first = load(&config).unwrap();
        let cache_entries = fs::read_dir(dir.path().join("cache")).unwrap().count();
        assert_eq!(cache_entries, 1);

        let second = load(&config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.yaml"), "kind: rosenbrock\n").unwrap();
        let config = model_config(&dir, "model.yaml");
        let first = load(&config).unwrap();

        fs::write(dir.path().join("model.yaml"), "kind: rosenbrock\na: 2.0\n").unwrap();
        let second = load(&config).unwrap();
        assert_ne!(first.digest, second.digest);
        let cache_entries = fs::read_dir(dir.path().join("cache")).unwrap().count();
        assert_eq!(cache_entries, 2);
    }

    #[test]
    fn test_include_substitution_before_hashing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dims.yaml"), "mean: [0.0]\nsigma: [1.0]\n").unwrap();
        fs::write(
            dir.path().join("model.yaml"),
            "kind: gaussian\n#include \"dims.yaml\"\n",
        )
        .unwrap();
        let config = model_config(&dir, "model.yaml");
        let first = load(&config).unwrap();
        match &first.kind {
            ModelKind::Gaussian(g) => assert_eq!(g.mean, vec![0.0]),
            other => panic!("unexpected kind: {other:?}"),
        }

        // Changing only the included file must change the digest.
        fs::write(dir.path().join("dims.yaml"), "mean: [1.0]\nsigma: [1.0]\n").unwrap();
        let second = load(&config).unwrap();
        assert_ne!(first.digest, second.digest);
    }

    #[test]
    fn test_normal_mean_from_data_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("obs.json"), r#"{"y": [1.0, 2.0, 3.0]}"#).unwrap();
        fs::write(
            dir.path().join("model.yaml"),
            "kind: normal_mean\nsigma: 0.5\ndata:\n  file: obs.json\n",
        )
        .unwrap();

        let model = load(&model_config(&dir, "model.yaml")).unwrap();
        match &model.kind {
            ModelKind::NormalMean(m) => {
                assert_eq!(m.y, vec![1.0, 2.0, 3.0]);
                assert_eq!(m.param_names(), vec!["mu"]);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_cache_falls_back_to_parse() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.yaml"), "kind: rosenbrock\n").unwrap();
        let config = model_config(&dir, "model.yaml");
        let first = load(&config).unwrap();

        let cache_file = fs::read_dir(dir.path().join("cache"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        fs::write(&cache_file, b"not bincode").unwrap();

        let second = load(&config).unwrap();
        assert_eq!(first, second);
    }
}
