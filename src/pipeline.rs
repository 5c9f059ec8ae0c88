/*!
Job orchestration: model → engine → diagnostics → outputs.

[`run_job`] is the programmatic entry point behind the CLI. It loads (or
cache-hits) the model, resolves the engine from the registry, samples,
renders the convergence report through the logging handle, and writes the
configured outputs. Flagged diagnostics are reported but never abort a job;
configuration and I/O errors do.
*/

use std::path::PathBuf;

use ndarray_stats::QuantileExt;
use tracing::{debug, info, warn};

use crate::config::JobConfig;
use crate::diagnostics::{check_all_diagnostics, Report, Severity};
use crate::error::Result;
use crate::fit::RunResult;
use crate::io::{self, dump};
use crate::model;
use crate::sampler::{self, RunSettings};
use crate::stats;

/// What a finished job produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: RunResult,
    /// Convergence report, when diagnostics were enabled.
    pub diagnostics: Option<Report>,
    /// Paths written, sample output first.
    pub written: Vec<PathBuf>,
}

/// Runs one configured sampling job end to end.
pub fn run_job(config: &JobConfig, progress: bool) -> Result<RunOutcome> {
    let model = model::load(&config.model)?;
    let digest = &model.digest[..model.digest.len().min(16)];
    info!(model = %model.name, digest, "model ready");

    let engine = sampler::engine_for(&config.run.engine)?;
    let settings = RunSettings::from_config(&config.run, &model, progress)?;
    info!(
        engine = engine.key(),
        chains = settings.chains,
        iter = settings.iter,
        warmup = settings.warmup,
        seed = settings.seed,
        "sampling"
    );
    let result = engine.run(&model, &settings)?;
    info!(kept = result.total_kept(), "sampling finished");

    let (rhat, ess) = stats::split_rhat_ess(result.draws_array().view());
    if let (Ok(max_rhat), Ok(min_ess)) = (rhat.max(), ess.min()) {
        info!(max_rhat = *max_rhat, min_ess = *min_ess, "chain summary");
    }

    let diagnostics = if config.diagnostics.enabled {
        let report = check_all_diagnostics(&result, config.run.max_depth);
        for record in &report.records {
            match record.severity {
                Severity::Warning => {
                    warn!(subject = %record.subject, value = record.value, "diagnostic outlier")
                }
                Severity::Info => {
                    debug!(subject = %record.subject, value = record.value, "diagnostic note")
                }
            }
        }
        if report.flagged {
            warn!("convergence checks flagged problems:\n{}", report.message);
        } else {
            info!("convergence checks passed:\n{}", report.message);
        }
        Some(report)
    } else {
        None
    };

    let mut written = Vec::new();
    let path = io::write_result(&result, &config.output, &config.job_id)?;
    info!(path = %path.display(), "wrote samples");
    written.push(path);

    if let Some(fit_path) = &config.output.fit {
        dump::save_fit(&result, fit_path)?;
        info!(path = %fit_path.display(), "saved run result dump");
        written.push(fit_path.clone());
    }

    Ok(RunOutcome {
        result,
        diagnostics,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;
    use std::fs;
    use tempfile::TempDir;

    fn job_yaml(dir: &TempDir, engine: &str) -> JobConfig {
        fs::write(
            dir.path().join("model.yaml"),
            "kind: gaussian\nmean: [1.0]\nsigma: [2.0]\nparams: [mu]\n",
        )
        .unwrap();
        let yaml = format!(
            "model:\n  file: {model}\n  cache: {cache}\nrun:\n  engine: {engine}\n  iter: 200\n  warmup: 100\n  chains: 2\noutput:\n  format: json\n  name: {out}\n  fit: {fit}\n",
            model = dir.path().join("model.yaml").display(),
            cache = dir.path().join("cache").display(),
            out = dir.path().join("results/out").display(),
            fit = dir.path().join("results/fit.bin").display(),
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_run_job_writes_outputs_and_reports() {
        let dir = TempDir::new().unwrap();
        let config = job_yaml(&dir, "gaussian");
        let outcome = run_job(&config, false).unwrap();

        assert_eq!(outcome.written.len(), 2);
        for path in &outcome.written {
            assert!(path.exists(), "missing output: {}", path.display());
        }
        let report = outcome.diagnostics.expect("diagnostics enabled by default");
        assert_eq!(report.message.lines().count(), 5);

        let restored = dump::load_fit(&outcome.written[1]).unwrap();
        assert_eq!(restored, outcome.result);
    }

    #[test]
    fn test_run_job_unknown_engine() {
        let dir = TempDir::new().unwrap();
        let config = job_yaml(&dir, "magic");
        let err = run_job(&config, false).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_run_job_diagnostics_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = job_yaml(&dir, "gaussian");
        config.diagnostics.enabled = false;
        let outcome = run_job(&config, false).unwrap();
        assert!(outcome.diagnostics.is_none());
    }
}
