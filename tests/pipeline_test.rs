//! End-to-end pipeline tests: a YAML job file in, sampled output files and a
//! convergence report out.

use std::fs;
use std::path::PathBuf;

use mcmc_pipeline::config::JobConfig;
use mcmc_pipeline::diagnostics;
use mcmc_pipeline::io::dump;
use mcmc_pipeline::pipeline::run_job;
use mcmc_pipeline::stats;
use tempfile::TempDir;

/// Writes a normal-mean model (data from a JSON file) plus a job file.
fn write_job(dir: &TempDir, engine: &str, format: &str, extra_run: &str) -> PathBuf {
    fs::write(
        dir.path().join("obs.json"),
        r#"{"y": [4.1, 5.3, 4.8, 5.2, 4.6, 5.1, 4.9, 5.4]}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("model.yaml"),
        "kind: normal_mean\nsigma: 0.5\ndata:\n  file: obs.json\n",
    )
    .unwrap();

    let job = format!(
        "model:\n  file: {model}\n  name: tritium\n  cache: {cache}\n\
         run:\n  engine: {engine}\n  iter: 400\n  warmup: 200\n  chains: 2\n  seed: 7\n{extra_run}\
         output:\n  format: {format}\n  name: {out}\n  fit: {fit}\n",
        model = dir.path().join("model.yaml").display(),
        cache = dir.path().join("cache").display(),
        out = dir.path().join("results/samples").display(),
        fit = dir.path().join("results/fit.bin").display(),
    );
    let job_path = dir.path().join("job.yaml");
    fs::write(&job_path, job).unwrap();
    job_path
}

#[test]
fn test_nuts_job_end_to_end_csv() {
    let dir = TempDir::new().unwrap();
    let job_path = write_job(&dir, "nuts", "csv", "");
    let config = JobConfig::from_path(&job_path).unwrap();

    let outcome = run_job(&config, false).unwrap();

    // Sample output: header plus one row per kept draw of each chain.
    let csv_path = &outcome.written[0];
    assert!(csv_path.to_str().unwrap().ends_with("samples.csv"));
    let contents = fs::read_to_string(csv_path).unwrap();
    let lines: Vec<&str> = contents.trim().lines().collect();
    assert_eq!(lines[0], "chain,sample,mu");
    assert_eq!(lines.len(), 1 + 2 * 200);

    // The posterior mean of mu should sit near the data mean (~4.93).
    let mu = outcome.result.extract("mu").unwrap();
    let mean = stats::mean(&mu);
    assert!((mean - 4.93).abs() < 0.2, "posterior mean off: {mean}");

    // Report lines come in the fixed order.
    let report = outcome.diagnostics.unwrap();
    let lines: Vec<&str> = report.message.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].contains("n_eff"));
    assert!(lines[1].contains("Rhat"));
    assert!(lines[2].contains("divergence"));
    assert!(lines[3].contains("tree depth"));
    assert!(lines[4].contains("E-BFMI"));

    // The dump round-trips the full result.
    let restored = dump::load_fit(&outcome.written[1]).unwrap();
    assert_eq!(restored, outcome.result);
    assert_eq!(restored.engine, "nuts");

    // partition_div works against the restored result too.
    let (nondiv, div) = diagnostics::partition_div(&restored, "mu").unwrap();
    assert_eq!(nondiv.len() + div.len(), restored.total_kept());
}

#[test]
fn test_second_run_hits_model_cache() {
    let dir = TempDir::new().unwrap();
    let job_path = write_job(&dir, "gaussian", "json", "");
    // The gaussian engine needs a gaussian model; swap the model file.
    fs::write(
        dir.path().join("model.yaml"),
        "kind: gaussian\nmean: [2.0]\nsigma: [0.5]\nparams: [mu]\n",
    )
    .unwrap();
    let config = JobConfig::from_path(&job_path).unwrap();

    run_job(&config, false).unwrap();
    let entries_after_first = fs::read_dir(dir.path().join("cache")).unwrap().count();
    run_job(&config, false).unwrap();
    let entries_after_second = fs::read_dir(dir.path().join("cache")).unwrap().count();

    assert_eq!(entries_after_first, 1);
    assert_eq!(entries_after_second, 1, "second run must reuse the cache");
}

#[test]
fn test_job_id_suffix_and_thinning() {
    let dir = TempDir::new().unwrap();
    let job_path = write_job(&dir, "rwm", "json", "  thin: 4\n");
    let mut config = JobConfig::from_path(&job_path).unwrap();
    config.job_id = "17".to_string();

    let outcome = run_job(&config, false).unwrap();
    let out_name = outcome.written[0].file_name().unwrap().to_str().unwrap();
    assert_eq!(out_name, "samples_17.json");

    // 200 sampling iterations thinned by 4.
    for chain in &outcome.result.chains {
        assert_eq!(chain.kept_len(), 50);
        assert_eq!(chain.warmup_len(), 200);
    }
}

#[cfg(feature = "parquet")]
#[test]
fn test_parquet_output_end_to_end() {
    let dir = TempDir::new().unwrap();
    let job_path = write_job(&dir, "rwm", "parquet", "");
    let config = JobConfig::from_path(&job_path).unwrap();

    let outcome = run_job(&config, false).unwrap();
    let path = &outcome.written[0];
    assert!(path.to_str().unwrap().ends_with("samples.parquet"));
    let metadata = fs::metadata(path).unwrap();
    assert!(metadata.len() > 0);
}

#[test]
fn test_unknown_output_parameter_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let job_path = write_job(&dir, "rwm", "csv", "");
    let mut config = JobConfig::from_path(&job_path).unwrap();
    config.output.params = Some(vec!["not_a_param".to_string()]);

    let err = run_job(&config, false).unwrap_err();
    assert!(err.to_string().contains("not_a_param"));
}
