/*!
Binary dump of a full run result.

The whole [`RunResult`] — traces, warm-up included — round-trips through a
single bincode file, so a finished run can be reloaded later for further
diagnostics or re-export without re-sampling.
*/

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::fit::RunResult;
use crate::io::ensure_parent;

/// Serializes the run result to `path`, creating parent directories.
pub fn save_fit(fit: &RunResult, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, bincode::serialize(fit)?)?;
    Ok(())
}

/// Reads a run result back from a dump written by [`save_fit`].
pub fn load_fit(path: &Path) -> Result<RunResult> {
    let bytes = fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::ChainTrace;
    use tempfile::TempDir;

    #[test]
    fn test_dump_round_trips_exactly() {
        let fit = RunResult {
            engine: "nuts".to_string(),
            param_names: vec!["mu".to_string()],
            chains: vec![ChainTrace {
                draws: vec![vec![1.0], vec![2.0]],
                lp: vec![-0.5, -1.5],
                divergent: vec![false, true],
                treedepth: vec![2, 3],
                energy: vec![0.25, 0.75],
                is_sample: vec![false, true],
            }],
            seed: 9,
            thin: 2,
            max_depth: 8,
        };

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results/fit.bin");
        save_fit(&fit, &path).unwrap();
        let restored = load_fit(&path).unwrap();
        assert_eq!(fit, restored);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_fit(&dir.path().join("absent.bin")).is_err());
    }
}
