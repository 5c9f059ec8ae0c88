/*!
Parquet writer for sampling results. Enable via the `parquet` feature.

Shares its column layout (and record batch construction) with the Arrow
writer.
*/

use std::fs::File;
use std::path::Path;

use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

use crate::error::Result;
use crate::fit::RunResult;
use crate::io::arrow::record_batch;

/// Saves the kept draws as a Parquet file.
pub fn save_parquet(fit: &RunResult, selection: Option<&[String]>, path: &Path) -> Result<()> {
    let (schema, batch) = record_batch(fit, selection)?;
    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::ChainTrace;
    use arrow::array::Float64Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReader;
    use tempfile::NamedTempFile;

    fn result() -> RunResult {
        RunResult {
            engine: "rwm".to_string(),
            param_names: vec!["mu".to_string()],
            chains: vec![ChainTrace {
                draws: vec![vec![42.0], vec![43.0]],
                lp: vec![0.0; 2],
                divergent: vec![false; 2],
                treedepth: vec![0; 2],
                energy: vec![0.0; 2],
                is_sample: vec![true, true],
            }],
            seed: 0,
            thin: 1,
            max_depth: 10,
        }
    }

    #[test]
    fn test_save_parquet_round_trip() {
        let file = NamedTempFile::new().unwrap();
        save_parquet(&result(), None, file.path()).unwrap();

        let mut reader =
            ParquetRecordBatchReader::try_new(File::open(file.path()).unwrap(), 1024).unwrap();
        let batch = reader.next().unwrap().unwrap();
        assert!(reader.next().is_none(), "expected a single batch");

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 3);
        let mu = batch
            .column(2)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert!((mu.value(0) - 42.0).abs() < f64::EPSILON);
        assert!((mu.value(1) - 43.0).abs() < f64::EPSILON);
    }
}
