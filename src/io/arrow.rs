/*!
Arrow IPC writer for sampling results. Enable via the `arrow` feature.

Columns: `chain` and `sample` as UInt32, one Float64 column per selected
parameter, written as a single record batch.
*/

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::{
    array::{ArrayRef, Float64Builder, UInt32Builder},
    datatypes::{DataType, Field, Schema},
    ipc::writer::FileWriter,
    record_batch::RecordBatch,
};

use crate::error::Result;
use crate::fit::RunResult;
use crate::io::TableView;

/// Builds the shared Arrow schema and the populated column arrays.
pub(crate) fn record_batch(
    fit: &RunResult,
    selection: Option<&[String]>,
) -> Result<(Arc<Schema>, RecordBatch)> {
    let view = TableView::new(fit, selection)?;

    let mut fields = vec![
        Field::new("chain", DataType::UInt32, false),
        Field::new("sample", DataType::UInt32, false),
    ];
    for name in &view.names {
        fields.push(Field::new(name, DataType::Float64, false));
    }
    let schema = Arc::new(Schema::new(fields));

    let mut chain_builder = UInt32Builder::new();
    let mut sample_builder = UInt32Builder::new();
    let mut param_builders: Vec<Float64Builder> =
        view.names.iter().map(|_| Float64Builder::new()).collect();

    for (chain, sample, values) in view.rows() {
        chain_builder.append_value(chain as u32);
        sample_builder.append_value(sample as u32);
        for (builder, value) in param_builders.iter_mut().zip(values.iter()) {
            builder.append_value(*value);
        }
    }

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(chain_builder.finish()),
        Arc::new(sample_builder.finish()),
    ];
    for mut builder in param_builders {
        arrays.push(Arc::new(builder.finish()));
    }

    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    Ok((schema, batch))
}

/// Saves the kept draws as an Arrow IPC file.
pub fn save_arrow(fit: &RunResult, selection: Option<&[String]>, path: &Path) -> Result<()> {
    let (schema, batch) = record_batch(fit, selection)?;
    let file = File::create(path)?;
    let mut writer = FileWriter::try_new(file, &schema)?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(())
}
