/*!
CSV writer for sampling results. Enable via the `csv` feature.

The file has a header row `chain,sample,<param...>` and one row per kept
draw of each chain, chains in order.
*/

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::error::Result;
use crate::fit::RunResult;
use crate::io::TableView;

/// Saves the kept draws as a CSV file.
///
/// `selection` restricts the parameter columns; `None` writes all of them.
pub fn save_csv(fit: &RunResult, selection: Option<&[String]>, path: &Path) -> Result<()> {
    let view = TableView::new(fit, selection)?;
    let mut wtr = Writer::from_writer(File::create(path)?);

    let mut header: Vec<String> = vec!["chain".to_string(), "sample".to_string()];
    header.extend(view.names.iter().cloned());
    wtr.write_record(&header)?;

    for (chain, sample, values) in view.rows() {
        let mut row = vec![chain.to_string(), sample.to_string()];
        row.extend(values.iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
