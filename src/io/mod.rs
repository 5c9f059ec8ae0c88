/*!
Output writers for sampling results.

A [`crate::fit::RunResult`] can be written as:

- tabular CSV (`chain,sample,<param...>`, one row per kept draw),
- columnar Arrow IPC or Parquet with the same columns,
- a JSON or YAML map from parameter name to its combined trace,
- a binary dump of the whole run result (round-trippable).

CSV, Arrow and Parquet support is feature-gated exactly like the rest of the
build; requesting a format that was compiled out is an error, not a panic.
*/

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::fit::RunResult;

#[cfg(feature = "arrow")]
pub mod arrow;

#[cfg(feature = "csv")]
pub mod csv;

#[cfg(feature = "parquet")]
pub mod parquet;

pub mod dump;
pub mod json;

/// Supported output file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Yaml,
    Arrow,
    Parquet,
}

impl OutputFormat {
    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Arrow => "arrow",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// A column-selected view over the kept draws of a run result.
///
/// Writers iterate [`TableView::rows`]: `(chain, sample, values)` tuples in
/// chain order, values in selection order.
pub(crate) struct TableView<'a> {
    fit: &'a RunResult,
    pub names: Vec<String>,
    indices: Vec<usize>,
}

impl<'a> TableView<'a> {
    pub fn new(fit: &'a RunResult, selection: Option<&[String]>) -> Result<Self> {
        let names: Vec<String> = match selection {
            Some(names) => names.to_vec(),
            None => fit.param_names.clone(),
        };
        let indices = names
            .iter()
            .map(|name| {
                fit.param_index(name)
                    .ok_or_else(|| Error::UnknownParameter(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            fit,
            names,
            indices,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = (usize, usize, Vec<f64>)> + '_ {
        self.fit.chains.iter().enumerate().flat_map(move |(c, chain)| {
            let warmup = chain.warmup_len();
            chain.draws[warmup..]
                .iter()
                .enumerate()
                .map(move |(s, draw)| {
                    let values = self.indices.iter().map(|&p| draw[p]).collect();
                    (c, s, values)
                })
        })
    }
}

/// Creates the parent directory of `path` when it does not exist yet.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Writes the run result as configured, returning the path written.
///
/// The output stem gets `_{job_id}` appended for non-default job ids, then
/// the format's canonical extension.
pub fn write_result(fit: &RunResult, output: &OutputConfig, job_id: &str) -> Result<PathBuf> {
    let stem = output.name.display().to_string();
    let ext = output.format.extension();
    let path = if job_id != "0" {
        PathBuf::from(format!("{stem}_{job_id}.{ext}"))
    } else {
        PathBuf::from(format!("{stem}.{ext}"))
    };
    ensure_parent(&path)?;

    let selection = output.params.as_deref();
    match output.format {
        #[cfg(feature = "csv")]
        OutputFormat::Csv => csv::save_csv(fit, selection, &path)?,
        #[cfg(not(feature = "csv"))]
        OutputFormat::Csv => return Err(Error::FormatDisabled("csv")),

        OutputFormat::Json => json::write_json(fit, selection, &path)?,
        OutputFormat::Yaml => json::write_yaml(fit, selection, &path)?,

        #[cfg(feature = "arrow")]
        OutputFormat::Arrow => arrow::save_arrow(fit, selection, &path)?,
        #[cfg(not(feature = "arrow"))]
        OutputFormat::Arrow => return Err(Error::FormatDisabled("arrow")),

        #[cfg(feature = "parquet")]
        OutputFormat::Parquet => parquet::save_parquet(fit, selection, &path)?,
        #[cfg(not(feature = "parquet"))]
        OutputFormat::Parquet => return Err(Error::FormatDisabled("parquet")),
    }
    Ok(path)
}
