/*!
JSON and YAML interchange for parameter traces.

The writers produce a map from parameter name to its combined post-warm-up
trace — the shape downstream notebooks expect. The reader is the inverse
used for observed-data files: it extracts a requested set of variables and
reports the first missing one by name.
*/

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::{Error, Result};
use crate::fit::RunResult;
use crate::io::TableView;

fn trace_map(fit: &RunResult, selection: Option<&[String]>) -> Result<Vec<(String, Vec<f64>)>> {
    let view = TableView::new(fit, selection)?;
    view.names
        .iter()
        .map(|name| Ok((name.clone(), fit.extract(name)?)))
        .collect()
}

/// Writes `{ "<param>": [trace...] }` as pretty-printed JSON.
pub fn write_json(fit: &RunResult, selection: Option<&[String]>, path: &Path) -> Result<()> {
    let mut map = serde_json::Map::new();
    for (name, values) in trace_map(fit, selection)? {
        map.insert(name, serde_json::to_value(values)?);
    }
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, &serde_json::Value::Object(map))?;
    Ok(())
}

/// Writes `{ <param>: [trace...] }` as YAML.
pub fn write_yaml(fit: &RunResult, selection: Option<&[String]>, path: &Path) -> Result<()> {
    let mut map = serde_yaml::Mapping::new();
    for (name, values) in trace_map(fit, selection)? {
        map.insert(
            serde_yaml::Value::String(name),
            serde_yaml::to_value(values)?,
        );
    }
    let file = BufWriter::new(File::create(path)?);
    serde_yaml::to_writer(file, &serde_yaml::Value::Mapping(map))?;
    Ok(())
}

/// Reads the requested numeric-array variables from a JSON or YAML file
/// (chosen by extension, JSON otherwise).
pub fn read_variables(
    path: &Path,
    names: &[&str],
) -> Result<std::collections::HashMap<String, Vec<f64>>> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(&text)?;
            serde_json::to_value(yaml)?
        }
        _ => serde_json::from_str(&text)?,
    };

    let object = value.as_object().ok_or_else(|| {
        Error::Config(format!("{} does not hold a map of variables", path.display()))
    })?;

    let mut out = std::collections::HashMap::new();
    for &name in names {
        let entry = object.get(name).ok_or_else(|| Error::MissingVariable {
            name: name.to_string(),
            path: path.to_path_buf(),
        })?;
        let array = entry.as_array().ok_or_else(|| {
            Error::Config(format!(
                "variable {name:?} in {} is not an array",
                path.display()
            ))
        })?;
        let values = array
            .iter()
            .map(|v| {
                v.as_f64().ok_or_else(|| {
                    Error::Config(format!(
                        "variable {name:?} in {} contains a non-numeric entry",
                        path.display()
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        out.insert(name.to_string(), values);
    }
    Ok(out)
}
