// Local input files: the project index that names projects and points at
// their labeling schema and task data, and the task data files themselves.
// Everything is validated here so the flows in `ui` work with typed values.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::sync::Record;

/// One project as declared in the index file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectEntry {
    /// Labeling schema file, relative to the index file's directory.
    pub schema: String,
    /// Task data file, relative to the data directory. Optional: a project
    /// may be declared without any tasks to import.
    #[serde(default)]
    pub data_source: Option<String>,
}

/// The project index: titles mapped to their entries, in file order.
#[derive(Debug, Clone)]
pub struct ProjectIndex {
    pub entries: Vec<(String, ProjectEntry)>,
}

impl ProjectIndex {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Load the index file: a JSON object mapping project titles to entries.
pub fn load_project_index(path: &Path) -> Result<ProjectIndex> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read index file {}", path.display()))?;
    let raw: serde_json::Map<String, Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} must contain a JSON object", path.display()))?;

    let mut entries = Vec::with_capacity(raw.len());
    for (title, value) in raw {
        let entry: ProjectEntry = serde_json::from_value(value).with_context(|| {
            format!("Project '{}' must be an object with a 'schema' key", title)
        })?;
        entries.push((title, entry));
    }
    Ok(ProjectIndex { entries })
}

/// Read a labeling schema file as text.
pub fn load_label_config(dir: &Path, file: &str) -> Result<String> {
    let path = dir.join(file);
    fs::read_to_string(&path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))
}

/// Load a task data file: a JSON array of objects, one record per task.
/// An empty array is allowed and comes back as an empty vec; the caller
/// decides how loudly to report it.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let Value::Array(items) = value else {
        bail!("{} must contain a JSON array of task records", path.display());
    };
    for (i, item) in items.iter().enumerate() {
        if !item.is_object() {
            bail!(
                "Record {} in {} is not a JSON object",
                i + 1,
                path.display()
            );
        }
    }
    Ok(items)
}
