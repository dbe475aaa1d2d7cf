use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{RecoError, RecoResult};

// ---------------------------------------------------------------------------
// Value – a single cell of an output row
// ---------------------------------------------------------------------------

/// A scalar written to a CSV cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => Ok(()),
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Row – ordered key/value pairs
// ---------------------------------------------------------------------------

/// One flat output record. Column order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    /// Set a column, overwriting it in place if it already exists.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.cells.iter_mut().find(|(k, _)| k == key) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((key.to_string(), value)),
        }
    }

    /// Set `<prefix>_x`, `<prefix>_y` and `<prefix>_z`.
    pub fn set_xyz(&mut self, prefix: &str, point: [f64; 3]) {
        for (axis, v) in ["x", "y", "z"].iter().zip(point) {
            self.set(&format!("{prefix}_{axis}"), v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> Vec<String> {
        self.cells.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CsvSink / CsvSinks – named output tables
// ---------------------------------------------------------------------------

/// Rows destined to one CSV file. The header is fixed by the first row.
#[derive(Debug, Clone, Default)]
pub struct CsvSink {
    header: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
}

impl CsvSink {
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn append(&mut self, name: &str, row: Row) -> RecoResult<()> {
        let keys = row.keys();
        match self.header.as_ref() {
            Some(header) if *header != keys => {
                return Err(RecoError::RowKeys {
                    sink: name.to_string(),
                    expected: header.clone(),
                    got: keys,
                });
            }
            Some(_) => {}
            None => self.header = Some(keys),
        }
        self.rows
            .push(row.cells.iter().map(|(_, v)| v.to_string()).collect());
        Ok(())
    }

    /// Write the header and every row. A sink that never received a row
    /// produces an empty file.
    pub fn write<W: Write>(&self, out: W) -> RecoResult<()> {
        let mut writer = csv::WriterBuilder::new().from_writer(out);
        if let Some(header) = &self.header {
            writer.write_record(header)?;
        }
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Registry of named CSV sinks.
#[derive(Debug, Clone, Default)]
pub struct CsvSinks {
    sinks: BTreeMap<String, CsvSink>,
}

impl CsvSinks {
    /// Declare a sink. Declaring an existing sink keeps its content.
    pub fn initialize(&mut self, name: &str) {
        self.sinks.entry(name.to_string()).or_default();
    }

    pub fn append(&mut self, name: &str, row: Row) -> RecoResult<()> {
        self.sinks
            .get_mut(name)
            .ok_or_else(|| RecoError::Config(format!("No CSV sink named `{name}`")))?
            .append(name, row)
    }

    pub fn get(&self, name: &str) -> Option<&CsvSink> {
        self.sinks.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }

    /// Write every sink to `<dir>/<name>.csv`.
    pub fn write_dir(&self, dir: &Path) -> RecoResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut paths = Vec::with_capacity(self.sinks.len());
        for (name, sink) in &self.sinks {
            let path = dir.join(format!("{name}.csv"));
            sink.write(std::fs::File::create(&path)?)?;
            info!("Wrote {} rows to {}", sink.len(), path.display());
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, mass: f64) -> Row {
        let mut row = Row::new();
        row.set("id", id);
        row.set("mass", mass);
        row
    }

    #[test]
    fn header_comes_from_the_first_row() {
        let mut sinks = CsvSinks::default();
        sinks.initialize("log");
        sinks.append("log", row(0, 135.0)).unwrap();
        sinks.append("log", row(1, 0.5)).unwrap();

        let mut out = Vec::new();
        sinks.get("log").unwrap().write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "id,mass\n0,135\n1,0.5\n");
    }

    #[test]
    fn mismatched_keys_are_rejected() {
        let mut sinks = CsvSinks::default();
        sinks.initialize("log");
        sinks.append("log", row(0, 1.0)).unwrap();
        let mut other = Row::new();
        other.set("mass", 1.0);
        other.set("id", 2_i64);
        assert!(matches!(
            sinks.append("log", other),
            Err(RecoError::RowKeys { .. })
        ));
        assert!(matches!(
            sinks.append("nope", row(0, 1.0)),
            Err(RecoError::Config(_))
        ));
    }

    #[test]
    fn setting_a_key_twice_keeps_its_position() {
        let mut r = row(0, 1.0);
        r.set("id", 3_i64);
        r.set_xyz("vertex", [1.0, 2.0, 3.0]);
        assert_eq!(r.keys(), vec!["id", "mass", "vertex_x", "vertex_y", "vertex_z"]);
        assert_eq!(r.get("id"), Some(&Value::Integer(3)));
        assert_eq!(Value::from(None::<f64>).to_string(), "");
    }
}
