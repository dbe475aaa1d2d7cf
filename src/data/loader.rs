use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::batch::{Batch, Index, Product};

// ---------------------------------------------------------------------------
// On-disk batch layout
// ---------------------------------------------------------------------------

/// A product as written in a batch file: a single value for a scalar index,
/// one value per entry for a list index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductColumn {
    One(Product),
    Many(Vec<Product>),
}

/// Expected JSON schema:
///
/// ```json
/// {
///   "index": [0, 1],
///   "products": {
///     "data": [{"tensor": [[0, 1, 2, 3, 0.5], ...]}, {"tensor": [...]}],
///     "meta": [{"meta": {"lower": [...], "upper": [...], "size": [...]}}, ...]
///   }
/// }
/// ```
///
/// With a scalar `index`, every product holds a single value instead of a
/// list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    pub index: Index,
    pub products: BTreeMap<String, ProductColumn>,
}

impl BatchFile {
    /// Split the columns into per-entry records.
    pub fn into_batch(self) -> Result<Batch> {
        match self.index {
            Index::Single(index) => {
                let mut products = BTreeMap::new();
                for (key, column) in self.products {
                    match column {
                        ProductColumn::One(p) => {
                            products.insert(key, p);
                        }
                        ProductColumn::Many(_) => {
                            bail!("Product '{key}' is a list but the batch index is a scalar")
                        }
                    }
                }
                Ok(Batch::single(index, products))
            }
            index @ Index::Batched(_) => {
                let mut columns = BTreeMap::new();
                for (key, column) in self.products {
                    match column {
                        ProductColumn::Many(values) => {
                            columns.insert(key, values);
                        }
                        ProductColumn::One(_) => {
                            bail!("Product '{key}' must hold one value per entry")
                        }
                    }
                }
                Batch::from_columns(index, columns).context("assembling batch")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a batch from a JSON file.
pub fn load_batch(path: &Path) -> Result<Batch> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading batch file {}", path.display()))?;
    let file: BatchFile = serde_json::from_str(&text).context("parsing batch JSON")?;
    let batch = file.into_batch()?;
    log::info!(
        "Loaded {} entries from {}",
        batch.num_entries(),
        path.display()
    );
    Ok(batch)
}

/// Write a batch file as JSON.
pub fn save_batch(path: &Path, file: &BatchFile) -> Result<()> {
    let out = std::fs::File::create(path)
        .with_context(|| format!("creating batch file {}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(out), file).context("writing batch JSON")?;
    Ok(())
}

/// Load a JSON configuration file, keeping the declaration order of maps.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading configuration {}", path.display()))?;
    serde_json::from_str(&text).context("parsing configuration JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scalar_index_takes_single_values() {
        let json = r#"{
            "index": 7,
            "products": {
                "data": {"tensor": [[0, 1, 2, 3, 0.5]]},
                "particle_shapes": {"labels": [1]}
            }
        }"#;
        let file: BatchFile = serde_json::from_str(json).unwrap();
        let batch = file.into_batch().unwrap();
        assert!(!batch.is_batched());
        assert_eq!(batch.entry(0).index, 7);
        assert_eq!(
            batch.entry(0).tensor("data").unwrap(),
            &array![[0.0, 1.0, 2.0, 3.0, 0.5]]
        );
    }

    #[test]
    fn list_index_splits_columns() {
        let json = r#"{
            "index": [3, 4],
            "products": {
                "interaction_flash_times": [{"values": [0.5]}, {"values": []}]
            }
        }"#;
        let file: BatchFile = serde_json::from_str(json).unwrap();
        let batch = file.into_batch().unwrap();
        assert_eq!(batch.num_entries(), 2);
        assert_eq!(batch.entry(1).index, 4);
        assert_eq!(
            batch.entry(0).opt_values("interaction_flash_times").unwrap(),
            Some(&vec![0.5])
        );
    }

    #[test]
    fn mismatched_layouts_are_rejected() {
        let json = r#"{"index": [0, 1], "products": {"data": {"labels": [1]}}}"#;
        let file: BatchFile = serde_json::from_str(json).unwrap();
        assert!(file.into_batch().is_err());

        let json = r#"{"index": [0, 1], "products": {"data": [{"labels": [1]}]}}"#;
        let file: BatchFile = serde_json::from_str(json).unwrap();
        assert!(file.into_batch().is_err());
    }
}
