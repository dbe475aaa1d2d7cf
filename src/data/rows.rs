//! Serde adapters writing arrays as plain nested lists.
//!
//! `[[x, y, z], ...]` for 2D arrays, `[v, ...]` for 1D arrays, which is what
//! the batch files produced upstream contain.

use ndarray::{Array1, Array2};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Convert a list of rows into a 2D array, rejecting ragged input.
///
/// An empty list yields a `0 x 0` array.
pub fn to_array2(rows: Vec<Vec<f64>>) -> Result<Array2<f64>, String> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(n_rows * n_cols);
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != n_cols {
            return Err(format!(
                "row {i} has {} columns but row 0 has {n_cols}",
                row.len()
            ));
        }
        flat.extend(row);
    }
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|e| e.to_string())
}

pub fn serialize<S: Serializer>(array: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    let rows: Vec<Vec<f64>> = array.outer_iter().map(|r| r.to_vec()).collect();
    rows.serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array2<f64>, D::Error> {
    let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
    to_array2(rows).map_err(D::Error::custom)
}

/// Point clouds: `(N, 3)` arrays. An empty list keeps its three columns.
pub mod points {
    use super::*;

    pub use super::serialize;

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Array2<f64>, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        if rows.is_empty() {
            return Ok(Array2::zeros((0, 3)));
        }
        let array = to_array2(rows).map_err(D::Error::custom)?;
        if array.ncols() != 3 {
            return Err(D::Error::custom(format!(
                "points have 3 coordinates, got {}",
                array.ncols()
            )));
        }
        Ok(array)
    }
}

/// Same convention for 1D arrays.
pub mod values {
    use super::*;

    pub fn serialize<S: Serializer>(array: &Array1<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        array.to_vec().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Array1<f64>, D::Error> {
        Ok(Array1::from(Vec::<f64>::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_rejected() {
        let err = to_array2(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(err.contains("row 1"));
    }

    #[test]
    fn empty_rows_give_empty_array() {
        let array = to_array2(Vec::new()).unwrap();
        assert_eq!(array.dim(), (0, 0));
    }

    #[derive(serde::Deserialize)]
    struct Cloud {
        #[serde(with = "points")]
        points: Array2<f64>,
    }

    #[test]
    fn empty_point_clouds_keep_three_columns() {
        let cloud: Cloud = serde_json::from_str(r#"{"points": []}"#).unwrap();
        assert_eq!(cloud.points.dim(), (0, 3));

        let cloud: Cloud = serde_json::from_str(r#"{"points": [[1, 2, 3]]}"#).unwrap();
        assert_eq!(cloud.points.dim(), (1, 3));

        assert!(serde_json::from_str::<Cloud>(r#"{"points": [[1, 2]]}"#).is_err());
    }
}
