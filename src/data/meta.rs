use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Units – pixel vs. centimetre coordinates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Px,
    #[default]
    Cm,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::Px => write!(f, "px"),
            Units::Cm => write!(f, "cm"),
        }
    }
}

// ---------------------------------------------------------------------------
// Meta – image geometry of one entry
// ---------------------------------------------------------------------------

/// Geometry of the voxel grid of one entry.
///
/// `lower`/`upper` are the grid boundaries in cm, `size` the voxel pitch
/// along each axis in cm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
    pub size: [f64; 3],
}

impl Meta {
    /// Convert pixel coordinates to cm, in place. With `center`, the voxel
    /// centre is used rather than its lower corner.
    pub fn to_cm(&self, coords: &mut Array2<f64>, center: bool) {
        let offset = if center { 0.5 } else { 0.0 };
        for mut row in coords.axis_iter_mut(Axis(0)) {
            for (d, x) in row.iter_mut().enumerate() {
                *x = self.lower[d] + (*x + offset) * self.size[d];
            }
        }
    }

    /// Inverse of [`Meta::to_cm`].
    pub fn to_px(&self, coords: &mut Array2<f64>, center: bool) {
        let offset = if center { 0.5 } else { 0.0 };
        for mut row in coords.axis_iter_mut(Axis(0)) {
            for (d, x) in row.iter_mut().enumerate() {
                *x = (*x - self.lower[d]) / self.size[d] - offset;
            }
        }
    }

    /// Single-point version of [`Meta::to_cm`].
    pub fn point_to_cm(&self, point: [f64; 3], center: bool) -> [f64; 3] {
        let offset = if center { 0.5 } else { 0.0 };
        std::array::from_fn(|d| self.lower[d] + (point[d] + offset) * self.size[d])
    }

    /// Single-point version of [`Meta::to_px`].
    pub fn point_to_px(&self, point: [f64; 3], center: bool) -> [f64; 3] {
        let offset = if center { 0.5 } else { 0.0 };
        std::array::from_fn(|d| (point[d] - self.lower[d]) / self.size[d] - offset)
    }

    /// Convert a point between unit systems. No-op when `from == to`.
    pub fn convert_point(&self, point: [f64; 3], from: Units, to: Units) -> [f64; 3] {
        match (from, to) {
            (Units::Px, Units::Cm) => self.point_to_cm(point, true),
            (Units::Cm, Units::Px) => self.point_to_px(point, true),
            _ => point,
        }
    }

    /// Whether a point (in cm) lies inside the grid shrunk by `margin` on
    /// every side.
    pub fn contains(&self, point: ArrayView1<f64>, margin: f64) -> bool {
        (0..3).all(|d| {
            point[d] >= self.lower[d] + margin && point[d] <= self.upper[d] - margin
        })
    }
}

// ---------------------------------------------------------------------------
// Points – a unit-tagged point cloud
// ---------------------------------------------------------------------------

/// An `(N, 3)` coordinate array together with its unit system.
#[derive(Debug, Clone, PartialEq)]
pub struct Points {
    pub coords: Array2<f64>,
    pub units: Units,
}

impl Points {
    pub fn new(coords: Array2<f64>, units: Units) -> Self {
        Points { coords, units }
    }

    pub fn len(&self) -> usize {
        self.coords.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.nrows() == 0
    }

    /// Bring the coordinates to `target` units. Coordinates already in the
    /// target system are left untouched.
    pub fn convert(&mut self, meta: &Meta, target: Units) {
        if self.units == target {
            return;
        }
        match target {
            Units::Cm => meta.to_cm(&mut self.coords, true),
            Units::Px => meta.to_px(&mut self.coords, true),
        }
        self.units = target;
    }

    /// Copy-then-convert, leaving `self` untouched.
    pub fn converted(&self, meta: &Meta, target: Units) -> Points {
        let mut out = self.clone();
        out.convert(meta, target);
        out
    }

    /// Select a subset of rows.
    pub fn select(&self, index: &[usize]) -> Array2<f64> {
        self.coords.select(Axis(0), index)
    }
}

/// Barycentre of a point cloud, `None` when empty.
pub fn centroid(coords: &Array2<f64>) -> Option<[f64; 3]> {
    let mean: Array1<f64> = coords.mean_axis(Axis(0))?;
    Some([mean[0], mean[1], mean[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn meta() -> Meta {
        Meta {
            lower: [-10.0, 0.0, 5.0],
            upper: [10.0, 20.0, 25.0],
            size: [0.5, 0.5, 0.5],
        }
    }

    #[test]
    fn to_cm_centers_voxels() {
        let mut coords = array![[0.0, 0.0, 0.0], [3.0, 1.0, 2.0]];
        meta().to_cm(&mut coords, true);
        assert_eq!(coords, array![[-9.75, 0.25, 5.25], [-8.25, 0.75, 6.25]]);
    }

    #[test]
    fn converting_to_current_units_is_bit_identical() {
        let coords = array![[0.1, 0.2, 0.3], [1.0 / 3.0, 2.0 / 7.0, 1e-9]];
        let mut points = Points::new(coords.clone(), Units::Cm);
        points.convert(&meta(), Units::Cm);
        assert_eq!(points.units, Units::Cm);
        for (a, b) in points.coords.iter().zip(coords.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn px_cm_round_trip() {
        let original = Points::new(array![[4.0, 8.0, 12.0]], Units::Px);
        let cm = original.converted(&meta(), Units::Cm);
        assert_eq!(original.units, Units::Px);
        let back = cm.converted(&meta(), Units::Px);
        for (a, b) in back.coords.iter().zip(original.coords.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn contains_respects_margin() {
        let m = meta();
        assert!(m.contains(array![0.0, 10.0, 15.0].view(), 5.0));
        assert!(!m.contains(array![-6.0, 10.0, 15.0].view(), 5.0));
    }
}
