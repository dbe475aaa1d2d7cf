use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::globals::Shape;
use crate::data::meta::{Meta, Units};
use crate::data::rows;

use super::{convert_coords, MatchInfo, Matchable, ObjectKind, UnitAware};

/// A connected group of voxels with a single semantic shape, the smallest
/// object the chain produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: usize,
    #[serde(default)]
    pub is_truth: bool,
    /// Rows of the source tensor this fragment is made of.
    pub index: Vec<usize>,
    /// Truth only: rows of the adapted label tensor.
    #[serde(default)]
    pub index_adapt: Vec<usize>,
    #[serde(with = "rows::points")]
    pub points: Array2<f64>,
    #[serde(with = "rows::values")]
    pub depositions: Array1<f64>,
    #[serde(default)]
    pub depositions_sum: f64,
    #[serde(default)]
    pub shape: Shape,
    #[serde(default)]
    pub start_point: [f64; 3],
    #[serde(default)]
    pub end_point: [f64; 3],
    #[serde(default)]
    pub start_dir: [f64; 3],
    #[serde(default)]
    pub end_dir: [f64; 3],
    #[serde(default = "minus_one")]
    pub particle_id: i64,
    #[serde(default = "minus_one")]
    pub interaction_id: i64,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_contained: bool,
    #[serde(default)]
    pub module_ids: Vec<i64>,
    #[serde(flatten)]
    pub matches: MatchInfo,
    #[serde(default)]
    pub units: Units,
}

fn minus_one() -> i64 {
    -1
}

impl Fragment {
    /// An empty fragment of the given flavour, to be filled by a builder.
    pub fn new(id: usize, is_truth: bool, units: Units) -> Self {
        Fragment {
            id,
            is_truth,
            index: Vec::new(),
            index_adapt: Vec::new(),
            points: Array2::zeros((0, 3)),
            depositions: Array1::zeros(0),
            depositions_sum: 0.0,
            shape: Shape::Unknown,
            start_point: [0.0; 3],
            end_point: [0.0; 3],
            start_dir: [0.0; 3],
            end_dir: [0.0; 3],
            particle_id: -1,
            interaction_id: -1,
            is_primary: false,
            is_contained: false,
            module_ids: Vec::new(),
            matches: MatchInfo::default(),
            units,
        }
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }
}

impl Matchable for Fragment {
    const KIND: ObjectKind = ObjectKind::Fragment;

    fn id(&self) -> usize {
        self.id
    }

    fn is_truth(&self) -> bool {
        self.is_truth
    }

    fn match_info(&self) -> &MatchInfo {
        &self.matches
    }

    fn match_info_mut(&mut self) -> &mut MatchInfo {
        &mut self.matches
    }

    fn match_index(&self) -> &[usize] {
        if self.is_truth {
            &self.index_adapt
        } else {
            &self.index
        }
    }
}

impl UnitAware for Fragment {
    fn units(&self) -> Units {
        self.units
    }

    fn convert(&mut self, meta: &Meta, target: Units) {
        convert_coords(&mut self.points, meta, self.units, target);
        self.start_point = meta.convert_point(self.start_point, self.units, target);
        self.end_point = meta.convert_point(self.end_point, self.units, target);
        self.units = target;
    }
}
