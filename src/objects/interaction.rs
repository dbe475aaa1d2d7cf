use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::meta::{Meta, Units};
use crate::data::rows;

use super::{convert_coords, MatchInfo, Matchable, ObjectKind, Particle, UnitAware};

/// A group of particles sharing a common vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: usize,
    #[serde(default)]
    pub is_truth: bool,
    /// Positions of the member particles in the entry's particle list.
    pub particle_ids: Vec<usize>,
    pub index: Vec<usize>,
    #[serde(default)]
    pub index_adapt: Vec<usize>,
    #[serde(with = "rows::points")]
    pub points: Array2<f64>,
    #[serde(with = "rows::values")]
    pub depositions: Array1<f64>,
    #[serde(default)]
    pub depositions_sum: f64,
    #[serde(default)]
    pub vertex: [f64; 3],
    #[serde(default)]
    pub is_contained: bool,
    #[serde(default)]
    pub is_fiducial: bool,
    /// Time of the matched optical flash (us).
    #[serde(default)]
    pub flash_time: Option<f64>,
    #[serde(default = "minus_one")]
    pub nu_id: i64,
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

impl Interaction {
    pub fn new(id: usize, is_truth: bool, units: Units) -> Self {
        Interaction {
            id,
            is_truth,
            particle_ids: Vec::new(),
            index: Vec::new(),
            index_adapt: Vec::new(),
            points: Array2::zeros((0, 3)),
            depositions: Array1::zeros(0),
            depositions_sum: 0.0,
            vertex: [0.0; 3],
            is_contained: false,
            is_fiducial: false,
            flash_time: None,
            nu_id: -1,
            module_ids: Vec::new(),
            matches: MatchInfo::default(),
            units,
        }
    }

    /// Member particles, looked up in the entry's particle list of the same
    /// flavour. Stale ids are skipped.
    pub fn particles<'a>(&'a self, all: &'a [Particle]) -> impl Iterator<Item = &'a Particle> + 'a {
        self.particle_ids.iter().filter_map(move |&i| all.get(i))
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }
}

impl Matchable for Interaction {
    const KIND: ObjectKind = ObjectKind::Interaction;

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

impl UnitAware for Interaction {
    fn units(&self) -> Units {
        self.units
    }

    fn convert(&mut self, meta: &Meta, target: Units) {
        convert_coords(&mut self.points, meta, self.units, target);
        self.vertex = meta.convert_point(self.vertex, self.units, target);
        self.units = target;
    }
}
