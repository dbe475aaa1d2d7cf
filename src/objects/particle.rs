use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::globals::{Pid, Shape};
use crate::data::meta::{Meta, Units};
use crate::data::rows;

use super::{convert_coords, MatchInfo, Matchable, ObjectKind, UnitAware};

/// A set of fragments attributed to a single particle instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: usize,
    #[serde(default)]
    pub is_truth: bool,
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
    pub shape: Shape,
    #[serde(default)]
    pub pid: Pid,
    #[serde(default)]
    pub start_point: [f64; 3],
    #[serde(default)]
    pub end_point: [f64; 3],
    #[serde(default)]
    pub start_dir: [f64; 3],
    #[serde(default)]
    pub end_dir: [f64; 3],
    #[serde(default = "minus_one")]
    pub interaction_id: i64,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub is_contained: bool,
    /// Calorimetric kinetic energy (MeV), set by the `calo_ke` processor.
    #[serde(default)]
    pub calo_ke: f64,
    #[serde(default)]
    pub module_ids: Vec<i64>,
    // Truth only, when the simulation particle list is available.
    #[serde(default)]
    pub pdg_code: Option<i64>,
    #[serde(default)]
    pub energy_init: Option<f64>,
    #[serde(default)]
    pub momentum: Option<[f64; 3]>,
    #[serde(flatten)]
    pub matches: MatchInfo,
    #[serde(default)]
    pub units: Units,
}

fn minus_one() -> i64 {
    -1
}

impl Particle {
    pub fn new(id: usize, is_truth: bool, units: Units) -> Self {
        Particle {
            id,
            is_truth,
            index: Vec::new(),
            index_adapt: Vec::new(),
            points: Array2::zeros((0, 3)),
            depositions: Array1::zeros(0),
            depositions_sum: 0.0,
            shape: Shape::Unknown,
            pid: Pid::Unknown,
            start_point: [0.0; 3],
            end_point: [0.0; 3],
            start_dir: [0.0; 3],
            end_dir: [0.0; 3],
            interaction_id: -1,
            is_primary: false,
            is_contained: false,
            calo_ke: 0.0,
            module_ids: Vec::new(),
            pdg_code: None,
            energy_init: None,
            momentum: None,
            matches: MatchInfo::default(),
            units,
        }
    }

    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// Swap the start and end of the particle. Both directions point into
    /// the particle, so they are swapped as well.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.start_point, &mut self.end_point);
        std::mem::swap(&mut self.start_dir, &mut self.end_dir);
    }
}

impl Matchable for Particle {
    const KIND: ObjectKind = ObjectKind::Particle;

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

impl UnitAware for Particle {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_swaps_ends_and_directions() {
        let mut p = Particle::new(0, false, Units::Cm);
        p.start_point = [0.0, 0.0, 0.0];
        p.end_point = [1.0, 2.0, 3.0];
        p.start_dir = [1.0, 0.0, 0.0];
        p.end_dir = [-1.0, 0.0, 0.0];
        p.flip();
        assert_eq!(p.start_point, [1.0, 2.0, 3.0]);
        assert_eq!(p.end_point, [0.0, 0.0, 0.0]);
        assert_eq!(p.start_dir, [-1.0, 0.0, 0.0]);
        assert_eq!(p.end_dir, [1.0, 0.0, 0.0]);
    }
}
