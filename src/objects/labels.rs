use serde::{Deserialize, Serialize};

use crate::data::globals::Shape;
use crate::data::meta::{Meta, Units};

use super::UnitAware;

/// Simulation record of one true particle, as stored next to the label
/// tensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleLabel {
    pub id: usize,
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub interaction_id: i64,
    #[serde(default = "minus_one")]
    pub nu_id: i64,
    pub pdg_code: i64,
    #[serde(default)]
    pub energy_init: f64,
    pub position: [f64; 3],
    pub end_position: [f64; 3],
    #[serde(default)]
    pub momentum: [f64; 3],
    #[serde(default)]
    pub shape: Shape,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default = "pixels")]
    pub units: Units,
}

/// Simulation record of one true neutrino.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutrinoLabel {
    pub id: usize,
    #[serde(default)]
    pub interaction_id: i64,
    pub pdg_code: i64,
    #[serde(default)]
    pub energy_init: f64,
    pub position: [f64; 3],
    #[serde(default = "pixels")]
    pub units: Units,
}

fn minus_one() -> i64 {
    -1
}

/// Simulation labels are recorded in image coordinates unless tagged.
fn pixels() -> Units {
    Units::Px
}

impl UnitAware for ParticleLabel {
    fn units(&self) -> Units {
        self.units
    }

    fn convert(&mut self, meta: &Meta, target: Units) {
        self.position = meta.convert_point(self.position, self.units, target);
        self.end_position = meta.convert_point(self.end_position, self.units, target);
        self.units = target;
    }
}

impl UnitAware for NeutrinoLabel {
    fn units(&self) -> Units {
        self.units
    }

    fn convert(&mut self, meta: &Meta, target: Units) {
        self.position = meta.convert_point(self.position, self.units, target);
        self.units = target;
    }
}
