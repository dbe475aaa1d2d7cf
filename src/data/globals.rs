//! Column layout of the chain tensors and the label enumerations shared by
//! every builder and post-processor.

use std::ops::Range;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tensor columns
// ---------------------------------------------------------------------------

pub const BATCH_COL: usize = 0;
pub const COORD_COLS: Range<usize> = 1..4;
pub const VALUE_COL: usize = 4;

// Label tensor columns (the shape label is always the last column).
pub const CLUST_COL: usize = 5;
pub const PART_COL: usize = 6;
pub const GROUP_COL: usize = 7;
pub const INTER_COL: usize = 8;
pub const NU_COL: usize = 9;
pub const PID_COL: usize = 10;
pub const PRGRP_COL: usize = 11;
pub const VTX_COLS: Range<usize> = 12..15;
pub const MOM_COL: usize = 15;

/// Minimum number of columns of a full cluster label tensor.
pub const LABEL_COLS: usize = MOM_COL + 2;

// PPN candidate columns: coordinates, score, then start/end classification.
pub const PPN_COORD_COLS: Range<usize> = 0..3;
pub const PPN_END_COLS: [usize; 2] = [4, 5];

// ---------------------------------------------------------------------------
// Semantic shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Shower,
    Track,
    Michel,
    Delta,
    LowEnergy,
    Ghost,
    #[default]
    Unknown,
}

impl Shape {
    /// Interpret a semantic label as stored in the chain tensors.
    pub fn from_label(label: i64) -> Self {
        match label {
            0 => Shape::Shower,
            1 => Shape::Track,
            2 => Shape::Michel,
            3 => Shape::Delta,
            4 => Shape::LowEnergy,
            5 => Shape::Ghost,
            _ => Shape::Unknown,
        }
    }

    pub fn label(self) -> i64 {
        match self {
            Shape::Shower => 0,
            Shape::Track => 1,
            Shape::Michel => 2,
            Shape::Delta => 3,
            Shape::LowEnergy => 4,
            Shape::Ghost => 5,
            Shape::Unknown => -1,
        }
    }
}

// ---------------------------------------------------------------------------
// Particle species
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pid {
    Photon,
    Electron,
    Muon,
    Pion,
    Proton,
    Kaon,
    #[default]
    Unknown,
}

impl Pid {
    pub fn from_label(label: i64) -> Self {
        match label {
            0 => Pid::Photon,
            1 => Pid::Electron,
            2 => Pid::Muon,
            3 => Pid::Pion,
            4 => Pid::Proton,
            5 => Pid::Kaon,
            _ => Pid::Unknown,
        }
    }

    /// Map a PDG code onto the coarse species used by the chain.
    pub fn from_pdg(pdg: i64) -> Self {
        match pdg.abs() {
            22 => Pid::Photon,
            11 => Pid::Electron,
            13 => Pid::Muon,
            211 => Pid::Pion,
            2212 => Pid::Proton,
            321 => Pid::Kaon,
            _ => Pid::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_labels_round_trip_and_unknowns_collapse() {
        for label in -1..=5 {
            assert_eq!(Shape::from_label(label).label(), label);
        }
        assert_eq!(Shape::from_label(42), Shape::Unknown);
    }

    #[test]
    fn pid_from_pdg_ignores_charge() {
        assert_eq!(Pid::from_pdg(-13), Pid::Muon);
        assert_eq!(Pid::from_pdg(2112), Pid::Unknown);
    }
}
