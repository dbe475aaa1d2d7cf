/// Physics objects assembled from the chain output.
///
/// ```text
///   voxels ──► Fragment ──► Particle ──► Interaction
///                  (reco + truth flavour of each, linked by match lists)
/// ```
///
/// Every object carries its own [`MatchInfo`]: the candidate indices in the
/// opposite flavour's list, ordered by decreasing overlap, as attached by
/// the matcher.

pub mod fragment;
pub mod interaction;
pub mod labels;
pub mod particle;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::meta::{Meta, Units};

pub use fragment::Fragment;
pub use interaction::Interaction;
pub use labels::{NeutrinoLabel, ParticleLabel};
pub use particle::Particle;

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Fragment,
    Particle,
    Interaction,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [
        ObjectKind::Fragment,
        ObjectKind::Particle,
        ObjectKind::Interaction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Fragment => "fragment",
            ObjectKind::Particle => "particle",
            ObjectKind::Interaction => "interaction",
        }
    }

    /// Name of the reconstructed object list, e.g. `reco_particles`.
    pub fn reco_key(self) -> String {
        format!("reco_{}s", self.name())
    }

    /// Name of the true object list, e.g. `truth_particles`.
    pub fn truth_key(self) -> String {
        format!("truth_{}s", self.name())
    }

    /// Prefix of the four match-pair fields, e.g. `particle_matches`.
    pub fn matches_key(self) -> String {
        format!("{}_matches", self.name())
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Matching state
// ---------------------------------------------------------------------------

/// Match candidates of one object in the opposite flavour's list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(default)]
    pub is_matched: bool,
    /// Candidate indices, best overlap first.
    #[serde(default)]
    pub match_ids: Vec<usize>,
    #[serde(default)]
    pub match_overlaps: Vec<f64>,
}

impl MatchInfo {
    /// Best candidate and its overlap, if any.
    pub fn best(&self) -> Option<(usize, f64)> {
        let id = *self.match_ids.first()?;
        let overlap = self.match_overlaps.first().copied().unwrap_or(-1.0);
        Some((id, overlap))
    }
}

/// Objects that can take part in reco/truth matching.
pub trait Matchable {
    const KIND: ObjectKind;

    fn id(&self) -> usize;
    fn is_truth(&self) -> bool;
    fn match_info(&self) -> &MatchInfo;
    fn match_info_mut(&mut self) -> &mut MatchInfo;

    /// Voxel rows in the tensor shared by both flavours: the reconstructed
    /// data tensor for reco objects, the adapted label tensor for truth.
    fn match_index(&self) -> &[usize];

    fn is_matched(&self) -> bool {
        self.match_info().is_matched
    }
}

// ---------------------------------------------------------------------------
// Unit conversion
// ---------------------------------------------------------------------------

/// Anything with geometry tagged by a unit system.
pub trait UnitAware {
    fn units(&self) -> Units;

    /// Convert every coordinate attribute to `target` and retag.
    fn convert(&mut self, meta: &Meta, target: Units);

    /// Convert only if the current tag differs from `target`.
    fn ensure_units(&mut self, meta: &Meta, target: Units) {
        if self.units() != target {
            self.convert(meta, target);
        }
    }
}

/// Convert an `(N, 3)` point array between unit systems, in place.
pub(crate) fn convert_coords(
    coords: &mut ndarray::Array2<f64>,
    meta: &Meta,
    from: Units,
    to: Units,
) {
    match (from, to) {
        (Units::Px, Units::Cm) => meta.to_cm(coords, true),
        (Units::Cm, Units::Px) => meta.to_px(coords, true),
        _ => {}
    }
}

/// Normalise a vector, returning zeros for a null vector.
pub fn unit_vector(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm > 0.0 {
        [v[0] / norm, v[1] / norm, v[2] / norm]
    } else {
        [0.0; 3]
    }
}
