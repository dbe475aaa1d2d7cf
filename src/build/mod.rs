/// Object building: interpret the chain output as physics objects.
///
/// Architecture:
/// ```text
///   raw products (per entry)
///        │
///        ▼
///   ┌──────────┐
///   │ sources   │  candidate keys → points / depositions, unit conversion
///   └──────────┘
///        │
///        ▼
///   ┌──────────────────────────────┐
///   │ fragment → particle → interaction builders │  build or load
///   └──────────────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ matching  │  stored match candidates → r2t / t2r pairs
///   └──────────┘
/// ```

pub mod fragment;
pub mod interaction;
pub mod manager;
pub mod matching;
pub mod particle;
pub mod sources;

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::data::batch::Entry;
use crate::data::meta::{centroid, Meta, Units};
use crate::error::{RecoError, RecoResult};
use crate::objects::{Matchable, ObjectKind, UnitAware};

use sources::{Sources, META_KEY};

pub use manager::{BuildConfig, BuildManager};
pub use matching::{load_match_pairs, MatchPairs};

// ---------------------------------------------------------------------------
// BuildMode
// ---------------------------------------------------------------------------

/// Which flavours of objects to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Reco,
    Truth,
    #[default]
    Both,
    /// Both flavours, loaded from previously stored objects.
    All,
}

impl BuildMode {
    pub fn builds_reco(self) -> bool {
        self != BuildMode::Truth
    }

    pub fn builds_truth(self) -> bool {
        self != BuildMode::Reco
    }

    /// Whether match pairs can be formed.
    pub fn pairs(self) -> bool {
        matches!(self, BuildMode::Both | BuildMode::All)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds (or loads) the reco and truth lists of one object kind.
pub trait Builder {
    type Object: Matchable + UnitAware + DeserializeOwned + Clone;

    fn kind(&self) -> ObjectKind {
        <Self::Object as Matchable>::KIND
    }

    /// Construct reconstructed objects from the chain output of one entry.
    fn build_reco(&self, entry: &Entry, sources: &Sources) -> RecoResult<Vec<Self::Object>>;

    /// Construct true objects from the label tensors of one entry.
    fn build_truth(&self, entry: &Entry, sources: &Sources) -> RecoResult<Vec<Self::Object>>;

    /// Current `(reco, truth)` lists of the entry.
    fn lists(entry: &Entry) -> (Option<&[Self::Object]>, Option<&[Self::Object]>);

    /// Store freshly built or loaded lists; `None` leaves a list untouched.
    fn store(entry: &mut Entry, reco: Option<Vec<Self::Object>>, truth: Option<Vec<Self::Object>>);
}

/// Load objects stored in their serialized form under `key` and bring them
/// to `units`.
pub fn load_objects<T>(entry: &Entry, key: &str, units: Units) -> RecoResult<Vec<T>>
where
    T: DeserializeOwned + UnitAware,
{
    let value = entry.objects(key)?;
    let mut objects: Vec<T> = serde_json::from_value(value.clone())?;
    if objects.iter().any(|o| o.units() != units) {
        let meta: &Meta = entry.meta(META_KEY)?.ok_or(RecoError::MissingMeta)?;
        for obj in objects.iter_mut() {
            obj.ensure_units(meta, units);
        }
    }
    Ok(objects)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Reject voxel indices beyond the source tensor.
pub(crate) fn check_index(index: &[usize], rows: usize) -> RecoResult<()> {
    match index.iter().find(|&&i| i >= rows) {
        Some(&i) => Err(RecoError::VoxelIndex { index: i, rows }),
        None => Ok(()),
    }
}

/// Coordinates and values of a subset of voxels.
pub(crate) fn select(
    coords: &Array2<f64>,
    values: &Array1<f64>,
    index: &[usize],
) -> RecoResult<(Array2<f64>, Array1<f64>)> {
    check_index(index, coords.nrows().min(values.len()))?;
    Ok((coords.select(Axis(0), index), values.select(Axis(0), index)))
}

/// Group tensor rows by the integer label in `col`, skipping negative labels.
pub(crate) fn group_rows(tensor: &Array2<f64>, col: usize) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    if col >= tensor.ncols() {
        return groups;
    }
    for (i, &label) in tensor.column(col).iter().enumerate() {
        let label = label as i64;
        if label >= 0 {
            groups.entry(label).or_default().push(i);
        }
    }
    groups
}

/// Most common integer label of a column over a set of rows (ties go to the
/// smallest label), `-1` for an empty set.
pub(crate) fn majority_label(tensor: &Array2<f64>, col: usize, index: &[usize]) -> i64 {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for &i in index {
        *counts.entry(tensor[[i, col]] as i64).or_default() += 1;
    }
    counts
        .into_iter()
        .fold((-1, 0), |best, (label, n)| if n > best.1 { (label, n) } else { best })
        .0
}

/// Two extreme points of a cloud: the point furthest from the centroid,
/// then the point furthest from that one.
pub(crate) fn extrema(coords: &Array2<f64>) -> ([f64; 3], [f64; 3]) {
    let Some(center) = centroid(coords) else {
        return ([0.0; 3], [0.0; 3]);
    };
    let furthest_from = |p: [f64; 3]| -> [f64; 3] {
        let mut best = p;
        let mut best_d = -1.0;
        for row in coords.outer_iter() {
            let d: f64 = (0..3).map(|k| (row[k] - p[k]).powi(2)).sum();
            if d > best_d {
                best_d = d;
                best = [row[0], row[1], row[2]];
            }
        }
        best
    };
    let a = furthest_from(center);
    let b = furthest_from(a);
    (a, b)
}

/// Row `i` of an `(N, 3)` array as a point.
pub(crate) fn point_at(coords: &Array2<f64>, i: usize) -> Option<[f64; 3]> {
    (i < coords.nrows()).then(|| [coords[[i, 0]], coords[[i, 1]], coords[[i, 2]]])
}
