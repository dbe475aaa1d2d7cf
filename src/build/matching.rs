//! Match pairs generated from the match candidates stored on each object.

use crate::error::{RecoError, RecoResult};
use crate::objects::Matchable;

/// Overlap given to a source object without an accepted match.
pub const NO_MATCH_OVERLAP: f64 = -1.0;

/// `(source position, best target position)` in the entry's object lists.
pub type MatchPair = (usize, Option<usize>);

/// The four match fields of one object kind in one entry:
/// `<kind>_matches_r2t`, `<kind>_matches_r2t_overlap`, `<kind>_matches_t2r`
/// and `<kind>_matches_t2r_overlap`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchPairs {
    pub r2t: Vec<MatchPair>,
    pub r2t_overlap: Vec<f64>,
    pub t2r: Vec<MatchPair>,
    pub t2r_overlap: Vec<f64>,
}

impl MatchPairs {
    /// Resolve the reco → truth pairs against the object lists they index.
    pub fn reco_to_truth<'a, T>(
        &'a self,
        reco: &'a [T],
        truth: &'a [T],
    ) -> impl Iterator<Item = (&'a T, Option<&'a T>, f64)> + 'a {
        resolve(&self.r2t, &self.r2t_overlap, reco, truth)
    }
}

fn resolve<'a, T>(
    pairs: &'a [MatchPair],
    overlaps: &'a [f64],
    sources: &'a [T],
    targets: &'a [T],
) -> impl Iterator<Item = (&'a T, Option<&'a T>, f64)> + 'a {
    pairs
        .iter()
        .zip(overlaps)
        .filter_map(move |(&(s, t), &overlap)| {
            let source = sources.get(s)?;
            Some((source, t.and_then(|t| targets.get(t)), overlap))
        })
}

/// Materialize the match pairs of one object kind in both directions.
///
/// Nothing is matched here: each source object contributes its first (best)
/// stored candidate, or `None` with an overlap of `-1` when it is not
/// matched. Output order follows the source lists.
pub fn load_match_pairs<T: Matchable>(reco: &[T], truth: &[T]) -> RecoResult<MatchPairs> {
    let (r2t, r2t_overlap) = pairs_from(reco, truth.len())?;
    let (t2r, t2r_overlap) = pairs_from(truth, reco.len())?;
    Ok(MatchPairs {
        r2t,
        r2t_overlap,
        t2r,
        t2r_overlap,
    })
}

fn pairs_from<T: Matchable>(
    sources: &[T],
    num_targets: usize,
) -> RecoResult<(Vec<MatchPair>, Vec<f64>)> {
    let mut pairs = Vec::with_capacity(sources.len());
    let mut overlaps = Vec::with_capacity(sources.len());
    for (i, obj) in sources.iter().enumerate() {
        if !obj.is_matched() {
            pairs.push((i, None));
            overlaps.push(NO_MATCH_OVERLAP);
            continue;
        }

        // The first candidate is always the best match
        let info = obj.match_info();
        let (best, overlap) = info.best().ok_or_else(|| RecoError::MissingProduct {
            key: format!("match_ids of {} {}", T::KIND, obj.id()),
        })?;
        if best >= num_targets {
            return Err(RecoError::MatchIndex {
                kind: T::KIND.name(),
                index: best,
                len: num_targets,
            });
        }
        pairs.push((i, Some(best)));
        overlaps.push(overlap);
    }
    Ok((pairs, overlaps))
}
