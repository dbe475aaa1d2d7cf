use std::collections::HashSet;

use log::debug;
use serde::Deserialize;

use crate::build::matching::{load_match_pairs, MatchPairs};
use crate::data::batch::{Batch, Entry, FieldUpdate};
use crate::error::{RecoError, RecoResult};
use crate::objects::{Matchable, ObjectKind};

use super::PostProcessor;

/// How the overlap between a reco and a truth object is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapMethod {
    /// Intersection over union of the voxel sets.
    #[default]
    Iou,
    /// Number of shared voxels.
    Count,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchConfig {
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ObjectKind>,
    #[serde(default)]
    pub method: OverlapMethod,
    /// A match is accepted when the best overlap exceeds this value.
    #[serde(default)]
    pub min_overlap: f64,
}

fn default_kinds() -> Vec<ObjectKind> {
    vec![ObjectKind::Particle, ObjectKind::Interaction]
}

/// Overlap between two voxel index sets.
pub fn overlap(a: &[usize], b: &[usize], method: OverlapMethod) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let large: HashSet<usize> = large.iter().copied().collect();
    let shared = small.iter().filter(|i| large.contains(i)).count();
    match method {
        OverlapMethod::Count => shared as f64,
        OverlapMethod::Iou => {
            let union = a.len() + b.len() - shared;
            if union == 0 {
                0.0
            } else {
                shared as f64 / union as f64
            }
        }
    }
}

/// Attach match candidates to every object of both lists, in place.
///
/// Candidates are the objects of the other list with a positive overlap,
/// best first (ties keep list order). An object is matched when its best
/// overlap exceeds `min_overlap`.
pub fn match_objects<T: Matchable>(
    reco: &mut [T],
    truth: &mut [T],
    method: OverlapMethod,
    min_overlap: f64,
) {
    let overlaps: Vec<Vec<f64>> = reco
        .iter()
        .map(|r| {
            truth
                .iter()
                .map(|t| overlap(r.match_index(), t.match_index(), method))
                .collect()
        })
        .collect();

    for (i, r) in reco.iter_mut().enumerate() {
        assign(r, (0..overlaps[i].len()).map(|j| (j, overlaps[i][j])), min_overlap);
    }
    for (j, t) in truth.iter_mut().enumerate() {
        assign(t, overlaps.iter().map(|row| row[j]).enumerate(), min_overlap);
    }
}

fn assign<T: Matchable>(
    obj: &mut T,
    candidates: impl Iterator<Item = (usize, f64)>,
    min_overlap: f64,
) {
    let mut candidates: Vec<(usize, f64)> = candidates.filter(|(_, o)| *o > 0.0).collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let info = obj.match_info_mut();
    info.is_matched = candidates.first().is_some_and(|(_, o)| *o > min_overlap);
    info.match_ids = candidates.iter().map(|(j, _)| *j).collect();
    info.match_overlaps = candidates.iter().map(|(_, o)| *o).collect();
}

fn run<T: Matchable + Clone>(
    reco: Option<&Vec<T>>,
    truth: Option<&Vec<T>>,
    kind: ObjectKind,
    cfg: &MatchConfig,
) -> RecoResult<(Vec<T>, Vec<T>, MatchPairs)> {
    let missing = |key: String| RecoError::MissingField {
        module: "match".to_string(),
        key,
    };
    let mut reco = reco.ok_or_else(|| missing(kind.reco_key()))?.clone();
    let mut truth = truth.ok_or_else(|| missing(kind.truth_key()))?.clone();
    match_objects(&mut reco, &mut truth, cfg.method, cfg.min_overlap);
    let pairs = load_match_pairs(&reco, &truth)?;
    Ok((reco, truth, pairs))
}

/// Matches reconstructed objects to true objects by voxel overlap and
/// regenerates the match pairs.
#[derive(Debug, Clone)]
pub struct MatchProcessor {
    cfg: MatchConfig,
}

impl MatchProcessor {
    pub fn new(cfg: MatchConfig) -> RecoResult<Self> {
        if cfg.kinds.is_empty() {
            return Err(RecoError::config("match", "no object kind to match"));
        }
        if cfg.method == OverlapMethod::Iou && !(0.0..1.0).contains(&cfg.min_overlap) {
            return Err(RecoError::config(
                "match",
                format!("IoU threshold {} outside [0, 1)", cfg.min_overlap),
            ));
        }
        Ok(MatchProcessor { cfg })
    }

    fn process_kind(&self, data: &Entry, kind: ObjectKind) -> RecoResult<Vec<FieldUpdate>> {
        let updates = match kind {
            ObjectKind::Fragment => {
                let (r, t, pairs) = run(
                    data.reco_fragments.as_ref(),
                    data.truth_fragments.as_ref(),
                    kind,
                    &self.cfg,
                )?;
                vec![
                    FieldUpdate::RecoFragments(r),
                    FieldUpdate::TruthFragments(t),
                    FieldUpdate::Matches(kind, pairs),
                ]
            }
            ObjectKind::Particle => {
                let (r, t, pairs) = run(
                    data.reco_particles.as_ref(),
                    data.truth_particles.as_ref(),
                    kind,
                    &self.cfg,
                )?;
                vec![
                    FieldUpdate::RecoParticles(r),
                    FieldUpdate::TruthParticles(t),
                    FieldUpdate::Matches(kind, pairs),
                ]
            }
            ObjectKind::Interaction => {
                let (r, t, pairs) = run(
                    data.reco_interactions.as_ref(),
                    data.truth_interactions.as_ref(),
                    kind,
                    &self.cfg,
                )?;
                vec![
                    FieldUpdate::RecoInteractions(r),
                    FieldUpdate::TruthInteractions(t),
                    FieldUpdate::Matches(kind, pairs),
                ]
            }
        };
        Ok(updates)
    }
}

impl PostProcessor for MatchProcessor {
    fn name(&self) -> &'static str {
        "match"
    }

    fn required_keys(&self) -> Vec<String> {
        self.cfg
            .kinds
            .iter()
            .flat_map(|k| [k.reco_key(), k.truth_key()])
            .collect()
    }

    fn process(&self, batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>> {
        let data = batch.entry(entry);
        let mut updates = Vec::new();
        for &kind in &self.cfg.kinds {
            updates.extend(self.process_kind(data, kind)?);
        }
        debug!("Entry {}: matched {:?}", data.index, self.cfg.kinds);
        Ok(updates)
    }
}
