use crate::data::batch::Entry;
use crate::data::globals::{Shape, CLUST_COL, GROUP_COL, INTER_COL, LABEL_COLS, PRGRP_COL};
use crate::data::meta::Units;
use crate::error::{RecoError, RecoResult};
use crate::objects::Fragment;

use super::sources::Sources;
use super::{extrema, group_rows, majority_label, point_at, select, Builder};

/// Builds [`Fragment`] objects.
#[derive(Debug, Clone)]
pub struct FragmentBuilder {
    pub units: Units,
}

impl FragmentBuilder {
    pub fn new(units: Units) -> Self {
        FragmentBuilder { units }
    }
}

impl Builder for FragmentBuilder {
    type Object = Fragment;

    /// Reads `fragment_clusts` and `fragment_shapes`, plus the optional
    /// `fragment_group_pred`, `fragment_primary` and start/end points.
    fn build_reco(&self, entry: &Entry, sources: &Sources) -> RecoResult<Vec<Fragment>> {
        let clusts = entry.clusters("fragment_clusts")?;
        let shapes = entry.labels("fragment_shapes")?;
        let groups = entry.opt_labels("fragment_group_pred")?;
        let primaries = entry.opt_flags("fragment_primary")?;
        let starts = sources.point_overrides.get("fragment_start_points");
        let ends = sources.point_overrides.get("fragment_end_points");

        if shapes.len() != clusts.len() {
            return Err(RecoError::BatchLength {
                key: "fragment_shapes".to_string(),
                expected: clusts.len(),
                got: shapes.len(),
            });
        }

        let mut fragments = Vec::with_capacity(clusts.len());
        for (i, index) in clusts.iter().enumerate() {
            let (points, depositions) =
                select(&sources.points.coords, &sources.depositions, index)?;
            let mut frag = Fragment::new(i, false, self.units);
            frag.depositions_sum = depositions.sum();
            frag.index = index.clone();
            frag.shape = Shape::from_label(shapes[i]);
            frag.particle_id = groups.and_then(|g| g.get(i).copied()).unwrap_or(-1);
            frag.is_primary = primaries.and_then(|p| p.get(i).copied()).unwrap_or(false);
            frag.module_ids = Sources::module_ids(sources.sources.as_ref(), index);

            let (a, b) = extrema(&points);
            frag.start_point = starts.and_then(|s| point_at(&s.coords, i)).unwrap_or(a);
            frag.end_point = ends.and_then(|e| point_at(&e.coords, i)).unwrap_or(b);

            frag.points = points;
            frag.depositions = depositions;
            fragments.push(frag);
        }
        Ok(fragments)
    }

    /// One fragment per cluster label of the label tensor.
    fn build_truth(&self, _entry: &Entry, sources: &Sources) -> RecoResult<Vec<Fragment>> {
        let label = sources.label_tensor()?;
        let adapt = sources.label_adapt_tensor()?;
        let points = sources.points_label.as_ref().ok_or_else(|| RecoError::MissingProduct {
            key: "points_label".to_string(),
        })?;
        let deps = sources.depositions_label.as_ref().ok_or_else(|| RecoError::MissingProduct {
            key: "depositions_label".to_string(),
        })?;
        if label.nrows() > 0 && label.ncols() < LABEL_COLS {
            return Err(RecoError::Columns {
                key: "label_tensor".to_string(),
                expected: LABEL_COLS,
                got: label.ncols(),
            });
        }
        let shape_col = label.ncols().saturating_sub(1);
        let adapt_groups = group_rows(adapt, CLUST_COL);

        let mut fragments = Vec::new();
        for (i, (clust_id, index)) in group_rows(label, CLUST_COL).into_iter().enumerate() {
            let (coords, depositions) = select(&points.coords, deps, &index)?;
            let mut frag = Fragment::new(i, true, self.units);
            frag.index_adapt = adapt_groups.get(&clust_id).cloned().unwrap_or_default();
            frag.depositions_sum = depositions.sum();
            frag.shape = Shape::from_label(majority_label(label, shape_col, &index));
            frag.particle_id = majority_label(label, GROUP_COL, &index);
            frag.interaction_id = majority_label(label, INTER_COL, &index);
            frag.is_primary = majority_label(label, PRGRP_COL, &index) > 0;
            frag.module_ids = Sources::module_ids(sources.sources_label.as_ref(), &index);

            let (a, b) = extrema(&coords);
            frag.start_point = a;
            frag.end_point = b;

            frag.index = index;
            frag.points = coords;
            frag.depositions = depositions;
            fragments.push(frag);
        }
        Ok(fragments)
    }

    fn lists(entry: &Entry) -> (Option<&[Fragment]>, Option<&[Fragment]>) {
        (
            entry.reco_fragments.as_deref(),
            entry.truth_fragments.as_deref(),
        )
    }

    fn store(entry: &mut Entry, reco: Option<Vec<Fragment>>, truth: Option<Vec<Fragment>>) {
        if reco.is_some() {
            entry.reco_fragments = reco;
        }
        if truth.is_some() {
            entry.truth_fragments = truth;
        }
    }
}
