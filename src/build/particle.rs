use log::warn;

use crate::data::batch::Entry;
use crate::data::globals::{
    Pid, Shape, GROUP_COL, INTER_COL, LABEL_COLS, PID_COL, PRGRP_COL,
};
use crate::data::meta::Units;
use crate::error::{RecoError, RecoResult};
use crate::objects::{unit_vector, Particle};

use super::sources::Sources;
use super::{extrema, group_rows, majority_label, point_at, select, Builder};

/// Builds [`Particle`] objects.
#[derive(Debug, Clone)]
pub struct ParticleBuilder {
    pub units: Units,
}

impl ParticleBuilder {
    pub fn new(units: Units) -> Self {
        ParticleBuilder { units }
    }
}

impl Builder for ParticleBuilder {
    type Object = Particle;

    /// Reads `particle_clusts` and `particle_shapes`, plus the optional
    /// `particle_pids`, `particle_primary`, `particle_group_pred` (interaction
    /// assignment) and start/end points.
    fn build_reco(&self, entry: &Entry, sources: &Sources) -> RecoResult<Vec<Particle>> {
        let clusts = entry.clusters("particle_clusts")?;
        let shapes = entry.labels("particle_shapes")?;
        let pids = entry.opt_labels("particle_pids")?;
        let primaries = entry.opt_flags("particle_primary")?;
        let groups = entry.opt_labels("particle_group_pred")?;
        let starts = sources.point_overrides.get("particle_start_points");
        let ends = sources.point_overrides.get("particle_end_points");

        if shapes.len() != clusts.len() {
            return Err(RecoError::BatchLength {
                key: "particle_shapes".to_string(),
                expected: clusts.len(),
                got: shapes.len(),
            });
        }

        let mut particles = Vec::with_capacity(clusts.len());
        for (i, index) in clusts.iter().enumerate() {
            let (points, depositions) =
                select(&sources.points.coords, &sources.depositions, index)?;
            let mut part = Particle::new(i, false, self.units);
            part.depositions_sum = depositions.sum();
            part.index = index.clone();
            part.shape = Shape::from_label(shapes[i]);
            part.pid = pids
                .and_then(|p| p.get(i).copied())
                .map_or(Pid::Unknown, Pid::from_label);
            part.is_primary = primaries.and_then(|p| p.get(i).copied()).unwrap_or(false);
            part.interaction_id = groups.and_then(|g| g.get(i).copied()).unwrap_or(-1);
            part.module_ids = Sources::module_ids(sources.sources.as_ref(), index);

            let (a, b) = extrema(&points);
            part.start_point = starts.and_then(|s| point_at(&s.coords, i)).unwrap_or(a);
            part.end_point = ends.and_then(|e| point_at(&e.coords, i)).unwrap_or(b);

            part.points = points;
            part.depositions = depositions;
            particles.push(part);
        }
        Ok(particles)
    }

    /// One particle per group label of the label tensor, enriched with the
    /// simulation record of the same id when available.
    fn build_truth(&self, entry: &Entry, sources: &Sources) -> RecoResult<Vec<Particle>> {
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
        let adapt_groups = group_rows(adapt, GROUP_COL);

        let mut particles = Vec::new();
        for (i, (group_id, index)) in group_rows(label, GROUP_COL).into_iter().enumerate() {
            let (coords, depositions) = select(&points.coords, deps, &index)?;
            let mut part = Particle::new(i, true, self.units);
            part.index_adapt = adapt_groups.get(&group_id).cloned().unwrap_or_default();
            part.depositions_sum = depositions.sum();
            part.shape = Shape::from_label(majority_label(label, shape_col, &index));
            part.pid = Pid::from_label(majority_label(label, PID_COL, &index));
            part.interaction_id = majority_label(label, INTER_COL, &index);
            part.is_primary = majority_label(label, PRGRP_COL, &index) > 0;
            part.module_ids = Sources::module_ids(sources.sources_label.as_ref(), &index);

            let record = sources
                .particles
                .as_ref()
                .and_then(|labels| labels.iter().find(|p| p.id as i64 == group_id));
            match record {
                Some(record) => {
                    part.pdg_code = Some(record.pdg_code);
                    part.energy_init = Some(record.energy_init);
                    part.momentum = Some(record.momentum);
                    part.start_point = record.position;
                    part.end_point = record.end_position;
                    part.start_dir = unit_vector(record.momentum);
                }
                None => {
                    if sources.particles.is_some() {
                        warn!(
                            "Entry {}: no simulation record for true particle group {group_id}",
                            entry.index
                        );
                    }
                    let (a, b) = extrema(&coords);
                    part.start_point = a;
                    part.end_point = b;
                }
            }

            part.index = index;
            part.points = coords;
            part.depositions = depositions;
            particles.push(part);
        }
        Ok(particles)
    }

    fn lists(entry: &Entry) -> (Option<&[Particle]>, Option<&[Particle]>) {
        (
            entry.reco_particles.as_deref(),
            entry.truth_particles.as_deref(),
        )
    }

    fn store(entry: &mut Entry, reco: Option<Vec<Particle>>, truth: Option<Vec<Particle>>) {
        if reco.is_some() {
            entry.reco_particles = reco;
        }
        if truth.is_some() {
            entry.truth_particles = truth;
        }
    }
}
