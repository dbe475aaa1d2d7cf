use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};

use crate::data::batch::Entry;
use crate::data::meta::Units;
use crate::error::{RecoError, RecoResult};
use crate::objects::{Interaction, Particle};

use super::sources::Sources;
use super::Builder;

/// Builds [`Interaction`] objects by grouping the particles of the same
/// flavour. Particles must have been built first.
#[derive(Debug, Clone)]
pub struct InteractionBuilder {
    pub units: Units,
}

impl InteractionBuilder {
    pub fn new(units: Units) -> Self {
        InteractionBuilder { units }
    }

    /// Group particles by interaction id. Particles without an interaction
    /// id each form their own group, after the labelled ones.
    fn groups(particles: &[Particle]) -> Vec<(i64, Vec<usize>)> {
        let mut labelled: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        let mut orphans = Vec::new();
        for (i, p) in particles.iter().enumerate() {
            if p.interaction_id >= 0 {
                labelled.entry(p.interaction_id).or_default().push(i);
            } else {
                orphans.push((-1, vec![i]));
            }
        }
        labelled.into_iter().chain(orphans).collect()
    }

    fn assemble(
        &self,
        id: usize,
        is_truth: bool,
        members: &[usize],
        particles: &[Particle],
    ) -> RecoResult<Interaction> {
        let mut inter = Interaction::new(id, is_truth, self.units);
        inter.particle_ids = members.to_vec();
        let parts: Vec<&Particle> = members.iter().map(|&i| &particles[i]).collect();

        inter.index = parts.iter().flat_map(|p| p.index.iter().copied()).collect();
        inter.index_adapt = parts
            .iter()
            .flat_map(|p| p.index_adapt.iter().copied())
            .collect();
        let views: Vec<_> = parts.iter().map(|p| p.points.view()).collect();
        inter.points = if views.is_empty() {
            Array2::zeros((0, 3))
        } else {
            ndarray::concatenate(Axis(0), &views)
                .map_err(|source| RecoError::Points { id, source })?
        };
        inter.depositions = parts
            .iter()
            .flat_map(|p| p.depositions.iter().copied())
            .collect::<Array1<f64>>();
        inter.depositions_sum = inter.depositions.sum();

        let mut module_ids: Vec<i64> = parts.iter().flat_map(|p| p.module_ids.clone()).collect();
        module_ids.sort_unstable();
        module_ids.dedup();
        inter.module_ids = module_ids;

        // Vertex: average start of the primaries, of every particle otherwise
        let primaries: Vec<&&Particle> = parts.iter().filter(|p| p.is_primary).collect();
        let starts: Vec<[f64; 3]> = if primaries.is_empty() {
            parts.iter().map(|p| p.start_point).collect()
        } else {
            primaries.iter().map(|p| p.start_point).collect()
        };
        if !starts.is_empty() {
            let n = starts.len() as f64;
            inter.vertex = std::array::from_fn(|d| starts.iter().map(|s| s[d]).sum::<f64>() / n);
        }
        Ok(inter)
    }
}

impl Builder for InteractionBuilder {
    type Object = Interaction;

    /// Optionally reads `interaction_flash_times`, one value per interaction.
    fn build_reco(&self, entry: &Entry, _sources: &Sources) -> RecoResult<Vec<Interaction>> {
        let particles = entry.reco_particles()?;
        let flash_times = entry.opt_values("interaction_flash_times")?;

        let mut interactions = Vec::new();
        for (i, (_, members)) in Self::groups(particles).into_iter().enumerate() {
            let mut inter = self.assemble(i, false, &members, particles)?;
            inter.flash_time = flash_times.and_then(|t| t.get(i).copied());
            interactions.push(inter);
        }
        Ok(interactions)
    }

    /// True vertices come from the neutrino record of the interaction when
    /// there is one.
    fn build_truth(&self, entry: &Entry, sources: &Sources) -> RecoResult<Vec<Interaction>> {
        let particles = entry.truth_particles()?;

        let mut interactions = Vec::new();
        for (i, (inter_id, members)) in Self::groups(particles).into_iter().enumerate() {
            let mut inter = self.assemble(i, true, &members, particles)?;
            let neutrino = sources
                .neutrinos
                .as_ref()
                .and_then(|nus| nus.iter().find(|nu| inter_id >= 0 && nu.interaction_id == inter_id));
            if let Some(nu) = neutrino {
                inter.nu_id = nu.id as i64;
                inter.vertex = nu.position;
            }
            interactions.push(inter);
        }
        Ok(interactions)
    }

    fn lists(entry: &Entry) -> (Option<&[Interaction]>, Option<&[Interaction]>) {
        (
            entry.reco_interactions.as_deref(),
            entry.truth_interactions.as_deref(),
        )
    }

    fn store(entry: &mut Entry, reco: Option<Vec<Interaction>>, truth: Option<Vec<Interaction>>) {
        if reco.is_some() {
            entry.reco_interactions = reco;
        }
        if truth.is_some() {
            entry.truth_interactions = truth;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(id: usize, interaction_id: i64, is_primary: bool, start: [f64; 3]) -> Particle {
        let mut p = Particle::new(id, false, Units::Cm);
        p.interaction_id = interaction_id;
        p.is_primary = is_primary;
        p.start_point = start;
        p.index = vec![id];
        p.points = Array2::from_shape_vec((1, 3), start.to_vec()).unwrap();
        p.depositions = Array1::from(vec![1.0]);
        p
    }

    #[test]
    fn particles_are_grouped_by_interaction_id_with_orphans_last() {
        let particles = vec![
            particle(0, 1, false, [0.0; 3]),
            particle(1, -1, false, [0.0; 3]),
            particle(2, 0, false, [0.0; 3]),
            particle(3, 1, false, [0.0; 3]),
        ];
        let groups = InteractionBuilder::groups(&particles);
        let members: Vec<Vec<usize>> = groups.into_iter().map(|(_, m)| m).collect();
        assert_eq!(members, vec![vec![2], vec![0, 3], vec![1]]);
    }

    #[test]
    fn vertex_averages_primary_starts() {
        let particles = vec![
            particle(0, 0, true, [0.0, 0.0, 0.0]),
            particle(1, 0, true, [2.0, 2.0, 2.0]),
            particle(2, 0, false, [10.0, 10.0, 10.0]),
        ];
        let builder = InteractionBuilder::new(Units::Cm);
        let inter = builder.assemble(0, false, &[0, 1, 2], &particles).unwrap();
        assert_eq!(inter.vertex, [1.0, 1.0, 1.0]);
        assert_eq!(inter.index, vec![0, 1, 2]);
        assert_eq!(inter.points.nrows(), 3);
        assert_eq!(inter.depositions_sum, 3.0);
    }

    #[test]
    fn mismatched_point_columns_are_an_error() {
        let mut particles = vec![particle(0, 0, true, [0.0; 3]), particle(1, 0, true, [1.0; 3])];
        particles[1].points = Array2::zeros((2, 2));
        let builder = InteractionBuilder::new(Units::Cm);
        let err = builder.assemble(4, false, &[0, 1], &particles).unwrap_err();
        assert!(matches!(err, RecoError::Points { id: 4, .. }));
    }
}
