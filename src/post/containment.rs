use ndarray::{aview1, Array2};
use serde::Deserialize;

use crate::build::sources::META_KEY;
use crate::data::batch::{Batch, Entry, FieldUpdate};
use crate::data::meta::{Meta, Units};
use crate::error::{RecoError, RecoResult};

use super::PostProcessor;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarginConfig {
    /// Distance (cm) from the grid boundaries an object must keep.
    #[serde(default)]
    pub margin: f64,
}

fn entry_meta(entry: &Entry) -> RecoResult<&Meta> {
    entry.meta(META_KEY)?.ok_or(RecoError::MissingMeta)
}

/// Whether every point of a cloud lies inside the volume shrunk by `margin`.
pub fn points_contained(points: &Array2<f64>, units: Units, meta: &Meta, margin: f64) -> bool {
    let mut cm;
    let points = if units == Units::Px {
        cm = points.clone();
        meta.to_cm(&mut cm, true);
        &cm
    } else {
        points
    };
    points.rows().into_iter().all(|p| meta.contains(p, margin))
}

// ---------------------------------------------------------------------------
// Containment
// ---------------------------------------------------------------------------

/// Flags reconstructed particles (and interactions, when built) whose
/// points all lie inside the detector volume.
#[derive(Debug, Clone)]
pub struct ContainmentProcessor {
    cfg: MarginConfig,
}

impl ContainmentProcessor {
    pub fn new(cfg: MarginConfig) -> Self {
        ContainmentProcessor { cfg }
    }
}

impl PostProcessor for ContainmentProcessor {
    fn name(&self) -> &'static str {
        "containment"
    }

    fn required_keys(&self) -> Vec<String> {
        vec![META_KEY.to_string(), "reco_particles".to_string()]
    }

    fn process(&self, batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>> {
        let data = batch.entry(entry);
        let meta = entry_meta(data)?;
        let margin = self.cfg.margin;

        let mut particles = data.reco_particles()?.to_vec();
        for part in particles.iter_mut() {
            part.is_contained = points_contained(&part.points, part.units, meta, margin);
        }

        let mut updates = Vec::with_capacity(2);
        if let Some(interactions) = &data.reco_interactions {
            let mut interactions = interactions.clone();
            for inter in interactions.iter_mut() {
                let contained = inter.particles(&particles).all(|p| p.is_contained);
                inter.is_contained = contained;
            }
            updates.push(FieldUpdate::RecoInteractions(interactions));
        }
        updates.push(FieldUpdate::RecoParticles(particles));
        Ok(updates)
    }
}

// ---------------------------------------------------------------------------
// Fiducial volume
// ---------------------------------------------------------------------------

/// Flags reconstructed interactions whose vertex lies inside the fiducial
/// volume.
#[derive(Debug, Clone)]
pub struct FiducialProcessor {
    cfg: MarginConfig,
}

impl FiducialProcessor {
    pub fn new(cfg: MarginConfig) -> Self {
        FiducialProcessor { cfg }
    }
}

impl PostProcessor for FiducialProcessor {
    fn name(&self) -> &'static str {
        "fiducial"
    }

    fn required_keys(&self) -> Vec<String> {
        vec![META_KEY.to_string(), "reco_interactions".to_string()]
    }

    fn process(&self, batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>> {
        let data = batch.entry(entry);
        let meta = entry_meta(data)?;

        let mut interactions = data.reco_interactions()?.to_vec();
        for inter in interactions.iter_mut() {
            let vertex = meta.convert_point(inter.vertex, inter.units, Units::Cm);
            inter.is_fiducial = meta.contains(aview1(&vertex), self.cfg.margin);
        }
        Ok(vec![FieldUpdate::RecoInteractions(interactions)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batch::Product;
    use crate::objects::{Interaction, Particle};
    use ndarray::array;
    use std::collections::BTreeMap;

    fn meta() -> Meta {
        Meta {
            lower: [0.0; 3],
            upper: [10.0; 3],
            size: [1.0; 3],
        }
    }

    fn batch() -> Batch {
        let mut products = BTreeMap::new();
        products.insert(META_KEY.to_string(), Product::Meta(meta()));
        let mut batch = Batch::single(0, products);

        let mut inside = Particle::new(0, false, Units::Cm);
        inside.points = array![[1.0, 1.0, 1.0], [5.0, 5.0, 5.0]];
        let mut edge = Particle::new(1, false, Units::Cm);
        edge.points = array![[0.5, 5.0, 5.0]];
        let mut pixels = Particle::new(2, false, Units::Px);
        pixels.points = array![[9.7, 5.0, 5.0]];

        let mut contained = Interaction::new(0, false, Units::Cm);
        contained.particle_ids = vec![0];
        contained.vertex = [5.0; 3];
        let mut exiting = Interaction::new(1, false, Units::Cm);
        exiting.particle_ids = vec![1, 2];
        exiting.vertex = [0.5, 5.0, 5.0];

        let entry = &mut batch.entries[0];
        entry.reco_particles = Some(vec![inside, edge, pixels]);
        entry.reco_interactions = Some(vec![contained, exiting]);
        batch
    }

    #[test]
    fn containment_honours_margin_and_units() {
        let module = ContainmentProcessor::new(MarginConfig { margin: 0.0 });
        let mut b = batch();
        for update in module.process(&b, 0).unwrap() {
            b.entries[0].apply(update);
        }
        let parts = b.entries[0].reco_particles().unwrap();
        assert!(parts[0].is_contained);
        assert!(parts[1].is_contained);
        // 9.7 px is 10.2 cm
        assert!(!parts[2].is_contained);
        let inters = b.entries[0].reco_interactions().unwrap();
        assert!(inters[0].is_contained);
        assert!(!inters[1].is_contained);

        let strict = ContainmentProcessor::new(MarginConfig { margin: 1.0 });
        let updates = strict.process(&batch(), 0).unwrap();
        let parts = updates
            .iter()
            .find_map(|u| match u {
                FieldUpdate::RecoParticles(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert!(!parts[1].is_contained);
    }

    #[test]
    fn fiducial_cut_uses_the_vertex() {
        let module = FiducialProcessor::new(MarginConfig { margin: 1.0 });
        let updates = module.process(&batch(), 0).unwrap();
        let [FieldUpdate::RecoInteractions(inters)] = updates.as_slice() else {
            panic!("expected a single interaction update");
        };
        assert!(inters[0].is_fiducial);
        assert!(!inters[1].is_fiducial);
    }

    #[test]
    fn metadata_is_required() {
        let mut b = batch();
        b.entries[0].products.clear();
        let module = FiducialProcessor::new(MarginConfig::default());
        assert!(matches!(module.process(&b, 0), Err(RecoError::MissingMeta)));
    }
}
