use serde::Deserialize;

use crate::data::batch::{Batch, FieldUpdate};
use crate::data::globals::Shape;
use crate::error::RecoResult;

use super::PostProcessor;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaloConfig {
    /// Conversion from deposited charge/energy units to MeV.
    #[serde(default = "one")]
    pub scaling: f64,
    /// Extra correction applied to showers only.
    #[serde(default = "one")]
    pub shower_fudge: f64,
}

fn one() -> f64 {
    1.0
}

/// Sets `calo_ke` on reconstructed particles from their summed depositions.
#[derive(Debug, Clone)]
pub struct CalorimetricEnergyProcessor {
    cfg: CaloConfig,
}

impl CalorimetricEnergyProcessor {
    pub fn new(cfg: CaloConfig) -> Self {
        CalorimetricEnergyProcessor { cfg }
    }
}

impl PostProcessor for CalorimetricEnergyProcessor {
    fn name(&self) -> &'static str {
        "calo_ke"
    }

    fn required_keys(&self) -> Vec<String> {
        vec!["reco_particles".to_string()]
    }

    fn process(&self, batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>> {
        let mut particles = batch.entry(entry).reco_particles()?.to_vec();
        for part in particles.iter_mut() {
            let mut ke = self.cfg.scaling * part.depositions.sum();
            if part.shape == Shape::Shower {
                ke *= self.cfg.shower_fudge;
            }
            part.calo_ke = ke;
        }
        Ok(vec![FieldUpdate::RecoParticles(particles)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::meta::Units;
    use crate::objects::Particle;
    use ndarray::array;
    use std::collections::BTreeMap;

    #[test]
    fn showers_get_the_fudge_factor() {
        let mut track = Particle::new(0, false, Units::Cm);
        track.shape = Shape::Track;
        track.depositions = array![1.0, 2.0];
        let mut shower = track.clone();
        shower.id = 1;
        shower.shape = Shape::Shower;

        let mut batch = Batch::single(0, BTreeMap::new());
        batch.entries[0].reco_particles = Some(vec![track, shower]);

        let module = CalorimetricEnergyProcessor::new(CaloConfig {
            scaling: 2.0,
            shower_fudge: 1.5,
        });
        let updates = module.process(&batch, 0).unwrap();
        let [FieldUpdate::RecoParticles(parts)] = updates.as_slice() else {
            panic!("expected a single particle update");
        };
        assert_eq!(parts[0].calo_ke, 6.0);
        assert_eq!(parts[1].calo_ke, 9.0);
    }
}
