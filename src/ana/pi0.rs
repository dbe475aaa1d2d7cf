use serde::Deserialize;

use crate::data::batch::Entry;
use crate::data::globals::Pid;
use crate::error::RecoResult;
use crate::objects::{unit_vector, ObjectKind, Particle};

use super::writer::Row;
use super::AnaScript;

const LOG: &str = "log";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pi0Config {
    /// Accepted flash time window (us), bounds included.
    #[serde(default)]
    pub flash_min: f64,
    #[serde(default = "default_flash_max")]
    pub flash_max: f64,
}

fn default_flash_max() -> f64 {
    1.6
}

impl Default for Pi0Config {
    fn default() -> Self {
        Pi0Config {
            flash_min: 0.0,
            flash_max: default_flash_max(),
        }
    }
}

/// Selection of muon-neutrino charged-current interactions with a neutral
/// pion, reconstructed from its two photons.
#[derive(Debug, Clone)]
pub struct Pi0Ana {
    cfg: Pi0Config,
}

/// Opening angle (degrees) and invariant mass of a photon pair.
pub fn photon_pair(leading: &Particle, subleading: &Particle) -> (f64, f64) {
    let a = unit_vector(leading.start_dir);
    let b = unit_vector(subleading.start_dir);
    let cos = (0..3).map(|d| a[d] * b[d]).sum::<f64>().clamp(-1.0, 1.0);
    let angle = cos.acos().to_degrees();
    let mass = (2.0 * leading.calo_ke * subleading.calo_ke * (1.0 - cos)).sqrt();
    (angle, mass)
}

impl Pi0Ana {
    pub fn new(cfg: Pi0Config) -> Self {
        Pi0Ana { cfg }
    }

    fn in_flash_window(&self, time: Option<f64>) -> bool {
        time.is_some_and(|t| t >= self.cfg.flash_min && t <= self.cfg.flash_max)
    }
}

impl AnaScript for Pi0Ana {
    fn name(&self) -> &'static str {
        "pi0"
    }

    fn sinks(&self) -> &'static [&'static str] {
        &[LOG]
    }

    fn required_keys(&self) -> Vec<String> {
        vec![
            "reco_particles".to_string(),
            "reco_interactions".to_string(),
            "truth_interactions".to_string(),
            format!("{}_r2t", ObjectKind::Interaction.matches_key()),
        ]
    }

    fn process(&self, entry: &Entry) -> RecoResult<Vec<(&'static str, Row)>> {
        let particles = entry.reco_particles()?;
        let pairs = entry.match_pairs(ObjectKind::Interaction)?;

        let mut rows = Vec::new();
        let (reco, truth) = (entry.reco_interactions()?, entry.truth_interactions()?);
        for (inter, matched, _) in pairs.reco_to_truth(reco, truth) {
            if matched.is_none() {
                continue;
            }

            // Containment, fiducial and flash cuts
            if !inter.is_contained
                || !inter.is_fiducial
                || !self.in_flash_window(inter.flash_time)
            {
                continue;
            }

            // Exactly one primary muon
            let primaries: Vec<&Particle> = inter
                .particles(particles)
                .filter(|p| p.is_primary)
                .collect();
            if primaries.iter().filter(|p| p.pid == Pid::Muon).count() != 1 {
                continue;
            }

            // At least two primary photons, most energetic first
            let mut photons: Vec<&Particle> = primaries
                .into_iter()
                .filter(|p| p.pid == Pid::Photon)
                .collect();
            if photons.len() < 2 {
                continue;
            }
            photons.sort_by(|a, b| b.calo_ke.total_cmp(&a.calo_ke));
            let (leading, subleading) = (photons[0], photons[1]);
            let (angle, mass) = photon_pair(leading, subleading);

            let mut row = Row::new();
            row.set("reco_interaction_id", inter.id);
            row.set_xyz("reco_vertex", inter.vertex);
            row.set_xyz("reco_leading_ph_start_point", leading.start_point);
            row.set("reco_leading_ph_energy", leading.calo_ke);
            row.set_xyz("reco_subleading_ph_start_point", subleading.start_point);
            row.set("reco_subleading_ph_energy", subleading.calo_ke);
            row.set("opening_angle", angle);
            row.set("mass", mass);
            rows.push((LOG, row));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::matching::load_match_pairs;
    use crate::data::meta::Units;
    use crate::objects::{Interaction, MatchInfo};
    use std::collections::BTreeMap;

    fn particle(id: usize, pid: Pid, calo_ke: f64, dir: [f64; 3]) -> Particle {
        let mut p = Particle::new(id, false, Units::Cm);
        p.pid = pid;
        p.is_primary = true;
        p.calo_ke = calo_ke;
        p.start_dir = dir;
        p.start_point = [id as f64, 0.0, 0.0];
        p
    }

    fn entry(flash_time: Option<f64>, particles: Vec<Particle>) -> Entry {
        let mut reco = Interaction::new(0, false, Units::Cm);
        reco.particle_ids = (0..particles.len()).collect();
        reco.is_contained = true;
        reco.is_fiducial = true;
        reco.flash_time = flash_time;
        reco.vertex = [1.0, 2.0, 3.0];
        reco.matches = MatchInfo {
            is_matched: true,
            match_ids: vec![0],
            match_overlaps: vec![0.8],
        };
        let truth = Interaction::new(0, true, Units::Cm);

        let mut entry = Entry::new(0, BTreeMap::new());
        let pairs = load_match_pairs(&[reco.clone()], &[truth.clone()]).unwrap();
        entry.matches.insert(ObjectKind::Interaction, pairs);
        entry.reco_interactions = Some(vec![reco]);
        entry.truth_interactions = Some(vec![truth]);
        entry.reco_particles = Some(particles);
        entry
    }

    fn pi0_particles() -> Vec<Particle> {
        vec![
            particle(0, Pid::Muon, 300.0, [0.0, 0.0, 1.0]),
            particle(1, Pid::Photon, 50.0, [0.0, 1.0, 0.0]),
            particle(2, Pid::Photon, 100.0, [1.0, 0.0, 0.0]),
            particle(3, Pid::Photon, 10.0, [1.0, 0.0, 0.0]),
        ]
    }

    #[test]
    fn selected_interaction_yields_one_row() {
        let ana = Pi0Ana::new(Pi0Config::default());
        let rows = ana.process(&entry(Some(0.5), pi0_particles())).unwrap();
        assert_eq!(rows.len(), 1);
        let (sink, row) = &rows[0];
        assert_eq!(*sink, "log");
        assert_eq!(row.get("reco_leading_ph_energy").and_then(|v| v.as_f64()), Some(100.0));
        assert_eq!(row.get("reco_subleading_ph_energy").and_then(|v| v.as_f64()), Some(50.0));
        assert_eq!(row.get("reco_leading_ph_start_point_x").and_then(|v| v.as_f64()), Some(2.0));

        // Perpendicular photons: 90 degrees, m = sqrt(2 * 100 * 50)
        let angle = row.get("opening_angle").and_then(|v| v.as_f64()).unwrap();
        let mass = row.get("mass").and_then(|v| v.as_f64()).unwrap();
        assert!((angle - 90.0).abs() < 1e-9);
        assert!((mass - 100.0).abs() < 1e-9);
        assert_eq!(row.len(), 14);
    }

    #[test]
    fn flash_window_is_inclusive_and_required() {
        let ana = Pi0Ana::new(Pi0Config::default());
        assert_eq!(ana.process(&entry(Some(1.6), pi0_particles())).unwrap().len(), 1);
        assert!(ana.process(&entry(Some(1.7), pi0_particles())).unwrap().is_empty());
        assert!(ana.process(&entry(Some(-0.1), pi0_particles())).unwrap().is_empty());
        assert!(ana.process(&entry(None, pi0_particles())).unwrap().is_empty());
    }

    #[test]
    fn muon_and_photon_multiplicities_are_required() {
        let ana = Pi0Ana::new(Pi0Config::default());
        let mut two_muons = pi0_particles();
        two_muons[3].pid = Pid::Muon;
        two_muons[2].pid = Pid::Muon;
        assert!(ana.process(&entry(Some(0.5), two_muons)).unwrap().is_empty());

        let one_photon = pi0_particles()[..2].to_vec();
        assert!(ana.process(&entry(Some(0.5), one_photon)).unwrap().is_empty());

        let mut secondary = pi0_particles();
        secondary[0].is_primary = false;
        assert!(ana.process(&entry(Some(0.5), secondary)).unwrap().is_empty());
    }

    #[test]
    fn unmatched_interactions_are_skipped() {
        let ana = Pi0Ana::new(Pi0Config::default());
        let mut e = entry(Some(0.5), pi0_particles());
        let reco = e.reco_interactions.as_mut().unwrap();
        reco[0].matches = MatchInfo::default();
        let pairs = load_match_pairs(reco, e.truth_interactions.as_ref().unwrap()).unwrap();
        e.matches.insert(ObjectKind::Interaction, pairs);
        assert!(ana.process(&e).unwrap().is_empty());
    }
}
