use log::debug;
use serde::Deserialize;

use crate::data::batch::{Batch, FieldUpdate};
use crate::data::globals::Shape;
use crate::error::{RecoError, RecoResult};

use super::tracking::{check_track_orientation, check_track_orientation_ppn, OrientationMethod};
use super::PostProcessor;

/// Product holding the PPN point candidates of an entry.
pub const PPN_KEY: &str = "ppn_candidates";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackExtremaConfig {
    #[serde(default)]
    pub method: OrientationMethod,
    /// Neighbourhood radius of the `local` method.
    #[serde(default = "default_length")]
    pub radius: f64,
    /// Segment length of the `gradient` method.
    #[serde(default = "default_length")]
    pub segment_length: f64,
    /// Maximum distance between an extremity and its PPN candidate.
    #[serde(default = "default_length")]
    pub max_dist: f64,
}

fn default_length() -> f64 {
    5.0
}

impl Default for TrackExtremaConfig {
    fn default() -> Self {
        TrackExtremaConfig {
            method: OrientationMethod::Local,
            radius: default_length(),
            segment_length: default_length(),
            max_dist: default_length(),
        }
    }
}

/// Assigns the start and end points of reconstructed tracks, flipping them
/// when the orientation check fails.
#[derive(Debug, Clone)]
pub struct TrackExtremaProcessor {
    cfg: TrackExtremaConfig,
}

impl TrackExtremaProcessor {
    pub fn new(cfg: TrackExtremaConfig) -> Self {
        TrackExtremaProcessor { cfg }
    }
}

impl PostProcessor for TrackExtremaProcessor {
    fn name(&self) -> &'static str {
        "track_extrema"
    }

    fn required_keys(&self) -> Vec<String> {
        let mut keys = vec!["reco_particles".to_string()];
        if self.cfg.method == OrientationMethod::Ppn {
            keys.push(PPN_KEY.to_string());
        }
        keys
    }

    fn process(&self, batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>> {
        let data = batch.entry(entry);
        let candidates = match self.cfg.method {
            OrientationMethod::Ppn => Some(data.opt_tensor(PPN_KEY)?.ok_or_else(|| {
                RecoError::MissingField {
                    module: self.name().to_string(),
                    key: PPN_KEY.to_string(),
                }
            })?),
            _ => None,
        };

        let mut particles = data.reco_particles()?.to_vec();
        let mut flipped = 0;
        for part in particles.iter_mut().filter(|p| p.shape == Shape::Track) {
            let correct = match candidates {
                Some(c) => check_track_orientation_ppn(
                    part.start_point,
                    part.end_point,
                    c.view(),
                    self.cfg.max_dist,
                ),
                None => check_track_orientation(
                    part.points.view(),
                    part.depositions.view(),
                    part.start_point,
                    part.end_point,
                    self.cfg.method,
                    self.cfg.radius,
                    self.cfg.segment_length,
                ),
            };
            if !correct {
                part.flip();
                flipped += 1;
            }
        }
        debug!("Entry {}: flipped {flipped} track(s)", data.index);

        Ok(vec![FieldUpdate::RecoParticles(particles)])
    }
}
