use ndarray::ArrayView2;
use serde::Deserialize;

use crate::data::batch::{Batch, FieldUpdate};
use crate::error::RecoResult;
use crate::objects::unit_vector;

use super::PostProcessor;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectionConfig {
    /// Neighbourhood used to estimate the direction at each end.
    #[serde(default = "default_radius")]
    pub radius: f64,
}

fn default_radius() -> f64 {
    5.0
}

/// Direction at `point` pointing into the cloud: the normalised mean offset
/// of the points within `radius`. Zero when no other point is close enough.
pub fn cluster_direction(points: ArrayView2<f64>, point: [f64; 3], radius: f64) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for p in points.rows() {
        let offset = [p[0] - point[0], p[1] - point[1], p[2] - point[2]];
        let dist = offset.iter().map(|o| o * o).sum::<f64>().sqrt();
        if dist <= radius {
            for d in 0..3 {
                sum[d] += offset[d];
            }
        }
    }
    unit_vector(sum)
}

/// Estimates the start and end directions of reconstructed particles.
#[derive(Debug, Clone)]
pub struct DirectionProcessor {
    cfg: DirectionConfig,
}

impl DirectionProcessor {
    pub fn new(cfg: DirectionConfig) -> Self {
        DirectionProcessor { cfg }
    }
}

impl PostProcessor for DirectionProcessor {
    fn name(&self) -> &'static str {
        "direction"
    }

    fn required_keys(&self) -> Vec<String> {
        vec!["reco_particles".to_string()]
    }

    fn process(&self, batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>> {
        let mut particles = batch.entry(entry).reco_particles()?.to_vec();
        for part in particles.iter_mut() {
            part.start_dir = cluster_direction(part.points.view(), part.start_point, self.cfg.radius);
            part.end_dir = cluster_direction(part.points.view(), part.end_point, self.cfg.radius);
        }
        Ok(vec![FieldUpdate::RecoParticles(particles)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn directions_point_into_the_cloud() {
        let points = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [9.0, 0.0, 0.0]];
        assert_eq!(cluster_direction(points.view(), [0.0; 3], 3.0), [1.0, 0.0, 0.0]);
        assert_eq!(
            cluster_direction(points.view(), [9.0, 0.0, 0.0], 8.0),
            [-1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn isolated_point_has_no_direction() {
        let points = array![[0.0, 0.0, 0.0]];
        assert_eq!(cluster_direction(points.view(), [0.0; 3], 3.0), [0.0; 3]);
    }
}
