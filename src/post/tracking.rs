//! Orientation checks for track-like particles.
//!
//! A stopping track deposits more energy per unit length near its end
//! (Bragg peak), so the denser extremity is taken to be the end point.

use ndarray::{ArrayView1, ArrayView2};
use serde::Deserialize;

use crate::data::globals::{PPN_COORD_COLS, PPN_END_COLS};

/// Algorithm used to check a track's start/end assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationMethod {
    /// Compare the local dE/dx around both extremities.
    #[default]
    Local,
    /// Fit the dE/dx profile along the track axis.
    Gradient,
    /// Classify the PPN candidates closest to both extremities.
    Ppn,
}

fn distance(a: ArrayView1<f64>, b: [f64; 3]) -> f64 {
    (0..3).map(|d| (a[d] - b[d]).powi(2)).sum::<f64>().sqrt()
}

/// Energy deposited within `radius` of `point`, per unit length.
pub fn local_dedx(
    points: ArrayView2<f64>,
    depositions: ArrayView1<f64>,
    point: [f64; 3],
    radius: f64,
) -> f64 {
    if radius <= 0.0 {
        return 0.0;
    }
    let total: f64 = points
        .rows()
        .into_iter()
        .zip(depositions.iter())
        .filter(|(p, _)| distance(*p, point) <= radius)
        .map(|(_, &v)| v)
        .sum();
    total / radius
}

/// dE/dx of consecutive segments of `segment_length` along the start→end
/// axis, as `(segment centre, dE/dx)` pairs. Empty segments are skipped.
pub fn segment_dedx(
    points: ArrayView2<f64>,
    depositions: ArrayView1<f64>,
    start: [f64; 3],
    end: [f64; 3],
    segment_length: f64,
) -> Vec<(f64, f64)> {
    let axis = [end[0] - start[0], end[1] - start[1], end[2] - start[2]];
    let length = (axis.iter().map(|a| a * a).sum::<f64>()).sqrt();
    if length <= 0.0 || segment_length <= 0.0 {
        return Vec::new();
    }
    let unit = [axis[0] / length, axis[1] / length, axis[2] / length];

    let num_segments = (length / segment_length).ceil().max(1.0) as usize;
    let mut sums = vec![0.0; num_segments];
    let mut counts = vec![0usize; num_segments];
    for (p, &v) in points.rows().into_iter().zip(depositions.iter()) {
        let t: f64 = (0..3).map(|d| (p[d] - start[d]) * unit[d]).sum();
        let s = ((t / segment_length).floor().max(0.0) as usize).min(num_segments - 1);
        sums[s] += v;
        counts[s] += 1;
    }

    (0..num_segments)
        .filter(|&s| counts[s] > 0)
        .map(|s| {
            let lo = s as f64 * segment_length;
            let hi = (lo + segment_length).min(length);
            let width = (hi - lo).max(f64::EPSILON);
            ((lo + hi) / 2.0, sums[s] / width)
        })
        .collect()
}

/// Least-squares slope of `y` against `x`; `None` with fewer than two
/// distinct abscissae.
pub fn linear_slope(samples: &[(f64, f64)]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|s| s.0).sum::<f64>() / n;
    let mean_y = samples.iter().map(|s| s.1).sum::<f64>() / n;
    let sxx: f64 = samples.iter().map(|s| (s.0 - mean_x).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = samples
        .iter()
        .map(|s| (s.0 - mean_x) * (s.1 - mean_y))
        .sum();
    Some(sxy / sxx)
}

/// Whether `start`/`end` are correctly ordered according to the energy
/// deposition profile. Undecidable cases keep the current order.
pub fn check_track_orientation(
    points: ArrayView2<f64>,
    depositions: ArrayView1<f64>,
    start: [f64; 3],
    end: [f64; 3],
    method: OrientationMethod,
    radius: f64,
    segment_length: f64,
) -> bool {
    match method {
        OrientationMethod::Gradient => {
            let profile = segment_dedx(points, depositions, start, end, segment_length);
            linear_slope(&profile).map_or(true, |slope| slope >= 0.0)
        }
        // Without candidates, fall back on the local density
        OrientationMethod::Local | OrientationMethod::Ppn => {
            let start_dedx = local_dedx(points, depositions, start, radius);
            let end_dedx = local_dedx(points, depositions, end, radius);
            start_dedx <= end_dedx
        }
    }
}

fn closest_candidate(candidates: ArrayView2<f64>, point: [f64; 3]) -> Option<(usize, f64)> {
    candidates
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, c)| (i, distance(c.slice(ndarray::s![PPN_COORD_COLS]), point)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Whether `start`/`end` are correctly ordered according to the end point
/// classification of the closest PPN candidates.
///
/// Each extremity is paired with its closest candidate. When neither lies
/// within `max_dist`, the order is kept.
pub fn check_track_orientation_ppn(
    start: [f64; 3],
    end: [f64; 3],
    candidates: ArrayView2<f64>,
    max_dist: f64,
) -> bool {
    let [start_col, end_col] = PPN_END_COLS;
    if candidates.ncols() <= end_col {
        return true;
    }
    let (Some((s, s_dist)), Some((e, e_dist))) = (
        closest_candidate(candidates, start),
        closest_candidate(candidates, end),
    ) else {
        return true;
    };
    if s_dist > max_dist && e_dist > max_dist {
        return true;
    }

    let kept = candidates[[s, start_col]] + candidates[[e, end_col]];
    let flipped = candidates[[e, start_col]] + candidates[[s, end_col]];
    kept >= flipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array2};

    /// Ten points along x, depositions growing towards x = 9.
    fn bragg_track() -> (Array2<f64>, Array1<f64>) {
        let points = Array2::from_shape_fn((10, 3), |(i, d)| if d == 0 { i as f64 } else { 0.0 });
        let deps = Array1::from_shape_fn(10, |i| 1.0 + i as f64);
        (points, deps)
    }

    #[test]
    fn local_method_accepts_denser_end() {
        let (points, deps) = bragg_track();
        let (a, b) = ([0.0; 3], [9.0, 0.0, 0.0]);
        let m = OrientationMethod::Local;
        assert!(check_track_orientation(points.view(), deps.view(), a, b, m, 2.0, 3.0));
        assert!(!check_track_orientation(points.view(), deps.view(), b, a, m, 2.0, 3.0));
    }

    #[test]
    fn gradient_method_follows_the_slope() {
        let (points, deps) = bragg_track();
        let (a, b) = ([0.0; 3], [9.0, 0.0, 0.0]);
        let m = OrientationMethod::Gradient;
        assert!(check_track_orientation(points.view(), deps.view(), a, b, m, 2.0, 3.0));
        assert!(!check_track_orientation(points.view(), deps.view(), b, a, m, 2.0, 3.0));
    }

    #[test]
    fn degenerate_track_keeps_its_order() {
        let points = array![[1.0, 1.0, 1.0]];
        let deps = array![5.0];
        let p = [1.0, 1.0, 1.0];
        let m = OrientationMethod::Gradient;
        assert!(check_track_orientation(points.view(), deps.view(), p, p, m, 2.0, 3.0));
    }

    #[test]
    fn local_dedx_counts_points_within_radius() {
        let (points, deps) = bragg_track();
        // Points 0 and 1 lie within 1.0 of the origin
        assert_eq!(local_dedx(points.view(), deps.view(), [0.0; 3], 1.0), 3.0);
    }

    #[test]
    fn ppn_scores_decide_orientation() {
        // x, y, z, score, start score, end score
        let candidates = array![
            [0.0, 0.0, 0.0, 0.9, 0.1, 0.9],
            [9.0, 0.0, 0.0, 0.9, 0.8, 0.2],
        ];
        let (a, b) = ([0.0; 3], [9.0, 0.0, 0.0]);
        assert!(!check_track_orientation_ppn(a, b, candidates.view(), 1.0));
        assert!(check_track_orientation_ppn(b, a, candidates.view(), 1.0));
    }

    #[test]
    fn distant_ppn_candidates_are_ignored() {
        let candidates = array![[50.0, 50.0, 50.0, 0.9, 0.0, 1.0]];
        let (a, b) = ([0.0; 3], [9.0, 0.0, 0.0]);
        assert!(check_track_orientation_ppn(a, b, candidates.view(), 5.0));
        let empty = Array2::<f64>::zeros((0, 6));
        assert!(check_track_orientation_ppn(a, b, empty.view(), 5.0));
    }
}
