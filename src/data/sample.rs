//! Synthetic chain output: one neutral-pion event per entry, used by the
//! `generate_sample` binary and the integration tests.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::data::batch::{Index, Product};
use crate::data::globals::{
    Pid, Shape, BATCH_COL, CLUST_COL, COORD_COLS, GROUP_COL, INTER_COL, LABEL_COLS, NU_COL,
    PART_COL, PID_COL, PRGRP_COL, VALUE_COL, VTX_COLS,
};
use crate::data::loader::{BatchFile, ProductColumn};
use crate::data::meta::{Meta, Units};
use crate::objects::{NeutrinoLabel, ParticleLabel};

/// Neutrino vertex of every synthetic event (px).
pub const VERTEX: [f64; 3] = [50.0, 50.0, 20.0];

/// Directions of the two photons.
pub const PHOTON_DIRS: [[f64; 3]; 2] = [[0.8, 0.0, 0.6], [0.0, 0.6, 0.8]];

/// Image of 100 px per side with 1 cm voxels.
pub fn sample_meta() -> Meta {
    Meta {
        lower: [0.0; 3],
        upper: [100.0; 3],
        size: [1.0; 3],
    }
}

// ---------------------------------------------------------------------------
// PRNG
// ---------------------------------------------------------------------------

/// Minimal deterministic PRNG (xoshiro256**)
pub struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    pub fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Event generation
// ---------------------------------------------------------------------------

struct Prong {
    dir: [f64; 3],
    /// Distance between the vertex and the first voxel.
    gap: f64,
    num_points: usize,
    pid: Pid,
    pdg_code: i64,
    shape: Shape,
}

fn prongs() -> [Prong; 3] {
    [
        Prong {
            dir: [0.0, 0.0, 1.0],
            gap: 0.0,
            num_points: 30,
            pid: Pid::Muon,
            pdg_code: 13,
            shape: Shape::Track,
        },
        Prong {
            dir: PHOTON_DIRS[0],
            gap: 4.0,
            num_points: 20,
            pid: Pid::Photon,
            pdg_code: 22,
            shape: Shape::Shower,
        },
        Prong {
            dir: PHOTON_DIRS[1],
            gap: 3.0,
            num_points: 12,
            pid: Pid::Photon,
            pdg_code: 22,
            shape: Shape::Shower,
        },
    ]
}

fn pid_label(pid: Pid) -> f64 {
    match pid {
        Pid::Photon => 0.0,
        Pid::Muon => 2.0,
        _ => -1.0,
    }
}

fn along(dir: [f64; 3], t: f64) -> [f64; 3] {
    std::array::from_fn(|d| VERTEX[d] + dir[d] * t)
}

/// Products of the synthetic entry at position `entry` of its batch.
///
/// Reconstruction is perfect except for the muon, whose predicted start and
/// end points are swapped. The muon deposits more energy towards its end.
pub fn synthetic_entry(
    rng: &mut SimpleRng,
    entry: usize,
    flash_time: f64,
) -> BTreeMap<String, Product> {
    let mut data_rows = Vec::new();
    let mut label_rows = Vec::new();
    let mut clusts = Vec::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    let mut labels = Vec::new();

    for (i, prong) in prongs().iter().enumerate() {
        let mut index = Vec::with_capacity(prong.num_points);
        let mut energy = 0.0;
        for j in 0..prong.num_points {
            let p = along(prong.dir, prong.gap + j as f64);
            let dep = match prong.shape {
                Shape::Track => 1.0 + 1.5 * j as f64 / (prong.num_points - 1) as f64,
                _ => 2.0,
            } + rng.gauss(0.0, 0.02);
            let dep = dep.max(0.05);
            energy += dep;

            index.push(data_rows.len());
            let mut row = vec![0.0; VALUE_COL + 1];
            row[BATCH_COL] = entry as f64;
            row[COORD_COLS].copy_from_slice(&p);
            row[VALUE_COL] = dep;
            data_rows.push(row);

            let mut label = vec![0.0; LABEL_COLS];
            label[BATCH_COL] = entry as f64;
            label[COORD_COLS].copy_from_slice(&p);
            label[VALUE_COL] = dep;
            label[CLUST_COL] = i as f64;
            label[PART_COL] = i as f64;
            label[GROUP_COL] = i as f64;
            label[INTER_COL] = 0.0;
            label[NU_COL] = 0.0;
            label[PID_COL] = pid_label(prong.pid);
            label[PRGRP_COL] = 1.0;
            label[VTX_COLS].copy_from_slice(&VERTEX);
            label[LABEL_COLS - 1] = prong.shape.label() as f64;
            label_rows.push(label);
        }

        let first = along(prong.dir, prong.gap);
        let last = along(prong.dir, prong.gap + (prong.num_points - 1) as f64);
        if prong.shape == Shape::Track {
            starts.push(last.to_vec());
            ends.push(first.to_vec());
        } else {
            starts.push(first.to_vec());
            ends.push(last.to_vec());
        }

        labels.push(ParticleLabel {
            id: i,
            group_id: i as i64,
            interaction_id: 0,
            nu_id: 0,
            pdg_code: prong.pdg_code,
            energy_init: energy,
            position: first,
            end_position: last,
            momentum: prong.dir.map(|d| d * energy),
            shape: prong.shape,
            is_primary: true,
            units: Units::Px,
        });
        clusts.push(index);
    }

    let shapes = prongs().iter().map(|p| p.shape.label()).collect();
    let pids = prongs().iter().map(|p| pid_label(p.pid) as i64).collect();
    let num = clusts.len();

    let mut products = BTreeMap::new();
    let mut put = |key: &str, product: Product| {
        products.insert(key.to_string(), product);
    };
    put("data", Product::Tensor(tensor(data_rows, VALUE_COL + 1)));
    put("clust_label", Product::Tensor(tensor(label_rows, LABEL_COLS)));
    put("meta", Product::Meta(sample_meta()));
    put("particle_clusts", Product::Clusters(clusts));
    put("particle_shapes", Product::Labels(shapes));
    put("particle_pids", Product::Labels(pids));
    put("particle_primary", Product::Flags(vec![true; num]));
    put("particle_group_pred", Product::Labels(vec![0; num]));
    put("particle_start_points", Product::Tensor(tensor(starts, 3)));
    put("particle_end_points", Product::Tensor(tensor(ends, 3)));
    put("interaction_flash_times", Product::Values(vec![flash_time]));
    put("particles", Product::Particles(labels));
    put(
        "neutrinos",
        Product::Neutrinos(vec![NeutrinoLabel {
            id: 0,
            interaction_id: 0,
            pdg_code: 14,
            energy_init: 1000.0,
            position: VERTEX,
            units: Units::Px,
        }]),
    );
    products
}

fn tensor(rows: Vec<Vec<f64>>, ncols: usize) -> Array2<f64> {
    let nrows = rows.len();
    Array2::from_shape_vec((nrows, ncols), rows.concat())
        .unwrap_or_else(|_| Array2::zeros((0, ncols)))
}

/// A batch with one synthetic entry per flash time.
pub fn synthetic_batch(seed: u64, flash_times: &[f64]) -> BatchFile {
    let mut rng = SimpleRng::new(seed);
    let mut columns: BTreeMap<String, Vec<Product>> = BTreeMap::new();
    for (entry, &time) in flash_times.iter().enumerate() {
        for (key, product) in synthetic_entry(&mut rng, entry, time) {
            columns.entry(key).or_default().push(product);
        }
    }
    BatchFile {
        index: Index::Batched((0..flash_times.len() as u64).collect()),
        products: columns
            .into_iter()
            .map(|(k, v)| (k, ProductColumn::Many(v)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_deterministic() {
        let mut a = SimpleRng::new(42);
        let mut b = SimpleRng::new(42);
        for _ in 0..10 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let x = a.next_f64();
        assert!((0.0..1.0).contains(&x));
    }

    #[test]
    fn synthetic_batch_has_one_entry_per_flash() {
        let file = synthetic_batch(7, &[0.5, 3.0]);
        let batch = file.into_batch().unwrap();
        assert_eq!(batch.num_entries(), 2);
        let entry = batch.entry(1);
        let data = entry.tensor("data").unwrap();
        assert_eq!(data.nrows(), 62);
        assert!(data.column(BATCH_COL).iter().all(|&b| b == 1.0));
        assert_eq!(entry.tensor("clust_label").unwrap().ncols(), LABEL_COLS);
        assert_eq!(entry.clusters("particle_clusts").unwrap().len(), 3);
        assert_eq!(
            entry.opt_values("interaction_flash_times").unwrap(),
            Some(&vec![3.0])
        );
    }
}
