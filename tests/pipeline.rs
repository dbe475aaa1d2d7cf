use lartpc_reco::data::globals::Shape;
use lartpc_reco::data::loader::{load_batch, save_batch};
use lartpc_reco::data::sample::{synthetic_batch, PHOTON_DIRS, VERTEX};
use lartpc_reco::objects::ObjectKind;
use lartpc_reco::{Batch, Pipeline, PipelineConfig, RecoError};
use serde_json::json;

fn config() -> PipelineConfig {
    serde_json::from_value(json!({
        "build": {"particles": true, "interactions": true, "mode": "both", "units": "cm"},
        "post": {
            "match": {"method": "iou"},
            "direction": {"priority": 4, "radius": 5.0},
            "track_extrema": {"priority": 5, "method": "local", "radius": 5.0},
            "calo_ke": {"priority": 3},
            "containment": {"priority": 2},
            "fiducial": {"priority": 1, "margin": 5.0}
        },
        "ana": {"pi0": {}}
    }))
    .unwrap()
}

fn batch() -> Batch {
    synthetic_batch(42, &[0.8, 3.0]).into_batch().unwrap()
}

#[test]
fn post_processors_run_by_priority() {
    let pipeline = Pipeline::new(config()).unwrap();
    assert_eq!(
        pipeline.post().names(),
        vec!["track_extrema", "direction", "calo_ke", "containment", "fiducial", "match"]
    );
}

#[test]
fn every_entry_gets_every_field() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let mut batch = batch();
    pipeline.process(&mut batch).unwrap();

    for entry in &batch.entries {
        assert_eq!(entry.reco_particles().unwrap().len(), 3);
        assert_eq!(entry.truth_particles().unwrap().len(), 3);
        assert_eq!(entry.reco_interactions().unwrap().len(), 1);
        assert_eq!(entry.truth_interactions().unwrap().len(), 1);
        assert!(entry.has("particle_matches_r2t"));
        assert!(entry.has("interaction_matches_t2r"));
    }
}

#[test]
fn reversed_muon_is_flipped_and_objects_are_refined() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let mut batch = batch();
    pipeline.process(&mut batch).unwrap();

    let entry = &batch.entries[0];
    let particles = entry.reco_particles().unwrap();
    let muon = &particles[0];
    assert_eq!(muon.shape, Shape::Track);
    // 1 cm voxels starting at the origin: cm = px + 0.5
    let vertex_cm = VERTEX.map(|x| x + 0.5);
    for d in 0..3 {
        assert!((muon.start_point[d] - vertex_cm[d]).abs() < 1e-9);
    }
    assert!(muon.start_dir[2] > 0.99);

    for (photon, dir) in particles[1..].iter().zip(PHOTON_DIRS) {
        for d in 0..3 {
            assert!((photon.start_dir[d] - dir[d]).abs() < 1e-9);
        }
        assert!((photon.calo_ke - photon.depositions.sum()).abs() < 1e-9);
        assert!(photon.is_contained);
    }

    let inter = &entry.reco_interactions().unwrap()[0];
    assert!(inter.is_contained);
    assert!(inter.is_fiducial);
    assert_eq!(inter.flash_time, Some(0.8));
}

#[test]
fn perfect_reconstruction_matches_one_to_one() {
    let mut pipeline = Pipeline::new(config()).unwrap();
    let mut batch = batch();
    pipeline.process(&mut batch).unwrap();

    for entry in &batch.entries {
        let pairs = entry.match_pairs(ObjectKind::Particle).unwrap();
        assert_eq!(pairs.r2t, vec![(0, Some(0)), (1, Some(1)), (2, Some(2))]);
        assert_eq!(pairs.r2t_overlap, vec![1.0; 3]);
        let pairs = entry.match_pairs(ObjectKind::Interaction).unwrap();
        assert_eq!(pairs.t2r, vec![(0, Some(0))]);
    }
}

#[test]
fn pi0_selection_is_written_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("batch.json");
    save_batch(&input, &synthetic_batch(42, &[0.8, 3.0])).unwrap();

    let mut pipeline = Pipeline::new(config()).unwrap();
    let mut batch = load_batch(&input).unwrap();
    pipeline.process(&mut batch).unwrap();
    let written = pipeline.finish(dir.path()).unwrap();
    assert_eq!(written, vec![dir.path().join("pi0_log.csv")]);

    // Only the first entry is inside the flash window
    let mut reader = csv::Reader::from_path(&written[0]).unwrap();
    let header = reader.headers().unwrap().clone();
    assert_eq!(&header[0], "reco_interaction_id");
    assert_eq!(header.len(), 14);
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 1);

    let column = |name: &str| -> f64 {
        let i = header.iter().position(|h| h == name).unwrap();
        rows[0][i].parse().unwrap()
    };
    let cos: f64 = (0..3).map(|d| PHOTON_DIRS[0][d] * PHOTON_DIRS[1][d]).sum();
    assert!((column("opening_angle") - cos.acos().to_degrees()).abs() < 1e-6);

    let (e1, e2) = (
        column("reco_leading_ph_energy"),
        column("reco_subleading_ph_energy"),
    );
    assert!(e1 >= e2);
    let mass = (2.0 * e1 * e2 * (1.0 - cos)).sqrt();
    assert!((column("mass") - mass).abs() < 1e-6 * mass);
}

#[test]
fn missing_prerequisites_fail_the_batch() {
    let cfg: PipelineConfig = serde_json::from_value(json!({
        "post": {"track_extrema": {}}
    }))
    .unwrap();
    let mut pipeline = Pipeline::new(cfg).unwrap();
    let mut batch = batch();
    assert!(matches!(
        pipeline.process(&mut batch),
        Err(RecoError::MissingField { .. })
    ));
}
