use std::path::PathBuf;

use anyhow::Result;

use lartpc_reco::data::loader::save_batch;
use lartpc_reco::data::sample::synthetic_batch;

fn main() -> Result<()> {
    env_logger::init();

    let output_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("sample_batch.json"), PathBuf::from);

    // The second event falls outside the beam flash window
    let flash_times = [0.8, 3.0];
    let file = synthetic_batch(42, &flash_times);
    save_batch(&output_path, &file)?;

    println!(
        "Wrote {} synthetic entries to {}",
        flash_times.len(),
        output_path.display()
    );
    Ok(())
}
