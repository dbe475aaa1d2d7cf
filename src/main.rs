use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use lartpc_reco::data::loader::{load_batch, load_config};
use lartpc_reco::{Pipeline, PipelineConfig};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("Usage: lartpc-reco <config.json> <batch.json>... [--out <dir>]");
    }

    let mut out_dir = PathBuf::from(".");
    let mut inputs = Vec::new();
    let mut iter = args.into_iter();
    let config_path = PathBuf::from(iter.next().context("missing configuration path")?);
    while let Some(arg) = iter.next() {
        if arg == "--out" {
            out_dir = PathBuf::from(iter.next().context("--out requires a directory")?);
        } else {
            inputs.push(PathBuf::from(arg));
        }
    }
    if inputs.is_empty() {
        bail!("No batch file given");
    }

    let config: PipelineConfig = load_config(&config_path)?;
    let mut pipeline = Pipeline::new(config).context("configuring pipeline")?;

    for path in &inputs {
        let mut batch = load_batch(path)?;
        pipeline
            .process(&mut batch)
            .with_context(|| format!("processing {}", path.display()))?;
    }

    let written = pipeline.finish(&out_dir).context("writing analysis output")?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
