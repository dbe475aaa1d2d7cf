/// Post-processing of built objects.
///
/// Architecture:
/// ```text
///   config { name: { priority, ...options } }
///        │
///        ▼
///   ┌──────────┐
///   │ factory   │  name → boxed PostProcessor
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ manager   │  descending priority, per-entry updates merged back
///   └──────────┘
/// ```

pub mod calo;
pub mod containment;
pub mod direction;
pub mod manager;
pub mod matcher;
pub mod stopwatch;
pub mod track_extrema;
pub mod tracking;

use serde::de::DeserializeOwned;

use crate::data::batch::{Batch, FieldUpdate};
use crate::error::{RecoError, RecoResult};

pub use manager::PostManager;

/// A post-processing module: computes new (or overwritten) fields of one
/// entry from the current batch.
pub trait PostProcessor {
    fn name(&self) -> &'static str;

    /// Fields that must be present in every entry before running.
    fn required_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn process(&self, batch: &Batch, entry: usize) -> RecoResult<Vec<FieldUpdate>>;
}

/// Instantiate a post-processor from its name (or alias) and options.
pub fn post_processor_factory(
    name: &str,
    cfg: serde_json::Value,
) -> RecoResult<Box<dyn PostProcessor>> {
    let module: Box<dyn PostProcessor> = match name {
        "track_extrema" | "assign_track_extrema" => {
            Box::new(track_extrema::TrackExtremaProcessor::new(parse(name, cfg)?))
        }
        "calo_ke" => Box::new(calo::CalorimetricEnergyProcessor::new(parse(name, cfg)?)),
        "direction" => Box::new(direction::DirectionProcessor::new(parse(name, cfg)?)),
        "containment" => Box::new(containment::ContainmentProcessor::new(parse(name, cfg)?)),
        "fiducial" => Box::new(containment::FiducialProcessor::new(parse(name, cfg)?)),
        "match" => Box::new(matcher::MatchProcessor::new(parse(name, cfg)?)?),
        other => {
            return Err(RecoError::Config(format!(
                "Post-processor not recognized: {other}"
            )))
        }
    };
    Ok(module)
}

/// Deserialize module options, reporting failures as configuration errors.
pub(crate) fn parse<T: DeserializeOwned>(name: &str, cfg: serde_json::Value) -> RecoResult<T> {
    // A module without options may be given as `null`
    let cfg = if cfg.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        cfg
    };
    serde_json::from_value(cfg).map_err(|e| RecoError::config(name, e))
}
