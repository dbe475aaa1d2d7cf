/// Analysis scripts: selection cuts over the post-processed objects, one
/// flat CSV row per accepted object.
///
/// Architecture:
/// ```text
///   config { name: { priority, ...options } }
///        │
///        ▼
///   ┌──────────┐
///   │ manager   │  descending priority, per-entry rows
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ writer    │  named sinks → <script>_<sink>.csv
///   └──────────┘
/// ```

pub mod pi0;
pub mod writer;

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::data::batch::{Batch, Entry};
use crate::error::{RecoError, RecoResult};
use crate::post::manager::{order_by_priority, take_priority};
use crate::post::parse;
use crate::post::stopwatch::StopwatchManager;

use writer::{CsvSinks, Row};

/// An analysis script: consumes one entry and emits rows to its sinks.
pub trait AnaScript {
    fn name(&self) -> &'static str;

    /// Names of the sinks this script writes to.
    fn sinks(&self) -> &'static [&'static str];

    /// Fields that must be present in every entry before running.
    fn required_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn process(&self, entry: &Entry) -> RecoResult<Vec<(&'static str, Row)>>;
}

/// Instantiate an analysis script from its name and options.
pub fn ana_script_factory(name: &str, cfg: serde_json::Value) -> RecoResult<Box<dyn AnaScript>> {
    match name {
        "pi0" => Ok(Box::new(pi0::Pi0Ana::new(parse(name, cfg)?))),
        other => Err(RecoError::Config(format!(
            "Analysis script not recognized: {other}"
        ))),
    }
}

/// Global name of the sink `sink` of `script`.
pub fn sink_name(script: &str, sink: &str) -> String {
    format!("{script}_{sink}")
}

// ---------------------------------------------------------------------------
// AnaManager
// ---------------------------------------------------------------------------

/// Runs the analysis scripts over batches and accumulates their output.
pub struct AnaManager {
    scripts: Vec<(String, Box<dyn AnaScript>)>,
    sinks: CsvSinks,
    watch: StopwatchManager,
}

impl AnaManager {
    pub fn new(cfg: serde_json::Map<String, serde_json::Value>) -> RecoResult<Self> {
        let mut declared = Vec::with_capacity(cfg.len());
        for (name, mut script_cfg) in cfg {
            let priority = take_priority(&name, &mut script_cfg)?;
            declared.push((name.clone(), priority, ana_script_factory(&name, script_cfg)?));
        }
        Ok(Self::from_scripts(declared))
    }

    /// Build from already instantiated scripts, in declaration order with
    /// their priority.
    pub fn from_scripts(declared: Vec<(String, i32, Box<dyn AnaScript>)>) -> Self {
        let priorities: Vec<i32> = declared.iter().map(|(_, p, _)| *p).collect();
        let mut slots: Vec<_> = declared.into_iter().map(Some).collect();

        let mut scripts = Vec::with_capacity(slots.len());
        let mut sinks = CsvSinks::default();
        let mut watch = StopwatchManager::default();
        for i in order_by_priority(&priorities) {
            if let Some((name, _, script)) = slots[i].take() {
                for sink in script.sinks() {
                    sinks.initialize(&sink_name(&name, sink));
                }
                watch.initialize(&name);
                scripts.push((name, script));
            }
        }
        AnaManager {
            scripts,
            sinks,
            watch,
        }
    }

    /// Script names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.scripts.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn sinks(&self) -> &CsvSinks {
        &self.sinks
    }

    /// Pass one batch through every analysis script.
    pub fn run(&mut self, batch: &Batch) -> RecoResult<()> {
        for (name, script) in &self.scripts {
            for key in script.required_keys() {
                if !batch.entries.iter().all(|e| e.has(&key)) {
                    return Err(RecoError::MissingField {
                        module: name.clone(),
                        key,
                    });
                }
            }

            let sinks = &mut self.sinks;
            let count = self.watch.time(name, || {
                let mut count = 0;
                for entry in &batch.entries {
                    for (sink, row) in script.process(entry)? {
                        sinks.append(&sink_name(name, sink), row)?;
                        count += 1;
                    }
                }
                RecoResult::Ok(count)
            })?;

            if let Some(w) = self.watch.get(name) {
                debug!("Analysis script `{name}` wrote {count} rows in {:?}", w.last());
            }
        }
        Ok(())
    }

    /// Write every sink as `<dir>/<script>_<sink>.csv`.
    pub fn write(&self, dir: &Path) -> RecoResult<Vec<PathBuf>> {
        let paths = self.sinks.write_dir(dir)?;
        info!("Wrote {} CSV file(s) to {}", paths.len(), dir.display());
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scripts_declare_their_sinks() {
        let cfg = json!({"pi0": {"priority": 2, "flash_max": 2.0}});
        let manager = AnaManager::new(cfg.as_object().unwrap().clone()).unwrap();
        assert_eq!(manager.names(), vec!["pi0"]);
        assert!(manager.sinks().get("pi0_log").is_some());
    }

    #[test]
    fn unknown_scripts_and_options_are_rejected() {
        let cfg = json!({"nue": {}});
        assert!(matches!(
            AnaManager::new(cfg.as_object().unwrap().clone()),
            Err(RecoError::Config(_))
        ));
        let cfg = json!({"pi0": {"flash_maximum": 2.0}});
        assert!(matches!(
            AnaManager::new(cfg.as_object().unwrap().clone()),
            Err(RecoError::Config(_))
        ));
    }

    #[test]
    fn missing_match_pairs_are_reported() {
        let cfg = json!({"pi0": null});
        let mut manager = AnaManager::new(cfg.as_object().unwrap().clone()).unwrap();
        let batch = Batch::single(0, Default::default());
        assert!(matches!(
            manager.run(&batch),
            Err(RecoError::MissingField { .. })
        ));
    }
}
