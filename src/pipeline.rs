use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::ana::AnaManager;
use crate::build::BuildManager;
use crate::data::batch::Batch;
use crate::error::RecoResult;
use crate::post::PostManager;

/// Top-level configuration: one block per stage. Missing blocks disable the
/// stage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub build: Option<serde_json::Value>,
    #[serde(default)]
    pub post: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub ana: serde_json::Map<String, serde_json::Value>,
}

/// build → post → ana, applied to each batch in turn.
pub struct Pipeline {
    build: Option<BuildManager>,
    post: PostManager,
    ana: AnaManager,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> RecoResult<Self> {
        let build = cfg.build.map(BuildManager::from_value).transpose()?;
        let post = PostManager::new(cfg.post)?;
        let ana = AnaManager::new(cfg.ana)?;
        info!(
            "Pipeline: build {}, post {:?}, ana {:?}",
            if build.is_some() { "on" } else { "off" },
            post.names(),
            ana.names()
        );
        Ok(Pipeline { build, post, ana })
    }

    pub fn process(&mut self, batch: &mut Batch) -> RecoResult<()> {
        if let Some(build) = &self.build {
            build.run(batch)?;
        }
        self.post.run(batch)?;
        self.ana.run(batch)
    }

    pub fn post(&self) -> &PostManager {
        &self.post
    }

    pub fn ana(&self) -> &AnaManager {
        &self.ana
    }

    /// Write the analysis output and log the per-module timings.
    pub fn finish(&self, dir: &Path) -> RecoResult<Vec<PathBuf>> {
        for (name, _, total) in self.post.watch().report() {
            info!("Post-processor `{name}`: {total:?} in total");
        }
        self.ana.write(dir)
    }
}
