use std::collections::BTreeMap;

use log::{debug, info};
use serde::Deserialize;

use crate::data::batch::{Batch, Entry};
use crate::data::meta::Units;
use crate::error::{RecoError, RecoResult};
use crate::objects::ObjectKind;

use super::fragment::FragmentBuilder;
use super::interaction::InteractionBuilder;
use super::matching::load_match_pairs;
use super::particle::ParticleBuilder;
use super::sources::{build_sources, OneOrMany, SourceNames};
use super::{load_objects, BuildMode, Builder};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default)]
    pub fragments: bool,
    #[serde(default)]
    pub particles: bool,
    #[serde(default)]
    pub interactions: bool,
    #[serde(default)]
    pub mode: BuildMode,
    #[serde(default)]
    pub units: Units,
    /// Load stored objects instead of building them. Defaults to `true` in
    /// `all` mode only.
    #[serde(default)]
    pub load: Option<bool>,
    /// Overrides of the product names each canonical source is read from.
    #[serde(default)]
    pub sources: BTreeMap<String, OneOrMany>,
}

// ---------------------------------------------------------------------------
// BuildManager
// ---------------------------------------------------------------------------

/// Constructs data representations from the chain output, or loads them
/// from their stored form, for every entry of a batch.
#[derive(Debug, Clone)]
pub struct BuildManager {
    mode: BuildMode,
    units: Units,
    load: bool,
    sources: SourceNames,
    fragments: Option<FragmentBuilder>,
    particles: Option<ParticleBuilder>,
    interactions: Option<InteractionBuilder>,
}

impl BuildManager {
    pub fn new(cfg: BuildConfig) -> RecoResult<Self> {
        if cfg.interactions && !cfg.particles {
            return Err(RecoError::Config(
                "Interactions are built from particles. If `interactions` is true, \
                 so must `particles` be."
                    .to_string(),
            ));
        }
        if !(cfg.fragments || cfg.particles || cfg.interactions) {
            return Err(RecoError::Config(
                "Do not call the builder unless it does anything.".to_string(),
            ));
        }

        let sources = SourceNames::with_overrides(cfg.sources)?;
        let units = cfg.units;
        Ok(BuildManager {
            mode: cfg.mode,
            units,
            load: cfg.load.unwrap_or(cfg.mode == BuildMode::All),
            sources,
            fragments: cfg.fragments.then(|| FragmentBuilder::new(units)),
            particles: cfg.particles.then(|| ParticleBuilder::new(units)),
            interactions: cfg.interactions.then(|| InteractionBuilder::new(units)),
        })
    }

    /// Parse a `build` configuration block.
    pub fn from_value(value: serde_json::Value) -> RecoResult<Self> {
        let cfg: BuildConfig =
            serde_json::from_value(value).map_err(|e| RecoError::config("build", e))?;
        Self::new(cfg)
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn loads(&self) -> bool {
        self.load
    }

    /// Names of the enabled object kinds, in execution order.
    pub fn kinds(&self) -> Vec<ObjectKind> {
        let mut kinds = Vec::new();
        if self.fragments.is_some() {
            kinds.push(ObjectKind::Fragment);
        }
        if self.particles.is_some() {
            kinds.push(ObjectKind::Particle);
        }
        if self.interactions.is_some() {
            kinds.push(ObjectKind::Interaction);
        }
        kinds
    }

    /// Build the representations of every entry of the batch, in place.
    pub fn run(&self, batch: &mut Batch) -> RecoResult<()> {
        if !self.load {
            for entry in batch.entries.iter_mut() {
                let sources = build_sources(entry, &self.sources, self.mode, self.units)?;
                entry.sources = Some(sources);
            }
        }

        if let Some(builder) = &self.fragments {
            self.run_builder(builder, batch)?;
        }
        if let Some(builder) = &self.particles {
            self.run_builder(builder, batch)?;
        }
        if let Some(builder) = &self.interactions {
            self.run_builder(builder, batch)?;
        }

        info!(
            "Built {:?} for {} entries (mode: {:?}, units: {}, load: {})",
            self.kinds(),
            batch.num_entries(),
            self.mode,
            self.units,
            self.load
        );
        Ok(())
    }

    fn run_builder<B: Builder>(&self, builder: &B, batch: &mut Batch) -> RecoResult<()> {
        let kind = builder.kind();
        for entry in batch.entries.iter_mut() {
            let (reco, truth) = if self.load {
                self.load_entry::<B>(entry, kind)?
            } else {
                self.build_entry(builder, entry)?
            };
            debug!(
                "Entry {}: {} reco / {} truth {kind}s",
                entry.index,
                reco.as_ref().map_or(0, Vec::len),
                truth.as_ref().map_or(0, Vec::len),
            );
            B::store(entry, reco, truth);

            // Generate match pairs from stored matches
            if self.mode.pairs() {
                if let (Some(reco), Some(truth)) = B::lists(entry) {
                    let pairs = load_match_pairs(reco, truth)?;
                    entry.matches.insert(kind, pairs);
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn build_entry<B: Builder>(
        &self,
        builder: &B,
        entry: &Entry,
    ) -> RecoResult<(Option<Vec<B::Object>>, Option<Vec<B::Object>>)> {
        let sources = entry.sources.as_ref().ok_or_else(|| RecoError::MissingProduct {
            key: "sources".to_string(),
        })?;
        let reco = if self.mode.builds_reco() {
            Some(builder.build_reco(entry, sources)?)
        } else {
            None
        };
        let truth = if self.mode.builds_truth() {
            Some(builder.build_truth(entry, sources)?)
        } else {
            None
        };
        Ok((reco, truth))
    }

    #[allow(clippy::type_complexity)]
    fn load_entry<B: Builder>(
        &self,
        entry: &Entry,
        kind: ObjectKind,
    ) -> RecoResult<(Option<Vec<B::Object>>, Option<Vec<B::Object>>)> {
        let reco = if self.mode.builds_reco() {
            Some(load_objects(entry, &kind.reco_key(), self.units)?)
        } else {
            None
        };
        let truth = if self.mode.builds_truth() {
            Some(load_objects(entry, &kind.truth_key(), self.units)?)
        } else {
            None
        };
        Ok((reco, truth))
    }
}
