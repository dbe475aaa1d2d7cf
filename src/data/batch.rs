use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::build::matching::MatchPairs;
use crate::build::sources::Sources;
use crate::error::{RecoError, RecoResult};
use crate::objects::{
    Fragment, Interaction, NeutrinoLabel, ObjectKind, Particle, ParticleLabel,
};

use super::meta::Meta;
use super::rows;

// ---------------------------------------------------------------------------
// Product – one raw value of one entry
// ---------------------------------------------------------------------------

/// A raw data product of one entry, as handed over by the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    Tensor(#[serde(with = "rows")] Array2<f64>),
    Meta(Meta),
    /// One list of tensor rows per cluster.
    Clusters(Vec<Vec<usize>>),
    Labels(Vec<i64>),
    Flags(Vec<bool>),
    Values(Vec<f64>),
    Particles(Vec<ParticleLabel>),
    Neutrinos(Vec<NeutrinoLabel>),
    /// Previously built objects, stored in their serialized form.
    Objects(serde_json::Value),
}

// ---------------------------------------------------------------------------
// Index – scalar (one entry) or batched
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Index {
    Single(u64),
    Batched(Vec<u64>),
}

impl Index {
    pub fn len(&self) -> usize {
        match self {
            Index::Single(_) => 1,
            Index::Batched(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<u64> {
        match self {
            Index::Single(i) => vec![*i],
            Index::Batched(v) => v.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldUpdate – one value written back into an entry
// ---------------------------------------------------------------------------

/// A newly computed (or overwritten) field of one entry.
#[derive(Debug, Clone)]
pub enum FieldUpdate {
    RecoFragments(Vec<Fragment>),
    TruthFragments(Vec<Fragment>),
    RecoParticles(Vec<Particle>),
    TruthParticles(Vec<Particle>),
    RecoInteractions(Vec<Interaction>),
    TruthInteractions(Vec<Interaction>),
    Matches(ObjectKind, MatchPairs),
    Product(String, Product),
}

impl FieldUpdate {
    /// Name of the field this update writes.
    pub fn field(&self) -> String {
        match self {
            FieldUpdate::RecoFragments(_) => ObjectKind::Fragment.reco_key(),
            FieldUpdate::TruthFragments(_) => ObjectKind::Fragment.truth_key(),
            FieldUpdate::RecoParticles(_) => ObjectKind::Particle.reco_key(),
            FieldUpdate::TruthParticles(_) => ObjectKind::Particle.truth_key(),
            FieldUpdate::RecoInteractions(_) => ObjectKind::Interaction.reco_key(),
            FieldUpdate::TruthInteractions(_) => ObjectKind::Interaction.truth_key(),
            FieldUpdate::Matches(kind, _) => kind.matches_key(),
            FieldUpdate::Product(key, _) => key.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry – everything known about one event
// ---------------------------------------------------------------------------

/// Suffixes of the four match-pair fields of an object kind.
const MATCH_SUFFIXES: [&str; 4] = ["_r2t", "_r2t_overlap", "_t2r", "_t2r_overlap"];

/// Typed record of one entry: its raw products plus everything the managers
/// derive from them.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub index: u64,
    pub products: BTreeMap<String, Product>,
    pub sources: Option<Sources>,
    pub reco_fragments: Option<Vec<Fragment>>,
    pub truth_fragments: Option<Vec<Fragment>>,
    pub reco_particles: Option<Vec<Particle>>,
    pub truth_particles: Option<Vec<Particle>>,
    pub reco_interactions: Option<Vec<Interaction>>,
    pub truth_interactions: Option<Vec<Interaction>>,
    pub matches: BTreeMap<ObjectKind, MatchPairs>,
}

impl Entry {
    pub fn new(index: u64, products: BTreeMap<String, Product>) -> Self {
        Entry {
            index,
            products,
            ..Default::default()
        }
    }

    pub fn product(&self, key: &str) -> Option<&Product> {
        self.products.get(key)
    }

    fn lookup<'a, T>(
        &'a self,
        key: &str,
        expected: &'static str,
        pick: impl Fn(&'a Product) -> Option<&'a T>,
    ) -> RecoResult<Option<&'a T>> {
        match self.products.get(key) {
            None => Ok(None),
            Some(p) => pick(p).map(Some).ok_or_else(|| RecoError::UnexpectedProduct {
                key: key.to_string(),
                expected,
            }),
        }
    }

    /// Optional tensor product; a product of another type is an error.
    pub fn opt_tensor(&self, key: &str) -> RecoResult<Option<&Array2<f64>>> {
        self.lookup(key, "tensor", |p| match p {
            Product::Tensor(t) => Some(t),
            _ => None,
        })
    }

    pub fn tensor(&self, key: &str) -> RecoResult<&Array2<f64>> {
        self.opt_tensor(key)?.ok_or_else(|| missing(key))
    }

    pub fn meta(&self, key: &str) -> RecoResult<Option<&Meta>> {
        self.lookup(key, "meta", |p| match p {
            Product::Meta(m) => Some(m),
            _ => None,
        })
    }

    pub fn clusters(&self, key: &str) -> RecoResult<&Vec<Vec<usize>>> {
        self.lookup(key, "clusters", |p| match p {
            Product::Clusters(c) => Some(c),
            _ => None,
        })?
        .ok_or_else(|| missing(key))
    }

    pub fn opt_labels(&self, key: &str) -> RecoResult<Option<&Vec<i64>>> {
        self.lookup(key, "labels", |p| match p {
            Product::Labels(l) => Some(l),
            _ => None,
        })
    }

    pub fn labels(&self, key: &str) -> RecoResult<&Vec<i64>> {
        self.opt_labels(key)?.ok_or_else(|| missing(key))
    }

    pub fn opt_flags(&self, key: &str) -> RecoResult<Option<&Vec<bool>>> {
        self.lookup(key, "flags", |p| match p {
            Product::Flags(f) => Some(f),
            _ => None,
        })
    }

    pub fn opt_values(&self, key: &str) -> RecoResult<Option<&Vec<f64>>> {
        self.lookup(key, "values", |p| match p {
            Product::Values(v) => Some(v),
            _ => None,
        })
    }

    pub fn objects(&self, key: &str) -> RecoResult<&serde_json::Value> {
        self.lookup(key, "objects", |p| match p {
            Product::Objects(v) => Some(v),
            _ => None,
        })?
        .ok_or_else(|| missing(key))
    }

    /// Whether a field (typed or raw) is available in this entry.
    pub fn has(&self, key: &str) -> bool {
        match key {
            "sources" if self.sources.is_some() => true,
            "points" | "depositions" => self.sources.is_some(),
            "reco_fragments" => self.reco_fragments.is_some(),
            "truth_fragments" => self.truth_fragments.is_some(),
            "reco_particles" => self.reco_particles.is_some(),
            "truth_particles" => self.truth_particles.is_some(),
            "reco_interactions" => self.reco_interactions.is_some(),
            "truth_interactions" => self.truth_interactions.is_some(),
            _ => {
                let matched = ObjectKind::ALL.into_iter().any(|kind| {
                    self.matches.contains_key(&kind)
                        && key
                            .strip_prefix(kind.matches_key().as_str())
                            .is_some_and(|suffix| MATCH_SUFFIXES.contains(&suffix))
                });
                matched || self.products.contains_key(key)
            }
        }
    }

    /// Write one field, overwriting any previous value.
    pub fn apply(&mut self, update: FieldUpdate) {
        match update {
            FieldUpdate::RecoFragments(v) => self.reco_fragments = Some(v),
            FieldUpdate::TruthFragments(v) => self.truth_fragments = Some(v),
            FieldUpdate::RecoParticles(v) => self.reco_particles = Some(v),
            FieldUpdate::TruthParticles(v) => self.truth_particles = Some(v),
            FieldUpdate::RecoInteractions(v) => self.reco_interactions = Some(v),
            FieldUpdate::TruthInteractions(v) => self.truth_interactions = Some(v),
            FieldUpdate::Matches(kind, pairs) => {
                self.matches.insert(kind, pairs);
            }
            FieldUpdate::Product(key, product) => {
                self.products.insert(key, product);
            }
        }
    }

    pub fn reco_particles(&self) -> RecoResult<&[Particle]> {
        self.reco_particles.as_deref().ok_or_else(|| missing("reco_particles"))
    }

    pub fn truth_particles(&self) -> RecoResult<&[Particle]> {
        self.truth_particles.as_deref().ok_or_else(|| missing("truth_particles"))
    }

    pub fn reco_interactions(&self) -> RecoResult<&[Interaction]> {
        self.reco_interactions
            .as_deref()
            .ok_or_else(|| missing("reco_interactions"))
    }

    pub fn truth_interactions(&self) -> RecoResult<&[Interaction]> {
        self.truth_interactions
            .as_deref()
            .ok_or_else(|| missing("truth_interactions"))
    }

    pub fn match_pairs(&self, kind: ObjectKind) -> RecoResult<&MatchPairs> {
        self.matches
            .get(&kind)
            .ok_or_else(|| missing(&kind.matches_key()))
    }
}

fn missing(key: &str) -> RecoError {
    RecoError::MissingProduct {
        key: key.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// One or more entries processed together.
#[derive(Debug, Clone)]
pub struct Batch {
    index: Index,
    pub entries: Vec<Entry>,
}

impl Batch {
    /// A batch holding a single entry (scalar index).
    pub fn single(index: u64, products: BTreeMap<String, Product>) -> Self {
        Batch {
            index: Index::Single(index),
            entries: vec![Entry::new(index, products)],
        }
    }

    /// Build a batch from per-product columns holding one value per entry.
    ///
    /// Every column must be exactly as long as the index.
    pub fn from_columns(index: Index, columns: BTreeMap<String, Vec<Product>>) -> RecoResult<Self> {
        let indices = index.values();
        let mut entries: Vec<Entry> = indices
            .iter()
            .map(|&i| Entry::new(i, BTreeMap::new()))
            .collect();

        for (key, values) in columns {
            if values.len() != entries.len() {
                return Err(RecoError::BatchLength {
                    key,
                    expected: entries.len(),
                    got: values.len(),
                });
            }
            for (entry, value) in entries.iter_mut().zip(values) {
                entry.products.insert(key.clone(), value);
            }
        }

        Ok(Batch { index, entries })
    }

    /// Whether the batch was given a list of indices.
    pub fn is_batched(&self) -> bool {
        matches!(self.index, Index::Batched(_))
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, entry: usize) -> &Entry {
        &self.entries[entry]
    }
}
