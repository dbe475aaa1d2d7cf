//! Resolution of the tensors every representation is built from.

use std::collections::BTreeMap;

use log::debug;
use ndarray::{s, Array1, Array2};
use serde::Deserialize;

use crate::data::batch::{Entry, Product};
use crate::data::globals::{COORD_COLS, VALUE_COL};
use crate::data::meta::{Meta, Points, Units};
use crate::error::{RecoError, RecoResult};
use crate::objects::{NeutrinoLabel, ParticleLabel, UnitAware};

use super::BuildMode;

/// Name of the metadata product.
pub const META_KEY: &str = "meta";

/// Per-object start/end point predictions passed through as-is.
const POINT_OVERRIDES: [&str; 4] = [
    "fragment_start_points",
    "fragment_end_points",
    "particle_start_points",
    "particle_end_points",
];

// ---------------------------------------------------------------------------
// Source names
// ---------------------------------------------------------------------------

/// A single product name or a list of candidates, as written in a config.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Canonical source field → ordered candidate product names.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNames {
    names: BTreeMap<&'static str, Vec<String>>,
}

impl Default for SourceNames {
    fn default() -> Self {
        let defaults: [(&'static str, &[&str]); 9] = [
            ("data_tensor", &["data_adapt", "data"]),
            ("label_tensor", &["clust_label"]),
            ("label_adapt_tensor", &["clust_label_adapt", "clust_label"]),
            ("label_g4_tensor", &["clust_label_g4"]),
            ("depositions_q_label", &["charge_label"]),
            ("sources", &["sources_adapt", "sources"]),
            ("sources_label", &["sources_label"]),
            ("particles", &["particles"]),
            ("neutrinos", &["neutrinos"]),
        ];
        let names = defaults
            .into_iter()
            .map(|(key, alts)| (key, alts.iter().map(|s| s.to_string()).collect()))
            .collect();
        SourceNames { names }
    }
}

impl SourceNames {
    /// Defaults updated with user overrides. Only canonical field names may
    /// be overridden.
    pub fn with_overrides(overrides: BTreeMap<String, OneOrMany>) -> RecoResult<Self> {
        let mut out = SourceNames::default();
        for (key, value) in overrides {
            let Some((&canonical, _)) = out.names.get_key_value(key.as_str()) else {
                let known: Vec<&str> = out.names.keys().copied().collect();
                return Err(RecoError::Config(format!(
                    "Unexpected data product specified in `sources`: {key}. \
                     Should be one of {known:?}."
                )));
            };
            out.names.insert(canonical, value.into());
        }
        Ok(out)
    }

    pub fn candidates(&self, canonical: &str) -> &[String] {
        self.names.get(canonical).map_or(&[], Vec::as_slice)
    }

    /// First candidate product present in the entry.
    fn resolve<'a>(&self, entry: &'a Entry, canonical: &str) -> Option<(&'a str, &'a Product)> {
        self.candidates(canonical).iter().find_map(|alt| {
            entry
                .products
                .get_key_value(alt.as_str())
                .map(|(k, v)| (k.as_str(), v))
        })
    }

    fn resolve_tensor<'a>(
        &self,
        entry: &'a Entry,
        canonical: &str,
    ) -> RecoResult<Option<&'a Array2<f64>>> {
        match self.resolve(entry, canonical) {
            None => Ok(None),
            Some((key, _)) => entry.opt_tensor(key),
        }
    }
}

// ---------------------------------------------------------------------------
// Sources – resolved per-entry tensors
// ---------------------------------------------------------------------------

/// Reference coordinates and values shared by every representation of an
/// entry. Point sets are in the build manager's units.
#[derive(Debug, Clone, PartialEq)]
pub struct Sources {
    pub points: Points,
    pub depositions: Array1<f64>,
    pub label_tensor: Option<Array2<f64>>,
    pub points_label: Option<Points>,
    pub depositions_label: Option<Array1<f64>>,
    pub label_adapt_tensor: Option<Array2<f64>>,
    pub depositions_label_adapt: Option<Array1<f64>>,
    pub depositions_q_label: Option<Array1<f64>>,
    pub label_g4_tensor: Option<Array2<f64>>,
    pub points_g4: Option<Points>,
    pub depositions_g4: Option<Array1<f64>>,
    pub sources: Option<Array2<i64>>,
    pub sources_label: Option<Array2<i64>>,
    /// Start/end point predictions, keyed by product name.
    pub point_overrides: BTreeMap<String, Points>,
    pub particles: Option<Vec<ParticleLabel>>,
    pub neutrinos: Option<Vec<NeutrinoLabel>>,
    pub units: Units,
}

impl Sources {
    /// Sorted unique module ids of a set of rows of a `sources` tensor.
    pub fn module_ids(sources: Option<&Array2<i64>>, index: &[usize]) -> Vec<i64> {
        let Some(sources) = sources else {
            return Vec::new();
        };
        let mut ids: Vec<i64> = index
            .iter()
            .filter(|&&i| i < sources.nrows())
            .map(|&i| sources[[i, 0]])
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn label_tensor(&self) -> RecoResult<&Array2<f64>> {
        self.label_tensor.as_ref().ok_or_else(|| RecoError::MissingProduct {
            key: "label_tensor".to_string(),
        })
    }

    pub fn label_adapt_tensor(&self) -> RecoResult<&Array2<f64>> {
        self.label_adapt_tensor
            .as_ref()
            .ok_or_else(|| RecoError::MissingProduct {
                key: "label_adapt_tensor".to_string(),
            })
    }
}

/// Split a tensor into its coordinate and value columns.
fn split(tensor: &Array2<f64>, key: &str) -> RecoResult<(Array2<f64>, Array1<f64>)> {
    if tensor.nrows() == 0 {
        return Ok((Array2::zeros((0, 3)), Array1::zeros(0)));
    }
    if tensor.ncols() <= VALUE_COL {
        return Err(RecoError::Columns {
            key: key.to_string(),
            expected: VALUE_COL + 1,
            got: tensor.ncols(),
        });
    }
    let coords = tensor.slice(s![.., COORD_COLS]).to_owned();
    let values = tensor.column(VALUE_COL).to_owned();
    Ok((coords, values))
}

fn values(tensor: &Array2<f64>, key: &str) -> RecoResult<Array1<f64>> {
    split(tensor, key).map(|(_, v)| v)
}

/// Build the reference coordinate and value arrays of one entry.
///
/// Truth particle/neutrino labels are brought to `units` in place in the
/// entry (only when their tag differs) and copied into the result; every
/// other array is copied before conversion, the entry's tensors are never
/// modified.
pub fn build_sources(
    entry: &mut Entry,
    names: &SourceNames,
    mode: BuildMode,
    units: Units,
) -> RecoResult<Sources> {
    let data = names
        .resolve_tensor(entry, "data_tensor")?
        .ok_or_else(|| RecoError::MissingProduct {
            key: format!("data_tensor ({:?})", names.candidates("data_tensor")),
        })?;
    let (coords, depositions) = split(data, "data_tensor")?;

    let mut sources = Sources {
        points: Points::new(coords, Units::Px),
        depositions,
        label_tensor: None,
        points_label: None,
        depositions_label: None,
        label_adapt_tensor: None,
        depositions_label_adapt: None,
        depositions_q_label: None,
        label_g4_tensor: None,
        points_g4: None,
        depositions_g4: None,
        sources: None,
        sources_label: None,
        point_overrides: BTreeMap::new(),
        particles: None,
        neutrinos: None,
        units,
    };

    if mode.builds_truth() {
        let label = names
            .resolve_tensor(entry, "label_tensor")?
            .ok_or_else(|| RecoError::MissingProduct {
                key: "label_tensor".to_string(),
            })?;
        let (coords, deps) = split(label, "label_tensor")?;
        sources.label_tensor = Some(label.clone());
        sources.points_label = Some(Points::new(coords, Units::Px));
        sources.depositions_label = Some(deps);

        let adapt = names
            .resolve_tensor(entry, "label_adapt_tensor")?
            .ok_or_else(|| RecoError::MissingProduct {
                key: "label_adapt_tensor".to_string(),
            })?;
        sources.depositions_label_adapt = Some(values(adapt, "label_adapt_tensor")?);
        sources.label_adapt_tensor = Some(adapt.clone());

        if let Some(charge) = names.resolve_tensor(entry, "depositions_q_label")? {
            sources.depositions_q_label = Some(values(charge, "depositions_q_label")?);
        }
    }

    if let Some(g4) = names.resolve_tensor(entry, "label_g4_tensor")? {
        let (coords, deps) = split(g4, "label_g4_tensor")?;
        sources.label_g4_tensor = Some(g4.clone());
        sources.points_g4 = Some(Points::new(coords, Units::Px));
        sources.depositions_g4 = Some(deps);
    }

    if let Some(t) = names.resolve_tensor(entry, "sources")? {
        sources.sources = Some(t.mapv(|v| v as i64));
    }
    if let Some(t) = names.resolve_tensor(entry, "sources_label")? {
        sources.sources_label = Some(t.mapv(|v| v as i64));
    }

    for key in POINT_OVERRIDES {
        if let Some(t) = entry.opt_tensor(key)? {
            let coords = if t.nrows() == 0 {
                Array2::zeros((0, 3))
            } else if t.ncols() < 3 {
                return Err(RecoError::Columns {
                    key: key.to_string(),
                    expected: 3,
                    got: t.ncols(),
                });
            } else {
                t.slice(s![.., 0..3]).to_owned()
            };
            sources
                .point_overrides
                .insert(key.to_string(), Points::new(coords, Units::Px));
        }
    }

    // Convert everything to the proper units once and for all
    let meta = if units != Units::Px {
        Some(entry.meta(META_KEY)?.cloned().ok_or(RecoError::MissingMeta)?)
    } else {
        entry.meta(META_KEY)?.cloned()
    };

    if let Some(meta) = meta.as_ref().filter(|_| units != Units::Px) {
        sources.points.convert(meta, units);
        for points in [&mut sources.points_label, &mut sources.points_g4]
            .into_iter()
            .flatten()
        {
            points.convert(meta, units);
        }
        for points in sources.point_overrides.values_mut() {
            points.convert(meta, units);
        }
    }

    sources.particles = convert_labels(entry, names, "particles", meta.as_ref(), units, |p| match p {
        Product::Particles(v) => Some(v),
        _ => None,
    })?;
    sources.neutrinos = convert_labels(entry, names, "neutrinos", meta.as_ref(), units, |p| match p {
        Product::Neutrinos(v) => Some(v),
        _ => None,
    })?;

    debug!(
        "Entry {}: resolved {} voxels ({} label voxels) in {units}",
        entry.index,
        sources.points.len(),
        sources.points_label.as_ref().map_or(0, Points::len),
    );

    Ok(sources)
}

/// Convert a truth label list stored in the entry to `units` in place and
/// return a copy of it.
fn convert_labels<T: UnitAware + Clone>(
    entry: &mut Entry,
    names: &SourceNames,
    canonical: &'static str,
    meta: Option<&Meta>,
    units: Units,
    pick: impl Fn(&mut Product) -> Option<&mut Vec<T>>,
) -> RecoResult<Option<Vec<T>>> {
    let Some(key) = names
        .candidates(canonical)
        .iter()
        .find(|alt| entry.products.contains_key(alt.as_str()))
        .cloned()
    else {
        return Ok(None);
    };

    let product = entry
        .products
        .get_mut(&key)
        .ok_or_else(|| RecoError::MissingProduct { key: key.clone() })?;
    let labels = pick(product).ok_or(RecoError::UnexpectedProduct {
        key: key.clone(),
        expected: canonical,
    })?;

    for label in labels.iter_mut() {
        if label.units() != units {
            let meta = meta.ok_or(RecoError::MissingMeta)?;
            label.convert(meta, units);
        }
    }
    Ok(Some(labels.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batch::Batch;
    use ndarray::array;

    fn meta() -> Meta {
        Meta {
            lower: [0.0, 0.0, 0.0],
            upper: [100.0, 100.0, 100.0],
            size: [0.3, 0.3, 0.3],
        }
    }

    fn entry_with(products: Vec<(&str, Product)>) -> Entry {
        let products = products
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Entry::new(0, products)
    }

    #[test]
    fn overrides_are_validated_against_canonical_names() {
        let mut overrides = BTreeMap::new();
        overrides.insert("data_tensor".to_string(), OneOrMany::One("input".to_string()));
        let names = SourceNames::with_overrides(overrides).unwrap();
        assert_eq!(names.candidates("data_tensor"), ["input".to_string()]);

        let mut bad = BTreeMap::new();
        bad.insert("bogus".to_string(), OneOrMany::One("x".to_string()));
        assert!(matches!(
            SourceNames::with_overrides(bad),
            Err(RecoError::Config(_))
        ));
    }

    #[test]
    fn first_present_candidate_wins() {
        let mut entry = entry_with(vec![
            ("data", Product::Tensor(array![[0.0, 1.0, 1.0, 1.0, 9.0]])),
            ("data_adapt", Product::Tensor(array![[0.0, 2.0, 2.0, 2.0, 5.0]])),
        ]);
        let sources =
            build_sources(&mut entry, &SourceNames::default(), BuildMode::Reco, Units::Px).unwrap();
        assert_eq!(sources.points.coords, array![[2.0, 2.0, 2.0]]);
        assert_eq!(sources.depositions, array![5.0]);
    }

    #[test]
    fn reco_mode_tolerates_missing_labels_in_every_entry() {
        let mut columns = BTreeMap::new();
        columns.insert(
            "data".to_string(),
            vec![
                Product::Tensor(array![[0.0, 1.0, 2.0, 3.0, 0.5]]),
                Product::Tensor(array![[1.0, 4.0, 5.0, 6.0, 1.5], [1.0, 7.0, 8.0, 9.0, 2.5]]),
            ],
        );
        columns.insert("meta".to_string(), vec![Product::Meta(meta()), Product::Meta(meta())]);
        let mut batch =
            Batch::from_columns(crate::data::batch::Index::Batched(vec![0, 1]), columns).unwrap();

        let names = SourceNames::default();
        for entry in batch.entries.iter_mut() {
            let sources = build_sources(entry, &names, BuildMode::Reco, Units::Cm).unwrap();
            assert_eq!(sources.points.units, Units::Cm);
            assert_eq!(sources.points.len(), sources.depositions.len());
            assert!(sources.label_tensor.is_none());
        }
    }

    #[test]
    fn truth_modes_require_the_label_tensor() {
        let mut entry = entry_with(vec![(
            "data",
            Product::Tensor(array![[0.0, 1.0, 2.0, 3.0, 0.5]]),
        )]);
        let err = build_sources(&mut entry, &SourceNames::default(), BuildMode::Both, Units::Px)
            .unwrap_err();
        assert!(matches!(err, RecoError::MissingProduct { .. }));
    }

    #[test]
    fn missing_data_tensor_is_fatal() {
        let mut entry = entry_with(vec![]);
        assert!(build_sources(&mut entry, &SourceNames::default(), BuildMode::Reco, Units::Px)
            .is_err());
    }

    #[test]
    fn cm_units_need_meta() {
        let mut entry = entry_with(vec![(
            "data",
            Product::Tensor(array![[0.0, 1.0, 2.0, 3.0, 0.5]]),
        )]);
        let err = build_sources(&mut entry, &SourceNames::default(), BuildMode::Reco, Units::Cm)
            .unwrap_err();
        assert!(matches!(err, RecoError::MissingMeta));
    }

    #[test]
    fn conversion_copies_tensors_and_converts_labels_once() {
        let label = ParticleLabel {
            id: 0,
            group_id: 0,
            interaction_id: 0,
            nu_id: -1,
            pdg_code: 13,
            energy_init: 100.0,
            position: [10.0, 10.0, 10.0],
            end_position: [20.0, 10.0, 10.0],
            momentum: [1.0, 0.0, 0.0],
            shape: Default::default(),
            is_primary: true,
            units: Units::Px,
        };
        let data = array![[0.0, 10.0, 10.0, 10.0, 1.0]];
        let mut entry = entry_with(vec![
            ("data", Product::Tensor(data.clone())),
            ("meta", Product::Meta(meta())),
            ("particles", Product::Particles(vec![label])),
        ]);
        let names = SourceNames::default();

        let first = build_sources(&mut entry, &names, BuildMode::Reco, Units::Cm).unwrap();
        assert_eq!(entry.tensor("data").unwrap(), &data);
        let converted = first.particles.unwrap();
        assert_eq!(converted[0].units, Units::Cm);
        assert!((converted[0].position[0] - 3.15).abs() < 1e-12);

        // A second pass must not convert the labels again
        let second = build_sources(&mut entry, &names, BuildMode::Reco, Units::Cm).unwrap();
        assert_eq!(second.particles.unwrap(), converted);
    }
}
