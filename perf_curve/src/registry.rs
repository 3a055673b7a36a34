//! Dataset registry: compiled-in charts addressed by id, plus cached views.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chart::{curve_polylines, scatter_points, Polylines};
use crate::dataset::{ParameterKind, QueryShape, SampleDataset, SamplePoint};
use crate::predict::{PredictionFailure, PredictionResult, PredictionService};
use crate::PerfError;

const BUILTIN_DATASETS: &[(&str, &str)] = &[
    ("mtow", include_str!("../data/mtow.json")),
    ("mlw", include_str!("../data/mlw.json")),
    ("d1", include_str!("../data/d1.json")),
    ("ttet", include_str!("../data/ttet.json")),
    ("vtoss", include_str!("../data/vtoss.json")),
    ("vlss", include_str!("../data/vlss.json")),
];

/// Weather and configuration fields a metric may read.
///
/// Pressure altitude and ISA deviation are expected pre-derived by the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionInputs {
    pub temperature: Option<f64>,
    pub pressure_altitude: Option<f64>,
    pub wind_speed: Option<f64>,
    pub dropdown_height: Option<f64>,
    pub isa_deviation: Option<f64>,
    pub weight: Option<f64>,
}

impl PredictionInputs {
    pub fn parameter(&self, kind: ParameterKind) -> Result<f64, PredictionFailure> {
        let value = match kind {
            ParameterKind::Temperature => self.temperature,
            ParameterKind::Wind => self.wind_speed,
            ParameterKind::IsaDeviation => self.isa_deviation,
            ParameterKind::Dropdown => self.dropdown_height,
        };
        value.ok_or(PredictionFailure::MissingInput(kind.input_name()))
    }

    pub fn continuous(&self, shape: QueryShape) -> Result<f64, PredictionFailure> {
        match shape {
            QueryShape::ByAltitude => self
                .pressure_altitude
                .ok_or(PredictionFailure::MissingInput("pressure altitude")),
            QueryShape::ByWeight => self.weight.ok_or(PredictionFailure::MissingInput("weight")),
        }
    }
}

struct DatasetEntry {
    dataset: SampleDataset,
    scatter: OnceLock<Vec<SamplePoint>>,
    polylines: Mutex<HashMap<OrderedFloat<f64>, Arc<Polylines>>>,
}

impl DatasetEntry {
    fn new(dataset: SampleDataset) -> Self {
        Self {
            dataset,
            scatter: OnceLock::new(),
            polylines: Mutex::new(HashMap::new()),
        }
    }
}

/// Validated datasets keyed by id. Every dataset is checked on insertion.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<String, DatasetEntry>,
}

impl Registry {
    /// Decode and validate every compiled-in dataset.
    pub fn builtin() -> Result<Self, PerfError> {
        let mut registry = Self::default();
        for (id, text) in BUILTIN_DATASETS {
            let dataset = SampleDataset::from_json(text)?;
            if dataset.id != *id {
                return Err(PerfError::InvalidDataset {
                    dataset: dataset.id,
                    reason: format!("embedded as '{}'", id),
                });
            }
            registry.insert(dataset)?;
        }
        debug!(datasets = registry.entries.len(), "registry loaded");
        Ok(registry)
    }

    pub fn insert(&mut self, dataset: SampleDataset) -> Result<(), PerfError> {
        dataset.validate()?;
        if self.entries.contains_key(&dataset.id) {
            return Err(PerfError::InvalidDataset {
                dataset: dataset.id,
                reason: "duplicate dataset id".into(),
            });
        }
        self.entries
            .insert(dataset.id.clone(), DatasetEntry::new(dataset));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&SampleDataset> {
        self.entries.get(id).map(|entry| &entry.dataset)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &SampleDataset> {
        self.entries.values().map(|entry| &entry.dataset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: &str) -> Result<&DatasetEntry, PerfError> {
        self.entries
            .get(id)
            .ok_or_else(|| PerfError::UnknownMetric(id.to_string()))
    }

    /// Predict one metric from the inputs relevant to it.
    ///
    /// The metric id is the dataset id; the dataset decides which input is its
    /// discrete parameter and whether altitude or weight drives the query.
    pub fn predict(
        &self,
        metric_id: &str,
        inputs: &PredictionInputs,
    ) -> Result<PredictionResult, PerfError> {
        let dataset = &self.entry(metric_id)?.dataset;
        let discrete = match inputs.parameter(dataset.parameter.kind) {
            Ok(v) => v,
            Err(failure) => return Ok(failure.into()),
        };
        let continuous = match inputs.continuous(dataset.query) {
            Ok(v) => v,
            Err(failure) => return Ok(failure.into()),
        };
        PredictionService::new(dataset).predict(discrete, continuous, dataset.rounding)
    }

    pub fn scatter_points(&self, id: &str) -> Result<&[SamplePoint], PerfError> {
        let entry = self.entry(id)?;
        Ok(entry.scatter.get_or_init(|| scatter_points(&entry.dataset)))
    }

    /// Polylines for `id` at `step`, computed once per step and shared.
    pub fn curve_polylines(&self, id: &str, step: f64) -> Result<Arc<Polylines>, PerfError> {
        let entry = self.entry(id)?;
        let key = OrderedFloat(step);
        if let Some(cached) = entry
            .polylines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return Ok(Arc::clone(cached));
        }
        let lines = Arc::new(curve_polylines(&entry.dataset, step)?);
        entry
            .polylines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, Arc::clone(&lines));
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::sample_json;

    #[test]
    fn test_builtin_registry_loads_all() {
        let registry = Registry::builtin().unwrap();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["d1", "mlw", "mtow", "ttet", "vlss", "vtoss"]);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut registry = Registry::default();
        let dataset = SampleDataset::from_json(&sample_json(&[10.0, 20.0])).unwrap();
        registry.insert(dataset.clone()).unwrap();
        assert!(matches!(
            registry.insert(dataset),
            Err(PerfError::InvalidDataset { .. })
        ));
    }

    #[test]
    fn test_unknown_metric_is_error() {
        let registry = Registry::default();
        let err = registry
            .predict("nope", &PredictionInputs::default())
            .unwrap_err();
        assert_eq!(err, PerfError::UnknownMetric("nope".into()));
    }

    #[test]
    fn test_missing_input_is_structured() {
        let mut registry = Registry::default();
        registry
            .insert(SampleDataset::from_json(&sample_json(&[10.0, 20.0])).unwrap())
            .unwrap();
        let inputs = PredictionInputs {
            wind_speed: Some(15.0),
            ..PredictionInputs::default()
        };
        let result = registry.predict("test", &inputs).unwrap();
        assert_eq!(result.value, None);
        assert_eq!(result.error.as_deref(), Some("Missing weight input"));
        assert_eq!(result.text.as_deref(), Some("N/A"));
    }

    #[test]
    fn test_views_are_cached() {
        let mut registry = Registry::default();
        registry
            .insert(SampleDataset::from_json(&sample_json(&[10.0, 20.0])).unwrap())
            .unwrap();
        let first = registry.curve_polylines("test", 10.0).unwrap();
        let second = registry.curve_polylines("test", 10.0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let scatter = registry.scatter_points("test").unwrap();
        assert_eq!(scatter.len(), 10);
        assert!(std::ptr::eq(scatter, registry.scatter_points("test").unwrap()));
    }
}
