//! Integration tests for the attribution engine

mod common;

use approx::assert_relative_eq;
use common::*;
use kolosal_explain::prelude::*;
use ndarray::{array, Array2};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Provider returning a fixed output and recording what it was handed
#[derive(Clone)]
struct StubProvider {
    output: RawAttribution,
    seen: Arc<Mutex<Vec<(bool, bool)>>>,
}

impl StubProvider {
    fn new(output: RawAttribution) -> Self {
        Self {
            output,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// (named table?, background supplied?) per call
    fn calls(&self) -> Vec<(bool, bool)> {
        self.seen.lock().unwrap().clone()
    }
}

impl AttributionProvider for StubProvider {
    fn compute(
        &self,
        _predictor: &BasePredictor,
        data: &FeatureTable,
        policy: &BackgroundPolicy,
    ) -> Result<RawAttribution> {
        let named = matches!(data, FeatureTable::Named(_));
        let interventional = matches!(policy, BackgroundPolicy::Interventional(_));
        self.seen.lock().unwrap().push((named, interventional));
        Ok(self.output.clone())
    }
}

fn stub_engine(document: &serde_json::Value, provider: StubProvider) -> InferenceEngine {
    InferenceEngine::new(InferenceConfig::default())
        .with_artifact(artifact(document))
        .with_provider(provider)
}

// ============================================================================
// Normalization (stub provider)
// ============================================================================

#[test]
fn test_binary_example_negates_single_array() {
    let provider = StubProvider::new(RawAttribution::Single(array![[0.1, 0.05]]));
    let engine = stub_engine(&binary_document(), provider.clone());

    let result = engine
        .explain(&records(json!({"age": 30, "color": "red"})), None)
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        json,
        json!({
            "no": [{"age": -0.1, "color": -0.05}],
            "yes": [{"age": 0.1, "color": 0.05}]
        })
    );
    assert_eq!(provider.calls(), vec![(false, false)]);
}

#[test]
fn test_bare_array_for_three_classes_is_fatal() {
    let provider = StubProvider::new(RawAttribution::Single(array![[0.1, 0.2]]));
    let engine = stub_engine(&multiclass_document(), provider);

    let err = engine.explain(&records(json!({"x": 1.0, "y": 1.0})), None).unwrap_err();
    assert!(matches!(err, KolosalError::Explain(_)));
}

#[test]
fn test_per_class_count_must_match() {
    let provider = StubProvider::new(RawAttribution::PerClass(vec![
        array![[0.1, 0.2]],
        array![[0.3, 0.4]],
    ]));
    let engine = stub_engine(&multiclass_document(), provider);

    let err = engine.explain(&records(json!({"x": 1.0, "y": 1.0})), None).unwrap_err();
    assert!(matches!(err, KolosalError::Explain(_)));
}

#[test]
fn test_row_count_must_match() {
    let provider = StubProvider::new(RawAttribution::Single(array![[0.1, 0.05]]));
    let engine = stub_engine(&binary_document(), provider);

    let err = engine
        .explain(
            &records(json!([{"age": 30, "color": "red"}, {"age": 31, "color": "red"}])),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, KolosalError::Explain(_)));
}

#[test]
fn test_background_selects_interventional_policy() {
    let provider = StubProvider::new(RawAttribution::Single(array![[0.1, 0.05]]));
    let engine = stub_engine(&binary_document(), provider.clone());

    let background = records(json!([{"age": 20, "color": "blue"}, {"age": 70, "color": "red"}]));
    engine
        .explain(&records(json!({"age": 30, "color": "red"})), Some(&background))
        .unwrap();
    assert_eq!(provider.calls(), vec![(false, true)]);
}

#[test]
fn test_background_is_validated() {
    let provider = StubProvider::new(RawAttribution::Single(array![[0.1, 0.05]]));
    let engine = stub_engine(&binary_document(), provider.clone());

    let background = records(json!([{"age": 20}]));
    let err = engine
        .explain(&records(json!({"age": 30, "color": "red"})), Some(&background))
        .unwrap_err();
    assert!(matches!(err, KolosalError::Validation { ref field, .. } if field == "color"));
    assert!(provider.calls().is_empty());
}

#[test]
fn test_lightgbm_receives_named_table() {
    let mut doc = regression_document();
    doc["model"]["family"] = json!("lightgbm");
    let provider = StubProvider::new(RawAttribution::Single(Array2::zeros((1, 2))));
    let engine = stub_engine(&doc, provider.clone());

    engine.explain(&records(json!({"x": 1.0, "y": 1.0})), None).unwrap();
    assert_eq!(provider.calls(), vec![(true, false)]);
}

#[test]
fn test_linear_model_not_explainable() {
    let provider = StubProvider::new(RawAttribution::Single(array![[0.0, 0.0]]));
    let engine = stub_engine(&linear_document(), provider.clone());

    let err = engine.explain(&records(json!({"x": 1.0, "y": 1.0})), None).unwrap_err();
    assert!(matches!(err, KolosalError::UnsupportedModel(ref family) if family == "linear"));
    assert!(provider.calls().is_empty());
}

// ============================================================================
// Built-in tree explainer
// ============================================================================

#[test]
fn test_regression_explain_keys_match_schema() {
    let engine = engine(&regression_document());
    let result = engine.explain(&records(json!({"y": 9.0, "x": 1.0})), None).unwrap();

    let rows = result.records().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["x", "y"]);

    // E[f] = 10 + 0.5 + 0.6 = 11.1, f(x) = 12
    assert_relative_eq!(rows[0].get("x").unwrap(), 3.0 - 0.5, epsilon = 1e-12);
    assert_relative_eq!(rows[0].get("y").unwrap(), -1.0 - 0.6, epsilon = 1e-12);
}

#[test]
fn test_binary_tree_explain_is_antisymmetric() {
    let engine = engine(&binary_document());
    let result = engine
        .explain(&records(json!([{"age": 30, "color": "red"}, {"age": 55, "color": "blue"}])), None)
        .unwrap();

    let no = result.class("no").unwrap();
    let yes = result.class("yes").unwrap();
    assert_eq!(no.len(), 2);
    for (n, y) in no.iter().zip(yes) {
        for feature in ["age", "color"] {
            assert_eq!(n.get(feature).unwrap(), -y.get(feature).unwrap());
        }
    }

    // Raw margin space: age contributes 0.8 - (0.6 * 0.8 + 0.4 * -0.5)
    assert_relative_eq!(yes[0].get("age").unwrap(), 0.8 - 0.28, epsilon = 1e-12);
}

#[test]
fn test_multiclass_background_attributions_are_additive() {
    let engine = engine(&multiclass_document());
    let input = records(json!([{"x": 1.0, "y": 0.0}, {"x": -1.0, "y": 3.0}]));
    let background = records(json!([
        {"x": -2.0, "y": 0.0},
        {"x": 2.0, "y": 2.0},
        {"x": 0.5, "y": -1.0}
    ]));

    let result = engine.explain(&input, Some(&background)).unwrap();
    let proba = engine.predict_proba(&input).unwrap();
    let bg_proba = engine.predict_proba(&background).unwrap();

    for class in ["a", "b", "c"] {
        let rows = result.class(class).unwrap();
        let bg_mean: f64 =
            bg_proba.iter().map(|r| r.get(class).unwrap()).sum::<f64>() / bg_proba.len() as f64;
        for (row, p) in rows.iter().zip(&proba) {
            assert_relative_eq!(
                row.values().sum::<f64>(),
                p.get(class).unwrap() - bg_mean,
                epsilon = 1e-10
            );
        }
    }

    // Probability attributions cancel across classes
    for r in 0..2 {
        for feature in ["x", "y"] {
            let total: f64 = ["a", "b", "c"]
                .iter()
                .map(|c| result.class(c).unwrap()[r].get(feature).unwrap())
                .sum();
            assert_relative_eq!(total, 0.0, epsilon = 1e-10);
        }
    }
}

#[test]
fn test_lightgbm_named_columns_stay_aligned() {
    // Same model, features stored in reverse order with indices remapped
    let positional = regression_document();
    let mut named = regression_document();
    named["model"]["family"] = json!("lightgbm");
    named["model"]["feature_names"] = json!(["y", "x"]);
    named["model"]["trees"][0]["root"]["split"]["feature_idx"] = json!(1);
    named["model"]["trees"][1]["root"]["split"]["feature_idx"] = json!(0);

    let input = records(json!([{"x": 1.0, "y": 9.0}, {"x": -1.0, "y": 0.0}]));
    let expected = engine(&positional).explain(&input, None).unwrap();
    let actual = engine(&named).explain(&input, None).unwrap();
    assert_eq!(actual, expected);

    assert_eq!(
        engine(&named).predict(&input).unwrap(),
        engine(&positional).predict(&input).unwrap()
    );
}

#[test]
fn test_sampled_attributions_are_reproducible() {
    let config = InferenceConfig::default().with_explainer(
        ExplainerConfig::new()
            .with_max_exact_features(1)
            .with_n_permutations(64)
            .with_seed(Some(7)),
    );
    let engine = InferenceEngine::new(config).with_artifact(artifact(&regression_document()));
    let input = records(json!({"x": 1.0, "y": 9.0}));
    let background = records(json!([{"x": -1.0, "y": 0.0}, {"x": 2.0, "y": 6.0}]));

    let first = engine.explain(&input, Some(&background)).unwrap();
    let second = engine.explain(&input, Some(&background)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_unvalidated_config_fails_at_explain() {
    let config = InferenceConfig::default()
        .with_explainer(ExplainerConfig::new().with_max_background_samples(Some(0)));
    let engine = InferenceEngine::new(config).with_artifact(artifact(&regression_document()));
    let input = records(json!({"x": 1.0, "y": 9.0}));
    let background = records(json!([{"x": -1.0, "y": 0.0}, {"x": 2.0, "y": 6.0}]));

    let err = engine.explain(&input, Some(&background)).unwrap_err();
    assert!(matches!(err, KolosalError::ConfigError(_)));
}
