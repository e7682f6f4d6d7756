//! Integration tests for the serving path: load, validate, preprocess, predict

mod common;

use approx::assert_relative_eq;
use common::*;
use kolosal_explain::prelude::*;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", binary_document()).unwrap();

    let engine = InferenceEngine::load(InferenceConfig::default(), file.path()).unwrap();
    assert!(engine.is_loaded());
    assert_eq!(engine.feature_names().unwrap(), vec!["age", "color"]);
    assert_eq!(engine.class_names().unwrap(), vec!["no", "yes"]);
    assert_eq!(engine.base_predictor().unwrap().family(), PredictorFamily::XGBoost);
}

#[test]
fn test_load_missing_file() {
    let err = InferenceEngine::load(InferenceConfig::default(), "/nonexistent/model.json").unwrap_err();
    assert!(matches!(err, KolosalError::IoError(_)));
}

#[test]
fn test_load_rejects_pipeline_ending_in_transform() {
    let mut doc = binary_document();
    doc["model"]["steps"].as_array_mut().unwrap().pop();
    let err = ModelArtifact::from_json(&doc.to_string()).unwrap_err();
    assert!(matches!(err, KolosalError::InvalidModel(_)));
}

#[test]
fn test_load_rejects_invalid_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", binary_document()).unwrap();

    let config = InferenceConfig::default().with_metrics_window(0);
    let err = InferenceEngine::load(config, file.path()).unwrap_err();
    assert!(matches!(err, KolosalError::ConfigError(_)));
}

// ============================================================================
// Readiness
// ============================================================================

#[test]
fn test_operations_before_load_are_not_ready() {
    let engine = InferenceEngine::new(InferenceConfig::default());
    let input = records(json!({"age": 30, "color": "red"}));

    assert!(matches!(engine.predict(&input), Err(KolosalError::NotReady)));
    assert!(matches!(engine.predict_proba(&input), Err(KolosalError::NotReady)));
    assert!(matches!(engine.preprocess(&input), Err(KolosalError::NotReady)));
    assert!(matches!(engine.explain(&input, None), Err(KolosalError::NotReady)));
    assert!(matches!(engine.class_names(), Err(KolosalError::NotReady)));
    assert!(matches!(engine.base_predictor(), Err(KolosalError::NotReady)));
}

#[test]
fn test_load_artifact_makes_engine_ready() {
    let mut engine = InferenceEngine::new(InferenceConfig::default());
    engine.load_artifact(artifact(&binary_document()));
    assert!(engine.predict(&records(json!({"age": 30, "color": "red"}))).is_ok());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_validation_errors_name_the_field() {
    let engine = engine(&binary_document());

    let cases = [
        (json!({"age": 30}), "color"),
        (json!({"age": 30, "color": "red", "size": 3}), "size"),
        (json!({"age": "old", "color": "red"}), "age"),
        (json!({"age": 30, "color": "green"}), "color"),
    ];
    for (input, field) in cases {
        match engine.predict(&records(input)) {
            Err(KolosalError::Validation { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected a validation error on {}, got {:?}", field, other),
        }
    }
}

#[test]
fn test_empty_batch_rejected() {
    let engine = engine(&binary_document());
    let err = engine.predict(&Records::Batch(Vec::new())).unwrap_err();
    assert!(matches!(err, KolosalError::InvalidInput(_)));
}

// ============================================================================
// Preprocess
// ============================================================================

#[test]
fn test_preprocess_applies_pipeline_transforms() {
    let engine = engine(&binary_document());
    let table = engine
        .preprocess(&records(json!([
            {"color": "blue", "age": 30},
            {"age": 50, "color": "red"}
        ])))
        .unwrap();

    let names: Vec<String> = table.get_column_names().iter().map(|n| n.to_string()).collect();
    assert_eq!(names, vec!["age", "color"]);
    assert_eq!(table.height(), 2);

    let colors: Vec<f64> = table
        .column("color")
        .unwrap()
        .as_materialized_series()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(colors, vec![1.0, 0.0]);
}

#[test]
fn test_preprocess_without_transform_returns_validated_table() {
    let engine = engine(&regression_document());
    let table = engine.preprocess(&records(json!({"y": 2.0, "x": 1.0}))).unwrap();
    assert_eq!(table.width(), 2);
    assert_eq!(table.height(), 1);
}

// ============================================================================
// Predict / predict_proba
// ============================================================================

#[test]
fn test_predict_returns_class_labels() {
    let engine = engine(&binary_document());
    let predictions = engine
        .predict(&records(json!([
            {"age": 30, "color": "red"},
            {"age": 60, "color": "blue"}
        ])))
        .unwrap();
    assert_eq!(
        predictions,
        vec![Prediction::Label("yes".into()), Prediction::Label("no".into())]
    );
}

#[test]
fn test_predict_proba_example() {
    let engine = engine(&binary_document());
    let proba = engine
        .predict_proba(&records(json!({"age": 30, "color": "red"})))
        .unwrap();

    assert_eq!(proba.len(), 1);
    assert_eq!(proba[0].keys().collect::<Vec<_>>(), vec!["no", "yes"]);
    let p_yes = 1.0 / (1.0 + (-1.1f64).exp());
    assert_relative_eq!(proba[0].get("yes").unwrap(), p_yes, epsilon = 1e-12);
    assert_relative_eq!(proba[0].get("no").unwrap(), 1.0 - p_yes, epsilon = 1e-12);
}

#[test]
fn test_predict_proba_batch_sums_to_one() {
    let engine = engine(&multiclass_document());
    let input = records(json!([
        {"x": -1.0, "y": 0.0},
        {"x": 1.0, "y": 0.0},
        {"x": 1.0, "y": 2.0},
        {"x": -3.0, "y": 7.0}
    ]));
    let proba = engine.predict_proba(&input).unwrap();

    assert_eq!(proba.len(), 4);
    for row in &proba {
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_relative_eq!(row.values().sum::<f64>(), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn test_predict_proba_serializes_as_objects() {
    let engine = engine(&multiclass_document());
    let proba = engine.predict_proba(&records(json!({"x": -1.0, "y": 0.0}))).unwrap();
    let json = serde_json::to_value(&proba).unwrap();
    assert_relative_eq!(json[0]["a"].as_f64().unwrap(), 0.6, epsilon = 1e-12);
}

#[test]
fn test_regression_predict_values() {
    let engine = engine(&regression_document());
    let predictions = engine.predict(&records(json!({"x": 1.0, "y": 9.0}))).unwrap();
    assert_eq!(predictions, vec![Prediction::Value(12.0)]);

    let err = engine.predict_proba(&records(json!({"x": 1.0, "y": 9.0}))).unwrap_err();
    assert!(matches!(err, KolosalError::UnsupportedTask { .. }));
}

#[test]
fn test_predict_without_class_names_returns_indices() {
    let engine = engine(&linear_document());
    let predictions = engine
        .predict(&records(json!([{"x": 2.0, "y": 0.0}, {"x": 0.0, "y": 2.0}])))
        .unwrap();
    assert_eq!(predictions, vec![Prediction::Class(1), Prediction::Class(0)]);
    assert_eq!(engine.class_names().unwrap(), vec!["0", "1"]);
}

#[test]
fn test_calibrated_classifier() {
    let doc = binary_document();
    let calibrated = json!({
        "model": {
            "kind": "calibrated",
            "base": doc["model"],
            "calibrators": [{"method": "isotonic", "x": [0.0, 1.0], "y": [0.2, 0.8]}]
        },
        "metadata": doc["metadata"]
    });
    let engine = engine(&calibrated);
    assert_eq!(engine.base_predictor().unwrap().family(), PredictorFamily::XGBoost);
    assert_eq!(engine.class_names().unwrap(), vec!["no", "yes"]);

    let proba = engine
        .predict_proba(&records(json!({"age": 30, "color": "red"})))
        .unwrap();
    let p_yes = 1.0 / (1.0 + (-1.1f64).exp());
    assert_relative_eq!(proba[0].get("yes").unwrap(), 0.2 + 0.6 * p_yes, epsilon = 1e-12);
    assert_relative_eq!(proba[0].values().sum::<f64>(), 1.0, epsilon = 1e-12);
}

fn calibrated(document: &serde_json::Value, calibrators: serde_json::Value) -> serde_json::Value {
    json!({
        "model": {"kind": "calibrated", "base": document["model"], "calibrators": calibrators},
        "metadata": document["metadata"]
    })
}

#[test]
fn test_multiclass_calibration_renormalizes() {
    let identity = json!({"method": "isotonic", "x": [0.0, 1.0], "y": [0.0, 1.0]});
    let flat = json!({"method": "isotonic", "x": [0.0, 1.0], "y": [0.5, 0.5]});
    let engine = engine(&calibrated(
        &multiclass_document(),
        json!([identity.clone(), identity, flat]),
    ));

    let proba = engine
        .predict_proba(&records(json!([{"x": -1.0, "y": 0.0}, {"x": 1.0, "y": 2.0}])))
        .unwrap();
    for row in &proba {
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_relative_eq!(row.values().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    // Raw [0.6, 0.35, 0.05] calibrates to [0.6, 0.35, 0.5]
    assert_relative_eq!(proba[0].get("a").unwrap(), 0.6 / 1.45, epsilon = 1e-12);
    assert_relative_eq!(proba[0].get("c").unwrap(), 0.5 / 1.45, epsilon = 1e-12);
}

#[test]
fn test_load_rejects_calibrator_count_mismatch() {
    let platt = json!({"method": "platt", "a": 1.0, "b": 0.0});
    let doc = calibrated(&multiclass_document(), json!([platt.clone(), platt.clone()]));
    let err = ModelArtifact::from_json(&doc.to_string()).unwrap_err();
    assert!(matches!(err, KolosalError::InvalidModel(_)));

    // A single positive-class calibrator is accepted for binary models only
    let binary = calibrated(&binary_document(), json!([platt.clone()]));
    assert!(ModelArtifact::from_json(&binary.to_string()).is_ok());
    let per_class = calibrated(&binary_document(), json!([platt.clone(), platt.clone()]));
    assert!(ModelArtifact::from_json(&per_class.to_string()).is_ok());
    let single = calibrated(&multiclass_document(), json!([platt]));
    assert!(ModelArtifact::from_json(&single.to_string()).is_err());
}

// ============================================================================
// Concurrency & stats
// ============================================================================

#[test]
fn test_shared_engine_across_threads() {
    let engine = Arc::new(engine(&multiclass_document()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let input = records(json!({"x": i as f64 - 2.0, "y": 0.0}));
                engine.predict_proba(&input).unwrap().len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
    assert_eq!(engine.stats().total_requests, 4);
}

#[test]
fn test_stats_count_errors() {
    let engine = engine(&binary_document());
    let _ = engine.predict(&records(json!({"age": 30})));
    engine.predict(&records(json!({"age": 30, "color": "red"}))).unwrap();

    let stats = engine.stats();
    assert_eq!(stats.error_count, 1);
    assert_eq!(stats.total_records, 1);
}
