//! Shared artifact fixtures for integration tests

#![allow(dead_code)]

use kolosal_explain::prelude::*;
use serde_json::{json, Value};

pub fn stump(feature_idx: usize, threshold: f64, left: Value, right: Value, covers: (usize, usize)) -> Value {
    json!({"root": {"split": {
        "feature_idx": feature_idx,
        "threshold": threshold,
        "n_samples": covers.0 + covers.1,
        "left": {"leaf": {"value": left, "n_samples": covers.0}},
        "right": {"leaf": {"value": right, "n_samples": covers.1}}
    }}})
}

/// Schema `{age: numeric, color: categorical}`, classes `[no, yes]`,
/// color ordinal-encoded before a binary logistic XGBoost model
pub fn binary_document() -> Value {
    json!({
        "model": {
            "kind": "pipeline",
            "steps": [
                {"name": "encode", "step": {"transform": {
                    "type": "ordinal_encode",
                    "columns": {"color": ["red", "blue"]}
                }}},
                {"name": "model", "step": {"estimator": {
                    "kind": "predictor",
                    "family": "xgboost",
                    "feature_names": ["age", "color"],
                    "classes": ["no", "yes"],
                    "objective": "binary_logistic",
                    "base_score": [0.0],
                    "trees": [
                        stump(0, 40.0, json!([0.8]), json!([-0.5]), (6, 4)),
                        stump(1, 0.5, json!([0.3]), json!([-0.2]), (5, 5))
                    ]
                }}}
            ]
        },
        "metadata": {
            "features": [
                {"name": "age", "kind": "numeric"},
                {"name": "color", "kind": "categorical", "categories": ["red", "blue"]}
            ],
            "task": "classification"
        }
    })
}

/// Three-class random forest over numeric `x` and `y`
pub fn multiclass_document() -> Value {
    json!({
        "model": {
            "kind": "predictor",
            "family": "random_forest",
            "feature_names": ["x", "y"],
            "classes": ["a", "b", "c"],
            "objective": "class_probability",
            "aggregation": "mean",
            "trees": [
                stump(0, 0.0, json!([0.7, 0.2, 0.1]), json!([0.1, 0.3, 0.6]), (4, 6)),
                stump(1, 1.0, json!([0.5, 0.5, 0.0]), json!([0.2, 0.2, 0.6]), (5, 5))
            ]
        },
        "metadata": {
            "features": [
                {"name": "x", "kind": "numeric"},
                {"name": "y", "kind": "numeric"}
            ],
            "task": "classification"
        }
    })
}

/// Gradient-boosted regressor over numeric `x` and `y`
pub fn regression_document() -> Value {
    json!({
        "model": {
            "kind": "predictor",
            "family": "gradient_boosting",
            "feature_names": ["x", "y"],
            "objective": "regression",
            "base_score": [10.0],
            "trees": [
                stump(0, 0.0, json!([-2.0]), json!([3.0]), (5, 5)),
                stump(1, 5.0, json!([1.0]), json!([-1.0]), (8, 2))
            ]
        },
        "metadata": {
            "features": [
                {"name": "x", "kind": "numeric"},
                {"name": "y", "kind": "numeric"}
            ],
            "task": "regression"
        }
    })
}

/// Binary logistic linear model without class names
pub fn linear_document() -> Value {
    json!({
        "model": {
            "kind": "predictor",
            "family": "linear",
            "feature_names": ["x", "y"],
            "objective": "binary_logistic",
            "coefficients": [[1.0, -1.0]],
            "intercepts": [0.0]
        },
        "metadata": {
            "features": [
                {"name": "x", "kind": "numeric"},
                {"name": "y", "kind": "numeric"}
            ],
            "task": "classification"
        }
    })
}

pub fn artifact(document: &Value) -> ModelArtifact {
    ModelArtifact::from_json(&document.to_string()).unwrap()
}

pub fn engine(document: &Value) -> InferenceEngine {
    InferenceEngine::new(InferenceConfig::default()).with_artifact(artifact(document))
}

pub fn records(value: Value) -> Records {
    Records::try_from(value).unwrap()
}
