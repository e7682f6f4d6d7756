//! Fitted column transforms applied by pipeline steps

use crate::error::{KolosalError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Center and scale of a fitted scaler column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub center: f64,
    pub scale: f64,
}

/// Constant used to fill nulls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Number(f64),
    Text(String),
}

/// A fitted, stateless column transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnTransform {
    /// `(x - center) / scale` per column
    Scale { columns: HashMap<String, ScaleParams> },
    /// Replace each category with its index in the fitted category list
    OrdinalEncode {
        columns: HashMap<String, Vec<String>>,
        /// Code for categories not seen during fitting; unknowns are rejected when absent
        #[serde(default)]
        unknown_value: Option<f64>,
    },
    /// Fill nulls with a constant per column
    Impute { columns: HashMap<String, FillValue> },
}

impl ColumnTransform {
    /// Transform the table. Columns not named by the transform pass through.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let replacements: Vec<Series> = match self {
            ColumnTransform::Scale { columns } => columns
                .iter()
                .map(|(name, params)| scale_series(source(df, name)?, params))
                .collect::<Result<_>>()?,
            ColumnTransform::OrdinalEncode { columns, unknown_value } => columns
                .iter()
                .map(|(name, categories)| {
                    encode_series(source(df, name)?, categories, *unknown_value)
                })
                .collect::<Result<_>>()?,
            ColumnTransform::Impute { columns } => columns
                .iter()
                .map(|(name, fill)| impute_series(source(df, name)?, fill))
                .collect::<Result<_>>()?,
        };

        let mut result = df.clone();
        for series in replacements {
            result.with_column(series)?;
        }
        Ok(result)
    }

    pub fn check(&self) -> Result<()> {
        match self {
            ColumnTransform::Scale { columns } => {
                if let Some((name, _)) = columns
                    .iter()
                    .find(|(_, p)| p.scale == 0.0 || !p.scale.is_finite() || !p.center.is_finite())
                {
                    return Err(KolosalError::InvalidModel(format!(
                        "scaler for '{}' has a zero or non-finite parameter",
                        name
                    )));
                }
            }
            ColumnTransform::OrdinalEncode { columns, .. } => {
                if let Some((name, _)) = columns.iter().find(|(_, c)| c.is_empty()) {
                    return Err(KolosalError::InvalidModel(format!(
                        "encoder for '{}' has no categories",
                        name
                    )));
                }
            }
            ColumnTransform::Impute { .. } => {}
        }
        Ok(())
    }
}

fn source<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| KolosalError::DataError(format!("transform column '{}' not found in table", name)))
}

fn scale_series(series: &Series, params: &ScaleParams) -> Result<Series> {
    let values: Vec<Option<f64>> = series
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.map(|x| (x - params.center) / params.scale))
        .collect();
    Ok(Series::new(series.name().clone(), values))
}

fn encode_series(series: &Series, categories: &[String], unknown: Option<f64>) -> Result<Series> {
    let index: HashMap<&str, f64> = categories
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i as f64))
        .collect();

    let strings = series.cast(&DataType::String)?;
    let values = strings
        .str()?
        .into_iter()
        .map(|v| match v {
            None => Ok(None),
            Some(s) => match (index.get(s), unknown) {
                (Some(code), _) => Ok(Some(*code)),
                (None, Some(code)) => Ok(Some(code)),
                (None, None) => Err(KolosalError::validation(
                    series.name().as_str(),
                    format!("category '{}' was not seen during fitting", s),
                )),
            },
        })
        .collect::<Result<Vec<Option<f64>>>>()?;
    Ok(Series::new(series.name().clone(), values))
}

fn impute_series(series: &Series, fill: &FillValue) -> Result<Series> {
    if series.dtype() == &DataType::String {
        let fill = match fill {
            FillValue::Text(s) => s.clone(),
            FillValue::Number(n) => n.to_string(),
        };
        let values: Vec<Option<String>> = series
            .str()?
            .into_iter()
            .map(|v| Some(v.map(str::to_string).unwrap_or_else(|| fill.clone())))
            .collect();
        return Ok(Series::new(series.name().clone(), values));
    }

    let fill = match fill {
        FillValue::Number(n) => *n,
        FillValue::Text(s) => {
            return Err(KolosalError::InvalidModel(format!(
                "cannot fill numeric column '{}' with text '{}'",
                series.name(),
                s
            )))
        }
    };
    let values: Vec<Option<f64>> = series
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| Some(v.unwrap_or(fill)))
        .collect();
    Ok(Series::new(series.name().clone(), values))
}
