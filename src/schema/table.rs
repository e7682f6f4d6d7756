//! Conversion from validated tables to dense matrices

use crate::error::{KolosalError, Result};
use ndarray::Array2;
use polars::prelude::*;

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`.
///
/// Columns are taken in the order of `names`, nulls become NaN. String
/// columns are rejected: categorical features must be encoded by a pipeline
/// step before they reach a predictor.
pub fn table_to_matrix(df: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();

    let col_data: Vec<Vec<f64>> = names
        .iter()
        .map(|name| {
            let column = df.column(name).map_err(|_| {
                KolosalError::DataError(format!("column '{}' not found in table", name))
            })?;

            if column.dtype() == &DataType::String {
                return Err(KolosalError::DataError(format!(
                    "feature '{}' is categorical and must be encoded before prediction",
                    name
                )));
            }

            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            let values: Vec<f64> = series
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(Array2::from_shape_fn((n_rows, names.len()), |(r, c)| col_data[c][r]))
}
