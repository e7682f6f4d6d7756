//! Feature validation against the declared schema

use super::{json_type_name, FeatureKind, FeatureSchema, FeatureSpec, Record, Records};
use crate::error::{KolosalError, Result};
use polars::prelude::*;
use serde_json::Value;

/// Validates request records and builds a schema-ordered table
///
/// Numeric features become `Float64` columns, categorical features `String`
/// columns. Optional features that are absent or null become nulls.
#[derive(Debug, Clone, Copy)]
pub struct FeatureValidator<'a> {
    schema: &'a FeatureSchema,
}

impl<'a> FeatureValidator<'a> {
    pub fn new(schema: &'a FeatureSchema) -> Self {
        Self { schema }
    }

    /// Validate one record or a batch and return a one-row-per-record table
    pub fn validate(&self, records: &Records) -> Result<DataFrame> {
        let rows = records.as_slice();
        if rows.is_empty() {
            return Err(KolosalError::InvalidInput("no records supplied".to_string()));
        }

        for (i, row) in rows.iter().enumerate() {
            self.check_keys(i, row)?;
        }

        let columns = self
            .schema
            .iter()
            .map(|spec| match spec.kind {
                FeatureKind::Numeric => self.numeric_column(spec, rows),
                FeatureKind::Categorical => self.categorical_column(spec, rows),
            })
            .collect::<Result<Vec<Column>>>()?;

        Ok(DataFrame::new(columns)?)
    }

    fn check_keys(&self, index: usize, row: &Record) -> Result<()> {
        if let Some(extra) = row.keys().find(|key| self.schema.get(key).is_none()) {
            return Err(KolosalError::validation(
                extra.as_str(),
                format!("unexpected feature in record {}", index),
            ));
        }
        Ok(())
    }

    fn numeric_column(&self, spec: &FeatureSpec, rows: &[Record]) -> Result<Column> {
        let values = rows
            .iter()
            .enumerate()
            .map(|(i, row)| match lookup(spec, i, row)? {
                None => Ok(None),
                Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| {
                    KolosalError::validation(
                        spec.name.as_str(),
                        format!("number in record {} is not representable as f64", i),
                    )
                }),
                Some(other) => Err(KolosalError::validation(
                    spec.name.as_str(),
                    format!(
                        "expected a numeric value in record {}, got {}",
                        i,
                        json_type_name(other)
                    ),
                )),
            })
            .collect::<Result<Vec<Option<f64>>>>()?;

        Ok(Series::new(spec.name.as_str().into(), values).into())
    }

    fn categorical_column(&self, spec: &FeatureSpec, rows: &[Record]) -> Result<Column> {
        let values = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let value = match lookup(spec, i, row)? {
                    None => return Ok(None),
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Bool(b)) => b.to_string(),
                    Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
                    Some(other) => {
                        return Err(KolosalError::validation(
                            spec.name.as_str(),
                            format!(
                                "expected a categorical value in record {}, got {}",
                                i,
                                json_type_name(other)
                            ),
                        ))
                    }
                };

                if let Some(categories) = &spec.categories {
                    if !categories.iter().any(|c| c == &value) {
                        return Err(KolosalError::validation(
                            spec.name.as_str(),
                            format!("unknown category '{}' in record {}", value, i),
                        ));
                    }
                }
                Ok(Some(value))
            })
            .collect::<Result<Vec<Option<String>>>>()?;

        Ok(Series::new(spec.name.as_str().into(), values).into())
    }
}

/// Fetch a feature value, treating absent and null alike and enforcing the optional policy
fn lookup<'r>(spec: &FeatureSpec, index: usize, row: &'r Record) -> Result<Option<&'r Value>> {
    match row.get(&spec.name) {
        None if spec.optional => Ok(None),
        None => Err(KolosalError::validation(
            spec.name.as_str(),
            format!("missing required feature in record {}", index),
        )),
        Some(Value::Null) if spec.optional => Ok(None),
        Some(Value::Null) => Err(KolosalError::validation(
            spec.name.as_str(),
            format!("null value for required feature in record {}", index),
        )),
        Some(value) => Ok(Some(value)),
    }
}
