//! Columnar tables: materializing records into polars and reading them back.

use polars::prelude::*;

use crate::error::{IntentError, Result};
use crate::schema::{Accessor, Record};

/// Materialize `records` into a [`DataFrame`], one column per schema field in
/// declaration order.
pub fn load_table<R: Record>(records: &[R]) -> Result<DataFrame> {
    let schema = R::schema();
    let mut columns = Vec::with_capacity(schema.len());

    for field in schema.fields() {
        let name = PlSmallStr::from_str(field.name());
        let column = match field.accessor() {
            Accessor::Numeric(get) => {
                let values: Vec<f32> = records.iter().map(get).collect();
                Column::new(name, values)
            }
            Accessor::Boolean(get) => {
                let values: Vec<bool> = records.iter().map(get).collect();
                Column::new(name, values)
            }
            Accessor::Text(get) => {
                let values: Vec<String> = records.iter().map(get).collect();
                Column::new(name, values)
            }
            Accessor::Vector(get) => {
                let values: Vec<Series> = records
                    .iter()
                    .map(|r| Series::new(PlSmallStr::EMPTY, get(r)))
                    .collect();
                Column::from(Series::new(name, values))
            }
        };
        columns.push(column);
    }

    Ok(DataFrame::new(columns)?)
}

/// Read a numeric or boolean column as `f32`. Nulls become `NaN`.
pub(crate) fn f32_column(df: &DataFrame, name: &str) -> Result<Vec<f32>> {
    let column = df.column(name)?;
    if matches!(column.dtype(), DataType::String | DataType::List(_)) {
        return Err(IntentError::TrainingFailed(format!(
            "column '{}' has type {} and cannot be used numerically",
            name,
            column.dtype()
        )));
    }

    let casted = column.as_materialized_series().cast(&DataType::Float32)?;
    let values = casted
        .f32()?
        .into_iter()
        .map(|v| v.unwrap_or(f32::NAN))
        .collect();
    Ok(values)
}

/// Read a text column. Nulls become empty strings.
pub(crate) fn text_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df.column(name)?.as_materialized_series();
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

/// Read a list-of-numbers column as dense rows.
pub(crate) fn vector_column(df: &DataFrame, name: &str) -> Result<Vec<Vec<f32>>> {
    let series = df.column(name)?.as_materialized_series();
    let mut rows = Vec::with_capacity(series.len());

    for item in series.list()?.into_iter() {
        let row = match item {
            Some(inner) => {
                let casted = inner.cast(&DataType::Float32)?;
                casted
                    .f32()?
                    .into_iter()
                    .map(|v| v.unwrap_or(f32::NAN))
                    .collect()
            }
            None => Vec::new(),
        };
        rows.push(row);
    }

    Ok(rows)
}

/// Select rows by position, in the order given.
pub(crate) fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let indices: Vec<IdxSize> = rows.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::from_vec(PlSmallStr::from_static("idx"), indices);
    Ok(df.take(&idx)?)
}
