// src/process/concat.rs
use anyhow::{bail, Context, Result};
use arrow::{
    array::{new_null_array, Array, ArrayRef, Int32Array, StringArray},
    compute::{cast, concat_batches},
    record_batch::RecordBatch,
};
use std::collections::HashSet;

use crate::schema::arrow::{PLACE_FIPS, YEAR};
use crate::schema::{order_variables, panel_schema, ID_COLUMNS};

/// Stack cleaned tables row-wise over the union of their columns.
///
/// Variables missing from a table are filled with nulls. Variable order is
/// first appearance across `batches`, then stable-sorted by `groups`, so
/// `concat(concat(a, b), c)` and `concat(a, b, c)` agree.
pub fn concat_union(batches: &[RecordBatch], groups: &[String]) -> Result<RecordBatch> {
    let mut seen = HashSet::new();
    let mut variables = Vec::new();
    for batch in batches {
        for field in batch.schema().fields() {
            let name = field.name();
            if !ID_COLUMNS.contains(&name.as_str()) && seen.insert(name.clone()) {
                variables.push(name.clone());
            }
        }
    }
    let schema = panel_schema(&order_variables(variables, groups));

    let mut aligned = Vec::with_capacity(batches.len());
    for batch in batches {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let column = match batch.column_by_name(field.name()) {
                Some(col) if col.data_type() == field.data_type() => col.clone(),
                Some(col) => cast(col, field.data_type())
                    .with_context(|| format!("casting column {}", field.name()))?,
                None if field.is_nullable() => {
                    new_null_array(field.data_type(), batch.num_rows())
                }
                None => bail!("table is missing required column {}", field.name()),
            };
            columns.push(column);
        }
        aligned.push(RecordBatch::try_new(schema.clone(), columns)?);
    }

    concat_batches(&schema, &aligned).context("concatenating tables")
}

/// Fail if any `(place_fips, year)` pair occurs more than once.
pub fn ensure_unique_keys(batch: &RecordBatch) -> Result<()> {
    let fips = batch
        .column_by_name(PLACE_FIPS)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .context("place_fips must be a text column")?;
    let years = batch
        .column_by_name(YEAR)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .context("year must be an Int32 column")?;

    let mut seen = HashSet::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if !seen.insert((fips.value(i), years.value(i))) {
            bail!(
                "duplicate panel row for place {} in {}",
                fips.value(i),
                years.value(i)
            );
        }
    }
    Ok(())
}
