// src/process/clean.rs
use anyhow::{bail, Context, Result};
use arrow::{
    array::{ArrayRef, Float64Builder, Int32Array, StringArray},
    record_batch::RecordBatch,
};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

use super::merge::{place_key, StateTable, GEO_ID_COLUMN, NAME_COLUMN, PLACE_COLUMN, STATE_COLUMN};
use crate::config::Config;
use crate::schema::{order_variables, panel_schema};

/// Columns that identify a place rather than measure it.
const IDENTIFIER_COLUMNS: [&str; 4] = [STATE_COLUMN, PLACE_COLUMN, NAME_COLUMN, GEO_ID_COLUMN];

/// Combine every state of one year into the cleaned year table.
///
/// - `place_fips` = `state` + `place`, `NAME` → `place_name`, `state` → `state_fips`
/// - `GEO_ID` and the raw `place` column are dropped
/// - every other column is parsed as `f64`; missing markers and
///   non-numeric text become null
/// - rows are sorted by `place_fips`; variables follow the group list
pub fn clean_year(year: i32, tables: &[StateTable], config: &Config) -> Result<RecordBatch> {
    let mut seen = HashSet::new();
    let mut variables = Vec::new();
    for table in tables {
        for col in table.columns() {
            if !IDENTIFIER_COLUMNS.contains(&col.as_str()) && seen.insert(col.clone()) {
                variables.push(col.clone());
            }
        }
    }
    let variables = order_variables(variables, &config.groups);

    // (place_fips, table, row), sorted so output order never depends on
    // which states were resumed from checkpoints
    let mut entries = Vec::new();
    for (t, table) in tables.iter().enumerate() {
        let state_col = table.column_index(STATE_COLUMN);
        let place_col = table.column_index(PLACE_COLUMN);
        for (r, row) in table.rows().iter().enumerate() {
            let state = state_col.and_then(|c| row[c].as_deref());
            let place = place_col.and_then(|c| row[c].as_deref());
            let key = place_key(state, place).with_context(|| {
                format!(
                    "row {} of state {} has no place identifier",
                    r,
                    table.state_fips()
                )
            })?;
            entries.push((key, t, r));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    if let Some(pair) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
        bail!("place {} appears twice in year {}", pair[0].0, year);
    }

    let text = |name: &str| -> Vec<Option<String>> {
        entries
            .iter()
            .map(|(_, t, r)| {
                let table = &tables[*t];
                table
                    .column_index(name)
                    .and_then(|c| table.rows()[*r][c].clone())
            })
            .collect()
    };

    let place_fips: Vec<String> = entries.iter().map(|(k, _, _)| k.clone()).collect();
    let state_fips: Vec<String> = text(STATE_COLUMN)
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(place_fips)),
        Arc::new(StringArray::from(text(NAME_COLUMN))),
        Arc::new(StringArray::from(state_fips)),
        Arc::new(Int32Array::from(vec![year; entries.len()])),
    ];

    for var in &variables {
        let positions: Vec<Option<usize>> = tables.iter().map(|t| t.column_index(var)).collect();
        let mut b = Float64Builder::with_capacity(entries.len());
        for (_, t, r) in &entries {
            let raw = positions[*t].and_then(|c| tables[*t].rows()[*r][c].as_deref());
            b.append_option(to_number(raw, config));
        }
        columns.push(Arc::new(b.finish()));
    }

    debug!(
        year,
        places = entries.len(),
        variables = variables.len(),
        "cleaned year"
    );
    RecordBatch::try_new(panel_schema(&variables), columns).map_err(Into::into)
}

/// Parse a Census value, treating markers and anything non-numeric as absent.
pub fn to_number(raw: Option<&str>, config: &Config) -> Option<f64> {
    let v: f64 = raw?.trim().parse().ok()?;
    if !v.is_finite() || config.is_missing(v) {
        None
    } else {
        Some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::parse_response;
    use arrow::array::{Array, Float64Array};

    fn config() -> Config {
        let mut cfg = Config::new("k", "unused");
        cfg.groups = vec!["B19083".into(), "B01003".into()];
        cfg
    }

    fn state(year: i32, fips: &str, bodies: &[&str]) -> StateTable {
        let mut table = StateTable::new(year, fips);
        for body in bodies {
            table.merge(parse_response(body).unwrap()).unwrap();
        }
        table
    }

    fn california() -> StateTable {
        state(
            2022,
            "06",
            &[
                r#"[["GEO_ID","NAME","B01003_001E","B01003_001M","state","place"],
                    ["1600000US0667000","San Francisco city, California","808437","-666666666","06","67000"],
                    ["1600000US0644000","Los Angeles city, California","3822238","-555555555","06","44000"]]"#,
                r#"[["GEO_ID","NAME","B19083_001E","B19083_001EA","state","place"],
                    ["1600000US0644000","Los Angeles city, California","0.5234",null,"06","44000"]]"#,
            ],
        )
    }

    fn alabama() -> StateTable {
        state(
            2022,
            "01",
            &[r#"[["GEO_ID","NAME","B01003_001E","B01003_001M","state","place"],
                  ["1600000US0107000","Birmingham city, Alabama","196353","-999999999","01","07000"]]"#],
        )
    }

    fn floats<'a>(batch: &'a RecordBatch, name: &str) -> &'a Float64Array {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
    }

    fn strings<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    #[test]
    fn renames_orders_and_sorts() {
        let batch = clean_year(2022, &[california(), alabama()], &config()).unwrap();

        let names: Vec<_> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "place_fips",
                "place_name",
                "state_fips",
                "year",
                "B19083_001E",
                "B19083_001EA",
                "B01003_001E",
                "B01003_001M"
            ]
        );

        let fips = strings(&batch, "place_fips");
        assert_eq!(fips.value(0), "0107000");
        assert_eq!(fips.value(1), "0644000");
        assert_eq!(fips.value(2), "0667000");
        assert_eq!(strings(&batch, "state_fips").value(1), "06");
        assert_eq!(
            strings(&batch, "place_name").value(0),
            "Birmingham city, Alabama"
        );
    }

    #[test]
    fn sentinels_and_text_become_null() {
        let batch = clean_year(2022, &[california(), alabama()], &config()).unwrap();

        let moe = floats(&batch, "B01003_001M");
        assert!(moe.is_null(0)); // -999999999
        assert_eq!(moe.value(1), -555555555.0);
        assert!(moe.is_null(2)); // -666666666

        let pop = floats(&batch, "B01003_001E");
        assert_eq!(pop.value(1), 3822238.0);

        // absent group for San Francisco and Birmingham
        let gini = floats(&batch, "B19083_001E");
        assert!(gini.is_null(0));
        assert_eq!(gini.value(1), 0.5234);
        assert!(gini.is_null(2));

        for col in batch.columns().iter().skip(4) {
            let arr = col.as_any().downcast_ref::<Float64Array>().unwrap();
            assert!(arr.iter().flatten().all(|v| v != -666666666.0));
        }
    }

    #[test]
    fn no_states_gives_empty_table() {
        let batch = clean_year(2022, &[], &config()).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 4);
    }

    #[test]
    fn to_number_cases() {
        let cfg = config();
        assert_eq!(to_number(Some(" 42 "), &cfg), Some(42.0));
        assert_eq!(to_number(Some("-666666666"), &cfg), None);
        assert_eq!(to_number(Some("-888888888.0"), &cfg), None);
        assert_eq!(to_number(Some("NaN"), &cfg), None);
        assert_eq!(to_number(Some("(X)"), &cfg), None);
        assert_eq!(to_number(None, &cfg), None);
    }
}
