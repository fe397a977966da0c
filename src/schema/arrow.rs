// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef};
use std::sync::Arc;

pub const PLACE_FIPS: &str = "place_fips";
pub const PLACE_NAME: &str = "place_name";
pub const STATE_FIPS: &str = "state_fips";
pub const YEAR: &str = "year";

/// Leading columns of every cleaned year file and of the panel.
pub const ID_COLUMNS: [&str; 4] = [PLACE_FIPS, PLACE_NAME, STATE_FIPS, YEAR];

/// Schema of a cleaned table:
/// - place_fips, place_name, state_fips → Utf8
/// - year                               → Int32
/// - every variable                     → Float64 (nullable)
pub fn panel_schema(variables: &[String]) -> SchemaRef {
    let mut fields = vec![
        ArrowField::new(PLACE_FIPS, DataType::Utf8, false),
        ArrowField::new(PLACE_NAME, DataType::Utf8, true),
        ArrowField::new(STATE_FIPS, DataType::Utf8, false),
        ArrowField::new(YEAR, DataType::Int32, false),
    ];
    fields.extend(
        variables
            .iter()
            .map(|name| ArrowField::new(name, DataType::Float64, true)),
    );
    Arc::new(ArrowSchema::new(fields))
}

/// Schema of a per-state checkpoint: the merged text columns as fetched, then
/// the year stamp.
pub fn checkpoint_schema(columns: &[String]) -> SchemaRef {
    let mut fields: Vec<ArrowField> = columns
        .iter()
        .map(|name| ArrowField::new(name, DataType::Utf8, true))
        .collect();
    fields.push(ArrowField::new(YEAR, DataType::Int32, false));
    Arc::new(ArrowSchema::new(fields))
}

/// The group a variable code belongs to: `B01001_001E` → `B01001`.
pub fn group_of(variable: &str) -> &str {
    variable.split('_').next().unwrap_or(variable)
}

/// Stable-sort variables by the position of their group in `groups`.
/// Variables of unlisted groups go last, in their original order.
pub fn order_variables(mut variables: Vec<String>, groups: &[String]) -> Vec<String> {
    variables.sort_by_key(|v| {
        let group = group_of(v);
        groups
            .iter()
            .position(|g| g == group)
            .unwrap_or(groups.len())
    });
    variables
}
