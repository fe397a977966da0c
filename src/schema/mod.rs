pub mod arrow;
pub mod dictionary;

pub use self::arrow::{checkpoint_schema, order_variables, panel_schema, ID_COLUMNS};
pub use dictionary::VariableDictionary;
