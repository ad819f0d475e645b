pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result, WriteStep};
pub use types::{ColumnValues, Row, column_value, column_values, set_column_value};
pub use value::Value;
