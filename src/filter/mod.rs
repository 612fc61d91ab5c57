pub mod types;
pub mod filter;
pub mod filter_where;
pub mod filter_order;
pub mod error;

pub use types::*;
pub use filter::{Filter, CompiledFilter};
pub use error::FilterError;

/// Column and table names are interpolated (quoted) into SQL, so only plain
/// identifiers are accepted.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_column(name: &str) -> Result<(), FilterError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(FilterError::InvalidColumn(name.to_string()))
    }
}
