pub mod formatting;
pub mod hashing;

pub use formatting::{format_tag, value_to_column};
