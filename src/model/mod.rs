pub mod derived;
pub mod extractor;
pub mod loader;
pub mod row;
pub mod schema;
pub mod tags;
pub mod tree;

pub use derived::{ContentType, DerivedAttributes};
pub use row::{ColumnValue, ExtractedRow};
pub use schema::{AttributeMapping, SchemaRegistry, TableDefinition};
pub use tree::{HierarchyKey, Level};
