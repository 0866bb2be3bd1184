// Pipeline ingestion: reading delimited tables and binding them to declared source schemas

pub mod schema;
pub mod table;

pub use schema::{BoundTable, ColumnMapping, SchemaRow, SourceSchema};
pub use table::{write_records, RawTable};
