// ABOUTME: Schema export module
// ABOUTME: Dumps, parses and re-serializes the database schema in canonical order

pub mod definitions;
pub mod dump;
pub mod parser;
pub mod writer;

pub use definitions::{DefinitionSet, Statement, TableDefinition};
pub use dump::{check_dump_output, dump_command, dump_schema_text};
pub use parser::{classify_block, parse_definitions};
pub use writer::{render, write_atomic};
