// ABOUTME: Command implementations for each CLI subcommand
// ABOUTME: Exports dump_schema and reset

pub mod dump_schema;
pub mod reset;

pub use dump_schema::dump_schema;
pub use reset::reset;
