// ABOUTME: Typed errors for the schema export pipeline
// ABOUTME: Distinguishes dump tool failures from unrecognized dump output

use thiserror::Error;

/// Failures that stop a schema export before anything is written
#[derive(Debug, Error)]
pub enum SchemaError {
    /// pg_dump reported an error, or the dump process exited unsuccessfully.
    /// `output` holds everything the process printed.
    #[error("An error occurred while dumping the schema.\n{output}")]
    DumpFailed { output: String },

    /// A collected statement block matched none of the known statement shapes
    #[error("Unknown statement type in dump output:\n{block}")]
    UnrecognizedStatement { block: String },
}
