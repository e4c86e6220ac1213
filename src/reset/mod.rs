// ABOUTME: Test database reset module
// ABOUTME: Discovers up migrations and rebuilds each isolated test database slot

pub mod migrations;
pub mod orchestrator;

pub use migrations::discover_up_migrations;
pub use orchestrator::{
    drop_commands, migration_command, reset_slot, reset_test_databases, Phase, ResetSummary,
    SlotReport, StepFailure,
};
