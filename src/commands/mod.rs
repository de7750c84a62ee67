pub mod rule;
pub mod target_help;
pub mod version;
