#![allow(clippy::collapsible_if)]
pub mod cli;
pub mod commands;
pub mod error;
pub mod log;
pub mod target;
