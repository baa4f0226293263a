//! Command handlers for x4cat
//!
//! Each subcommand has its own module with handler functions.

pub mod audit;
pub mod configure;
pub mod distill;
pub mod merge;
