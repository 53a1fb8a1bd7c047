//! Food desert resilience analysis.
//!
//! Joins per-tract model results with food-access attributes, classifies
//! tracts against percentile cutoffs and aggregates them by categorical
//! keys. The [`reports`] module holds the fixed workflows built on top.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod error;
pub mod join;
pub mod output;
pub mod parser;
pub mod quality;
pub mod reports;
pub mod stats;
pub mod table;
pub mod tract;
pub mod twins;
