#![doc = include_str!("../../../README.md")]
//!

//! This crate re-exports the logging library so scripts and the `reggol`
//! command-line tool depend on a single name.

pub use reggol_core::*;
