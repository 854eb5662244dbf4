//! Foundation types for isoctl.
//!
//! This crate contains the types shared by every isoctl crate: the severity
//! table, message records, the error enum, and the policy settings.

pub mod config;
pub mod error;
pub mod message;
pub mod severity;
