//! Core shared types for tinycluster
//!
//! This crate contains the machine inventory records and the error taxonomy
//! shared by the machine database and the transport adapters built on it.

pub mod error;
pub mod models;

pub use error::{Error, ErrorKind, Result};
pub use models::{Machine, MachineSpec};
