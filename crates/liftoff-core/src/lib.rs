//! # liftoff-core
//!
//! Core crate for Liftoff. Contains the configuration schema
//! and the unified error system shared by the plugin runtime
//! and the startup binary.
//!
//! This crate has **no** internal dependencies on other Liftoff crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
