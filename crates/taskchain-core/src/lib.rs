//! # taskchain-core
//!
//! Core crate for taskchain. Contains configuration schemas and the unified
//! error system shared by the queue, the executor pool and the server binary.
//!
//! This crate has **no** internal dependencies on other taskchain crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
