//! `fieldops-core` — shared building blocks of the access engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod operation;

pub use error::{DomainError, DomainResult, FieldViolation};
pub use id::{RecordId, UserId};
pub use operation::Operation;
