//! Public facade crate for `mailtriage`.
//!
//! This crate contains no IO or provider-specific logic.
//! It re-exports the backend-agnostic types/traits from `mailtriage-core`.

pub use mailtriage_core::*;
