//! Identity allocation and its error types

pub mod errors;
pub mod identifiers;
