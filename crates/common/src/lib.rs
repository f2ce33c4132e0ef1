// folio-common: shared types and utilities for the Folio workspace

pub mod diff;
pub mod error;
pub mod protocol;
pub mod types;
