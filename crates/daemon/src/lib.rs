// folio-daemon library entry point.

pub mod config;
pub mod lock;
pub mod rpc;
pub mod runtime;
pub mod security;
pub mod service;
pub mod startup;
pub mod store;
