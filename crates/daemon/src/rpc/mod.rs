// JSON-RPC server: method dispatch over Unix socket + HTTP facade.

pub mod http;
pub mod methods;
pub mod unix;
