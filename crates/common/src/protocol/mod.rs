// Daemon socket protocol: JSON-RPC 2.0 framing and method names.

pub mod jsonrpc;
pub mod rpc_methods;
