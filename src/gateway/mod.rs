//! Network surfaces: the ext_proc gRPC listener and the HTTP router

pub mod http;
mod server;

pub use server::Gateway;
