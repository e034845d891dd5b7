pub mod capability;
pub mod config;
pub mod prompt;
pub mod providers;
pub mod proxy;
pub mod server;

#[cfg(test)]
mod testing;

pub use capability::{ImageModel, ModelOutput, ModelRequest};
pub use config::ProxyConfig;
pub use proxy::{GenerationError, GenerationProxy, ProxyReply, RequestTicket};
pub use server::{router, serve, ServerState};
