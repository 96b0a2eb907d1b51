//! HTTP adapters for the claims collaborator.

pub mod actors;
pub mod claims;
pub mod client;
pub mod session;
pub mod wire;

pub use actors::HttpActorDirectory;
pub use claims::HttpClaimStore;
pub use client::{ApiClient, ClientBuildError};
pub use session::Session;
