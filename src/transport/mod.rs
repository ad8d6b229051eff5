//! Wire adapters for [`crate::client::RemoteAiClient`].

pub mod http;

pub use http::HttpRemoteClient;
