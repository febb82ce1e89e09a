//! Remote tool providers
//!
//! Providers are reached over a persistent connection opened by a
//! [`Connector`]. The [`ProviderPool`] owns those connections, discovers
//! their tools and keeps them healthy.

pub mod http;
pub mod mock;
pub mod pool;
pub mod protocol;

pub use http::{HttpConnection, HttpConnector};
pub use mock::{MockConnector, MockProvider};
pub use pool::{ProviderEntry, ProviderPool, ProviderStatus};
pub use protocol::{
    CLIENT_VERSION, ContentBlock, Connector, PROTOCOL_VERSION, ProviderConnection, ProviderSpec, ToolCallEnvelope,
};
