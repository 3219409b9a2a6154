//! Client side of the Git smart-HTTP protocol: pkt-line framing,
//! capability negotiation, discovery, fetch with side-band
//! demultiplexing, push with status reporting, and the transport/auth
//! contracts the host fulfils.

pub mod http;
pub mod pkt;
pub mod smart;
pub mod types;

pub use http::{AuthScheme, AuthedTransport, CredentialResolver, HttpRequest, HttpResponse, HttpTransport};
pub use smart::{FetchPackOptions, PushReport, RefUpdateCommand, SmartHttpClient};
pub use types::{CapabilitySet, RefDiscovery, RemoteRef, ServiceType};
