//! HTTP transport shared by the upstream provider drivers.

mod http;

pub use http::{keyring_api_key, AuthStyle, HttpTransport, TransportConfig};
