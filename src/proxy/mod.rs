pub mod forwarder;

pub use forwarder::{ForwardedResponse, Upstream, UpstreamForwarder};
