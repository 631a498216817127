//! Proxy validation engine
//!
//! Every candidate runs through the same stages: blacklist gate, TCP probe,
//! protocol detection, IP reveal and anonymity analysis for HTTP proxies,
//! geolocation, scoring and finally blacklist feedback. [`Validator`] runs
//! many candidates at once over a bounded pool.

pub mod anonymity;
pub mod detect;
pub mod echo;
pub mod feedback;
pub mod geo;
pub mod http;
pub mod normalizer;
pub mod orchestrator;
pub mod pipeline;
pub mod probe;
pub mod public_ip;
pub mod retry;
pub mod scorer;
pub mod socks;
pub mod target;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use anonymity::{AnonymityPolicy, AnonymityReport};
pub use echo::EchoEndpoint;
pub use geo::{GeoLookup, GeoResolver, HttpGeoLookup};
pub use http::HttpClient;
pub use orchestrator::Validator;
pub use pipeline::Pipeline;
pub use public_ip::{HttpPublicIpSource, PublicIpCache, PublicIpSource};
pub use target::{check_target, check_target_url};
pub use transport::{Connector, ProxyStream, TcpConnector};
