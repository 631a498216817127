//! Proxyhunter - proxy validation engine
//!
//! Takes candidate `host:port` endpoints from arbitrary sources and decides,
//! for each one, whether it is reachable, which proxy protocol it speaks, how
//! much it reveals about the client and how it ranks against the rest of the
//! pool.
//!
//! ## Features
//!
//! - HTTP, SOCKS5 and SOCKS4 detection through real handshakes
//! - Transparent / anonymous / elite classification from echoed headers
//! - Geolocation with a shared cache
//! - Composite quality score from latency, history, anonymity and source
//! - Automatic blacklisting of endpoints that keep failing
//! - Bounded concurrent batches with cancellation
//! - PostgreSQL or in-memory history and blacklist storage
//! - Rotating request session over the working pool

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod repository;
pub mod rotation;
pub mod services;
pub mod validator;

pub use config::Config;
pub use database::Database;
pub use error::{HunterError, Result};
pub use models::{BatchReport, TargetCheck, ValidationResult};
pub use rotation::{ProxySession, RotationStrategy};
pub use validator::Validator;
