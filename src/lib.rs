//! mirror-fetch: the fetch and cache engine behind content mirrors.
//!
//! A [`Mirror`] fetches pages, structured data and images for one content
//! source. Requests are throttled per source, tried over plain HTTP first and
//! replayed on a headless browser when that is not enough. Images can be
//! cached on disk and handed back inline or through an ephemeral file server.

pub mod browser;
pub mod cache;
pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod file_server;
pub mod http_client;
pub mod mirror;
pub mod rate_limit;
pub mod transport;
pub mod utils;

pub use cache::ResponseCache;
pub use config::{Settings, SourceOptions};
pub use entity::{EntityBuilder, HashIdGenerator, IdGenerator, LibraryRecord, LibraryStore};
pub use error::{ConfigError, FetchError, TransportError};
pub use file_server::FileServer;
pub use mirror::{FetchResult, ImageReturn, Mirror, MirrorInfo};
pub use transport::{FetchJob, HttpTransport, OutputKind, Payload, RenderTransport};
