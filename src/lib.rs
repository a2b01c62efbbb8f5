//! `featureserver-http` is an async client for paginated ArcGIS
//! FeatureServer layers under server-imposed rate and concurrency limits.
//!
//! A fetch runs in three steps:
//! - a count-only query discovers how many records match,
//! - offsets are planned from the page size and the optional record cap,
//! - pages are requested one at a time through the retry engine.
//!
//! Every HTTP call passes through an [`AdmissionController`] that bounds
//! in-flight requests and spaces dispatches, and failures are classified
//! into [`GisError`] to decide whether to retry.
//!
//! Entry points:
//! - [`GisClient::fetch_pages`]
//! - [`GisClient::fetch_layer`]
//! - [`GisClient::fetch_record_count`]

mod admission;
mod classify;
mod client;
mod error;
mod geometry;
mod options;
mod pagination;
mod request;
mod retry;
mod types;
mod wire;

pub use admission::{AdmissionController, AdmissionPermit};
pub use classify::MAX_BODY_EXCERPT_CHARS;
pub use client::GisClient;
pub use error::{GisError, TimeoutPhase};
pub use geometry::{BoundingBox, WGS84_WKID};
pub use options::{
    ClientConfig, ClientConfigBuilder, ConnectionLimits, Pagination, RateLimit, RetryPolicy,
    Timeouts, DEFAULT_USER_AGENT,
};
pub use pagination::page_count;
pub use request::{LayerQuery, PageRequest, QueryParams};
pub use retry::{backoff_delay, RetryEngine};
pub use types::{FeatureCollection, FeaturePage, LayerField, ServiceEntry};

pub type Result<T> = std::result::Result<T, GisError>;
