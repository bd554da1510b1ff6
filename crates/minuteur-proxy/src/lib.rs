//! Minuteur Offline Network Layer
//!
//! This crate provides the request/response model seen by the offline
//! cache manager and the client used to fetch from the application origin.

pub mod client;
pub mod error;
pub mod request;

pub use client::{Fetcher, OriginClient, OriginClientConfig};
pub use error::ProxyError;
pub use request::{Destination, FetchRequest, FetchResponse, ResponseType, is_hop_by_hop};
