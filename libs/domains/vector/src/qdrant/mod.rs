mod client;
mod config;
mod payload;

pub use client::{INDEX_RESOURCE, QdrantConnector, QdrantRepository};
pub use config::{DEFAULT_COLLECTION, DEFAULT_QDRANT_URL, QdrantConfig};
