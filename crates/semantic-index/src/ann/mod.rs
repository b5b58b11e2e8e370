pub mod builder;
pub mod hnsw;
pub mod manifest;
