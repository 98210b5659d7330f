#![deny(missing_docs)]

//! Core library for the Rusty Index document pipeline.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text generation client abstraction and adapters.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline run counters.
pub mod metrics;
/// Stages, orchestration, and batch control.
pub mod pipeline;
/// PDF page rasterization.
pub mod raster;
/// Durable per-document ledger.
pub mod registry;
/// Per-document vector index storage.
pub mod vector_store;
