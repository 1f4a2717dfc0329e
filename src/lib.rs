//! Text Campaign - Contact Ingestion and Outreach Campaigns
//!
//! A Rust library for importing contact lists from CSV uploads, running
//! templated text-message campaigns against them, and tracking delivery of
//! the initial message and its follow-ups.
//!
//! # Features
//!
//! - CSV ingestion with header aliasing and per-upload batches
//! - Batch/row-range targeting with bounded previews
//! - `{placeholder}` templates over standard and custom contact fields
//! - Sequential delivery with per-message failure isolation
//! - Export to multiple formats (TXT, CSV, JSON)

/// Campaign validation and message generation
pub mod campaign;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Outbound message delivery
pub mod delivery;
/// Error types
pub mod error;
/// Message export
pub mod file_writer;
/// CSV ingestion
pub mod ingest;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Template placeholder resolution
pub mod placeholder;
/// Batch and range selection
pub mod planner;
/// Database schema definitions
pub mod schema;
/// Campaign workflows
pub mod service;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::Database;
pub use error::{CampaignError, Result};
pub use models::{Campaign, CampaignMessage, Contact, MessageType, OutputFormat};
pub use service::CampaignService;
