//! CRM Account Enrichment Library
//!
//! Keeps CRM account records current with two kinds of derived data: windowed
//! product-usage signals per organization, and third-party company attributes
//! looked up by website domain.
//!
//! # Modules
//!
//! - `batch_update`: Chunked CRM write-back and run summaries.
//! - `cache`: Namespaced TTL cache with checksummed entries.
//! - `config`: Configuration management.
//! - `constants`: Limits, cache keys and CRM field names.
//! - `crm_client`: Salesforce REST client.
//! - `db`: Database connection and pool management.
//! - `domain`: Website to lookup-domain normalization.
//! - `enrichment_client`: Harmonic company lookups behind a concurrency gate.
//! - `errors`: Error handling types.
//! - `field_mapper`: Signal and profile to CRM record mapping.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `org_mapper`: Cached account and org-mapping snapshots.
//! - `provider_models`: Harmonic wire types.
//! - `task_queue`: Retry policy and cooperative cancellation.
//! - `usage_repository`: Raw usage counts from Postgres.
//! - `usage_signals`: Usage signal computation.
//! - `workflows`: Usage and company enrichment runs.

pub mod batch_update;
pub mod cache;
pub mod config;
pub mod constants;
pub mod crm_client;
pub mod db;
pub mod domain;
pub mod enrichment_client;
pub mod errors;
pub mod field_mapper;
pub mod handlers;
pub mod models;
pub mod org_mapper;
pub mod provider_models;
pub mod task_queue;
pub mod usage_repository;
pub mod usage_signals;
pub mod workflows;
