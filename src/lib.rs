//! # knowledge-rag
//!
//! Workspace-isolated retrieval-augmented knowledge search.
//!
//! The crate combines a vector index with a relational fallback: searches
//! embed the query, ask the index for nearest neighbors, and re-validate
//! every candidate against the relational store — the sole authority for
//! identity and tenancy — before scoring, thresholding, and ranking.
//! A document pipeline feeds the stores: text extraction from uploaded
//! files plus best-effort AI enrichment (summary, keywords, embedding).
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐    ┌──────────────┐    ┌───────────────┐
//! │  Files    │──▶│  Processor    │──▶│  RecordStore   │ (source of truth)
//! │ PDF/DOCX/ │    │ extract+AI   │    │  SQLite        │
//! │ HTML/...  │    └──────┬───────┘    └───────┬───────┘
//! └───────────┘           │ best-effort        │ re-validate
//!                         ▼                    │ every hit
//!                  ┌──────────────┐            │
//!                  │ VectorIndex  │◀───────────┘
//!                  │ (cache only) │     RagService::search_documents
//!                  └──────────────┘
//! ```
//!
//! ## Failure posture
//!
//! | Subsystem | On failure |
//! |-----------|-----------|
//! | Embedding provider | propagate — no fallback can rank without a vector |
//! | Vector index | log + relational fallback, never surfaced |
//! | Record store | propagate — it is the system of record |
//! | Enrichment (summary/keywords) | field left absent, others still run |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Retrieval error taxonomy |
//! | [`embedding`] | Embedding provider abstraction + vector math |
//! | [`index`] | Vector index abstraction (REST + in-memory) |
//! | [`store`] | Record store abstraction |
//! | [`store_sqlite`] | SQLite record store |
//! | [`store_memory`] | In-memory record store |
//! | [`rag`] | Retrieval core: search, store, delete, context |
//! | [`extract`] | Multi-format text extraction |
//! | [`chunk`] | Truncation and chunking boundaries |
//! | [`generate`] | Chat-model abstraction for enrichment |
//! | [`processor`] | Document processing pipeline |
//! | [`ingest`] | Ingestion lifecycle orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod processor;
pub mod rag;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
