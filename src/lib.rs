//! # dochub-core
//!
//! **Document ingestion, embedding, and pgvector-backed hybrid retrieval for
//! a RAG knowledge base.**
//!
//! dochub-core pulls documents from heterogeneous sources (an upstream
//! portal API, affiliated websites, and operator uploads), extracts text
//! from binary formats, chunks and embeds that text into a Postgres/pgvector
//! index, and serves permission-aware hybrid (vector + lexical) retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌────────────┐
//! │  Sources   │──▶│   Ingestion   │──▶│  Postgres   │
//! │ portal/    │   │ extract+chunk │   │ + pgvector  │
//! │ website/   │   │   +embed      │   │             │
//! │ upload     │   └───────────────┘   └─────┬──────┘
//! └────────────┘                             │
//!                        ┌────────────────────┤
//!                        ▼                    ▼
//!                 ┌─────────────┐       ┌────────────┐
//!                 │  Retriever  │       │ Reconciler │
//!                 │ hybrid+PRF  │       │ cleanup/   │
//!                 │             │       │ repair     │
//!                 └─────────────┘       └────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. **Source adapters** ([`sources::portal`], [`sources::website`],
//!    [`sources::upload`]) fetch or accept raw bytes and describe them as an
//!    [`ingest::IngestRequest`].
//! 2. The **ingestion pipeline** ([`ingest`]) places the file in the
//!    [`blob_store`], inserts the catalog row, extracts text ([`extract`]),
//!    splits it into overlapping chunks ([`chunk`]), embeds them
//!    ([`embedding`]), and upserts the vectors ([`vector_store`]). Any
//!    failure after the file is placed rolls the whole item back.
//! 3. The **sync job manager** ([`sync_job`]) guards each source adapter run
//!    behind a singleton claim and records per-item outcomes through the
//!    **sync logger** ([`sync_logger`]).
//! 4. The **retriever** ([`retriever`]) answers questions with a hybrid
//!    dense+lexical search, echo filtering, pseudo-relevance feedback, and
//!    permission-scoped source filtering, backed by an in-process
//!    [`cache`].
//! 5. The **reconciler** ([`reconciler`]) repairs drift between the catalog,
//!    the blob store, and the vector index.
//!
//! ## Quick Start
//!
//! ```bash
//! dochubctl init                     # run migrations
//! dochubctl sync portal              # pull from the document portal
//! dochubctl sync website             # crawl affiliated websites
//! dochubctl upload ./report.pdf --source admin
//! dochubctl search "annual leave policy for 2024"
//! dochubctl reconcile cleanup-orphans
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `Document`, `ScoredChunk`, `SourceType`, sync state |
//! | [`error`] | Typed error taxonomy ([`error::CoreError`]) |
//! | [`db`] | Postgres connection pool |
//! | [`migrate`] | Database schema migrations, including the pgvector index and the hybrid-search SQL function |
//! | [`blob_store`] | On-disk blob storage for ingested files |
//! | [`extract`] | Text extraction dispatch (PDF/DOCX/PPTX/XLSX/plain text/OCR) |
//! | [`chunk`] | Recursive-character text chunker |
//! | [`embedding`] | Embedding provider trait, OpenAI implementation, batching, retry |
//! | [`vector_store`] | pgvector-backed chunk storage and dense similarity search |
//! | [`cache`] | In-process search-result and document-metadata caches |
//! | [`ingest`] | Ingestion pipeline orchestration with rollback on failure |
//! | [`sources`] | Source adapters: portal puller, website crawler, upload handler |
//! | [`sync_job`] | Singleton sync job manager (atomic claim/finalize) |
//! | [`sync_logger`] | Per-run sync logging (header + per-item detail rows) |
//! | [`retriever`] | Hybrid retrieval pipeline with PRF, echo filtering, and permission scoping |
//! | [`reconciler`] | Catalog/blob/vector drift repair |
//!
//! ## Configuration
//!
//! dochub-core is configured via a TOML file. See [`config`] for all
//! available options and [`config::load_config`] for validation rules.

pub mod blob_store;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod reconciler;
pub mod retriever;
pub mod sources;
pub mod sync_job;
pub mod sync_logger;
pub mod vector_store;
