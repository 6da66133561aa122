//! # dochub-core CLI
//!
//! `dochubctl` drives the document ingestion and retrieval core from the
//! command line: schema migrations, the portal/website/upload source
//! adapters, hybrid search, and reconciliation.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dochub_core::blob_store::BlobStore;
use dochub_core::cache::SearchCache;
use dochub_core::config::{self, RuntimeSettings};
use dochub_core::embedding;
use dochub_core::ingest::IngestContext;
use dochub_core::migrate;
use dochub_core::models::SourceType;
use dochub_core::reconciler;
use dochub_core::retriever::{self, PermissionContext, Retriever};
use dochub_core::sources::portal::{self, EnvTokenProvider};
use dochub_core::sources::upload::{self, UploadRequest};
use dochub_core::sources::website;
use dochub_core::sync_job::SyncJobManager;
use dochub_core::sync_logger::SyncLogger;
use dochub_core::vector_store::VectorStore;

#[derive(Parser)]
#[command(
    name = "dochubctl",
    about = "Document ingestion, embedding, and hybrid retrieval for a RAG knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/dochub.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run schema migrations
    Init,

    /// Pull or accept documents from a source
    Sync {
        #[command(subcommand)]
        source: SyncSource,
    },

    /// Print the current sync job status
    SyncStatus,

    /// Query the hybrid retriever
    Search {
        /// Search query
        query: String,

        /// User id used for cache keying and permission scoping
        #[arg(long, default_value = "cli")]
        user: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 8)]
        k: usize,

        /// Restrict to these source types (repeatable): portal, admin, user, website
        #[arg(long = "source-type")]
        source_types: Vec<String>,

        /// Treat the caller as an admin (bypasses permission scoping)
        #[arg(long)]
        admin: bool,
    },

    /// Upload a file directly
    Upload {
        /// Path to the file to upload
        path: PathBuf,

        /// Source type: admin, user, portal, website
        #[arg(long, default_value = "admin")]
        source: String,

        /// Chat id (required when source=user)
        #[arg(long)]
        chat_id: Option<String>,

        /// Uploader identity recorded on the document row
        #[arg(long)]
        uploaded_by: Option<String>,
    },

    /// Repair drift between the catalog, blob store, and vector index
    Reconcile {
        #[command(subcommand)]
        action: ReconcileAction,
    },
}

#[derive(Subcommand)]
enum SyncSource {
    /// Pull published documents from the portal
    Portal,
    /// Crawl configured websites
    Website,
}

#[derive(Subcommand)]
enum ReconcileAction {
    /// Delete blob-store files with no catalog row
    CleanupOrphans {
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-ingest catalog rows missing a file or vectors, and adopt orphan files
    EmbedRepair {
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = dochub_core::db::connect(&cfg).await?;
    let blob_store = BlobStore::new(cfg.blob_store.root.clone());
    let vector_store = VectorStore::new(pool.clone());
    let cache = SearchCache::new();
    let embedding_provider = embedding::create_provider(&cfg.embedding)?;

    let ctx = IngestContext {
        pool: &pool,
        blob_store: &blob_store,
        vector_store: &vector_store,
        cache: &cache,
        embedding_provider: embedding_provider.as_ref(),
        embedding_config: &cfg.embedding,
        chunking_config: &cfg.chunking,
        ocr_config: &cfg.ocr,
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }

        Commands::Sync { source } => {
            let job = SyncJobManager::new(pool.clone(), cfg.sync.job_name.clone());
            let sync_type = match source {
                SyncSource::Portal => "portal",
                SyncSource::Website => "website",
            };

            let (executed, status) = job
                .run_blocking("cli", Some("dochubctl"), || async {
                    let logger = SyncLogger::start(pool.clone(), sync_type, "cli", Some("dochubctl")).await?;

                    let outcome = match source {
                        SyncSource::Portal => {
                            portal::pull_portal_documents(&ctx, &cfg.portal, &EnvTokenProvider, Some(&logger)).await
                        }
                        SyncSource::Website => {
                            website::pull_websites(&ctx, &cfg.website, cfg.sync.max_pages_per_site, Some(&logger))
                                .await
                        }
                    };

                    let error_message = outcome.as_ref().err().map(|e| e.to_string());
                    let result = logger.finish(error_message.as_deref()).await?;
                    let state = match result["status"].as_str() {
                        Some("success") => "succeeded",
                        Some("partial") => "partial_success",
                        _ => "failed",
                    };
                    Ok((state.to_string(), result))
                })
                .await?;

            if !executed {
                println!("sync skipped: another run is active");
            } else {
                println!("sync finished: {}", serde_json::to_string_pretty(&status)?);
            }
        }

        Commands::SyncStatus => {
            let job = SyncJobManager::new(pool.clone(), cfg.sync.job_name.clone());
            match job.status().await? {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => println!("no sync has run yet"),
            }
        }

        Commands::Search { query, user, k, source_types, admin } => {
            let embedding_query = embedding::embed_query(embedding_provider.as_ref(), &cfg.embedding, &query).await?;

            let requested: Vec<SourceType> = source_types
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            let perm_ctx = PermissionContext {
                is_admin: admin,
                is_portal_user: false,
                accessible_portal_document_ids: vec![],
            };
            let allowed = retriever::resolve_allowed_sources(&requested, &perm_ctx);

            let retriever_svc = Retriever { store: &vector_store, cache: &cache, config: &cfg.retrieval };
            let results = retriever_svc.retrieve(&user, &query, &embedding_query, k, &allowed).await?;

            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        Commands::Upload { path, source, chat_id, uploaded_by } => {
            let bytes = tokio::fs::read(&path).await?;
            let original_filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "upload.bin".to_string());
            let mime_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();
            let source_type: SourceType = source.parse()?;

            let request = UploadRequest {
                source_type,
                original_filename,
                bytes,
                mime_type,
                uploaded_by,
                chat_id_str: chat_id,
                extra_metadata: serde_json::json!({}),
            };

            let runtime_settings = RuntimeSettings { attachment_enabled: true, ..Default::default() };
            match upload::handle_upload(&ctx, &cfg.upload, &runtime_settings, request).await? {
                Some(outcome) => println!("uploaded: {} ({} chunks)", outcome.stored_filename, outcome.chunks_written),
                None => println!("upload accepted but no text could be extracted"),
            }
        }

        Commands::Reconcile { action } => match action {
            ReconcileAction::CleanupOrphans { dry_run } => {
                let report = reconciler::cleanup_orphans(&ctx, dry_run).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            ReconcileAction::EmbedRepair { dry_run } => {
                let report = reconciler::embed_repair(&ctx, dry_run).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        },
    }

    pool.close().await;
    Ok(())
}
