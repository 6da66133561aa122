//! Database schema migrations.
//!
//! Creates the document catalog, the pgvector-backed chunk table, the sync
//! job singleton, the sync log tables, and the `users_documents` permission
//! mapping. Designed to be run via `dochubctl init`. All statements are
//! idempotent so the command can be re-run safely against an existing
//! database.

use anyhow::Result;
use sqlx::postgres::PgPool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    run_migrations_on(&pool, config.embedding.dims).await?;
    pool.close().await;
    Ok(())
}

pub async fn run_migrations_on(pool: &PgPool, embedding_dims: usize) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;
    sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            source_type TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            stored_filename TEXT NOT NULL UNIQUE,
            storage_path TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes BIGINT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            uploaded_by TEXT,
            chat_id UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let create_vectors = format!(
        r#"
        CREATE TABLE IF NOT EXISTS documents_vectors (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            document_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding vector({dims}) NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE(document_id, chunk_index)
        )
        "#,
        dims = embedding_dims
    );
    sqlx::query(&create_vectors).execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_sync (
            job_name TEXT PRIMARY KEY,
            state TEXT NOT NULL DEFAULT 'idle',
            trigger_source TEXT,
            triggered_by TEXT,
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ,
            runtime_seconds DOUBLE PRECISION,
            result JSONB,
            error TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_logs (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            sync_type TEXT NOT NULL,
            status TEXT NOT NULL,
            documents_total INTEGER NOT NULL DEFAULT 0,
            documents_successful INTEGER NOT NULL DEFAULT 0,
            documents_failed INTEGER NOT NULL DEFAULT 0,
            websites_total INTEGER NOT NULL DEFAULT 0,
            websites_successful INTEGER NOT NULL DEFAULT 0,
            websites_failed INTEGER NOT NULL DEFAULT 0,
            trigger_source TEXT,
            triggered_by TEXT,
            started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            finished_at TIMESTAMPTZ,
            runtime_seconds DOUBLE PRECISION,
            error_message TEXT,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_log_details (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            sync_log_id UUID NOT NULL REFERENCES sync_logs(id) ON DELETE CASCADE,
            item_type TEXT NOT NULL,
            item_url TEXT,
            item_source TEXT,
            document_title TEXT,
            document_filename TEXT,
            document_id UUID,
            status TEXT NOT NULL,
            error_message TEXT,
            file_size BIGINT,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            processed_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users_documents (
            users_id TEXT NOT NULL,
            documents_id UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            PRIMARY KEY (users_id, documents_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source_type ON documents(source_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_chat_id ON documents(chat_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_vectors_document_id ON documents_vectors(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_log_details_sync_log_id ON sync_log_details(sync_log_id)",
    )
    .execute(pool)
    .await?;

    // ivfflat approximate-nearest-neighbor index over the embedding column;
    // requires ANALYZE after bulk loads to pick good list counts.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_vectors_embedding ON documents_vectors \
         USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)",
    )
    .execute(pool)
    .await
    .ok();

    create_hybrid_search_function(pool).await?;

    Ok(())
}

/// Creates (or replaces) `search_hybrid_vectors`, the fallback used when the
/// dense-only candidate set is empty. Fuses cosine distance with a
/// `ts_rank` lexical signal using the same vector-weight contract as the
/// in-process hybrid reranker.
async fn create_hybrid_search_function(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE OR REPLACE FUNCTION search_hybrid_vectors(
            query_embedding vector,
            query_text TEXT,
            vector_weight DOUBLE PRECISION,
            min_similarity DOUBLE PRECISION,
            match_count INTEGER
        )
        RETURNS TABLE (
            id UUID,
            document_id UUID,
            content TEXT,
            metadata JSONB,
            similarity DOUBLE PRECISION,
            lexical_rank DOUBLE PRECISION,
            combined DOUBLE PRECISION
        )
        LANGUAGE sql STABLE AS $$
            SELECT
                dv.id,
                dv.document_id,
                dv.content,
                dv.metadata,
                1 - (dv.embedding <=> query_embedding) AS similarity,
                ts_rank(to_tsvector('simple', dv.content), plainto_tsquery('simple', query_text)) AS lexical_rank,
                vector_weight * (1 - (dv.embedding <=> query_embedding))
                    + (1 - vector_weight) * ts_rank(to_tsvector('simple', dv.content), plainto_tsquery('simple', query_text)) AS combined
            FROM documents_vectors dv
            WHERE 1 - (dv.embedding <=> query_embedding) >= min_similarity
            ORDER BY combined DESC
            LIMIT match_count
        $$;
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
