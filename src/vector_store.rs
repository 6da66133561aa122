//! pgvector-backed chunk storage and dense similarity search.
//!
//! Owns the `documents_vectors` table. Upserts are idempotent on
//! `(document_id, chunk_index)`; dense search joins back to `documents` for
//! permission scoping and fixed source-type ordering.

use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{ScoredChunk, SourceType, VectorChunk};

#[derive(Debug, Clone)]
pub struct VectorStoreStats {
    pub total_chunks: i64,
    pub distinct_documents: i64,
    pub dims: usize,
}

pub struct VectorStore {
    pool: PgPool,
}

impl VectorStore {
    pub fn new(pool: PgPool) -> Self {
        VectorStore { pool }
    }

    pub async fn upsert(&self, chunks: &[VectorChunk]) -> CoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let embedding = pgvector::Vector::from(chunk.embedding.clone());
            sqlx::query(
                r#"
                INSERT INTO documents_vectors (document_id, chunk_index, content, embedding, metadata, updated_at)
                VALUES ($1, $2, $3, $4, $5, now())
                ON CONFLICT (document_id, chunk_index) DO UPDATE SET
                    content = excluded.content,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata,
                    updated_at = now()
                "#,
            )
            .bind(chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(embedding)
            .bind(&chunk.metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_by_document(&self, document_id: Uuid) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM documents_vectors WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes chunks whose metadata contains `key = value` (JSONB `@>` containment).
    pub async fn delete_by_metadata(&self, key: &str, value: &str) -> CoreResult<u64> {
        let filter = serde_json::json!({ key: value });
        let result = sqlx::query("DELETE FROM documents_vectors WHERE metadata @> $1")
            .bind(filter)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM documents_vectors")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self, dims: usize) -> CoreResult<VectorStoreStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT document_id) AS docs FROM documents_vectors",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(VectorStoreStats {
            total_chunks: row.get("total"),
            distinct_documents: row.get("docs"),
            dims,
        })
    }

    pub async fn count_for_stored_filename(&self, stored_filename: &str) -> CoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM documents_vectors dv \
             JOIN documents d ON d.id = dv.document_id \
             WHERE d.stored_filename = $1",
        )
        .bind(stored_filename)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Dense similarity search, joined to the catalog and permission-scoped.
    /// `allowed_sources` must already be resolved by the caller (see
    /// `retriever::resolve_allowed_sources`); this function does not apply
    /// the empty-set fallback itself.
    pub async fn similarity_search(
        &self,
        query_embedding: &[f32],
        allowed_sources: &[SourceType],
        min_similarity: f32,
        limit: i64,
    ) -> CoreResult<Vec<ScoredChunk>> {
        if allowed_sources.is_empty() {
            return Ok(Vec::new());
        }
        let source_strs: Vec<&'static str> =
            allowed_sources.iter().map(|s| s.as_str()).collect();
        let embedding = pgvector::Vector::from(query_embedding.to_vec());

        let rows = sqlx::query(
            r#"
            SELECT
                dv.document_id,
                dv.chunk_index,
                dv.content,
                dv.metadata,
                dv.embedding,
                d.source_type,
                1 - (dv.embedding <=> $1) AS similarity
            FROM documents_vectors dv
            JOIN documents d ON d.id = dv.document_id
            WHERE d.source_type = ANY($2)
              AND 1 - (dv.embedding <=> $1) >= $3
            ORDER BY
                CASE d.source_type
                    WHEN 'portal' THEN 0
                    WHEN 'website' THEN 1
                    WHEN 'admin' THEN 2
                    WHEN 'user' THEN 3
                    ELSE 4
                END,
                1 - (dv.embedding <=> $1) DESC
            LIMIT $4
            "#,
        )
        .bind(&embedding)
        .bind(&source_strs)
        .bind(min_similarity)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out: Vec<(SourceType, ScoredChunk)> = rows
            .into_iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                let embedding: pgvector::Vector = row.get("embedding");
                let source_type: String = row.get("source_type");
                let source_type: SourceType = source_type.parse().unwrap_or(SourceType::User);
                let chunk = ScoredChunk {
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    metadata: row.get::<Json, _>("metadata"),
                    score: similarity as f32,
                    vector_similarity: similarity as f32,
                    lexical_score: 0.0,
                    combined_score: similarity as f32,
                    embedding: embedding.to_vec(),
                };
                (source_type, chunk)
            })
            .collect();

        // The SQL ORDER BY already applies this ordering (needed so LIMIT
        // keeps the right rows); re-sort here too so the fixed source-type
        // preference is enforced by `SourceType::rank()` itself rather than
        // only by a hand-duplicated SQL CASE expression.
        out.sort_by(|(a_src, a_chunk), (b_src, b_chunk)| {
            a_src
                .rank()
                .cmp(&b_src.rank())
                .then_with(|| b_chunk.vector_similarity.partial_cmp(&a_chunk.vector_similarity).unwrap())
        });

        Ok(out.into_iter().map(|(_, chunk)| chunk).collect())
    }

    /// All chunks owned by documents carrying `chat_id`, optionally
    /// restricted to `allowed_sources`, ordered by `(stored_filename,
    /// chunk_index)`. Used by attachment retrieval, which re-scores (or not)
    /// on top of this fixed order.
    pub async fn chunks_for_chat(
        &self,
        chat_id: Uuid,
        allowed_sources: &[SourceType],
    ) -> CoreResult<Vec<ScoredChunk>> {
        let rows = if allowed_sources.is_empty() {
            sqlx::query(
                r#"
                SELECT dv.document_id, dv.chunk_index, dv.content, dv.metadata, dv.embedding
                FROM documents_vectors dv
                JOIN documents d ON d.id = dv.document_id
                WHERE d.chat_id = $1
                ORDER BY d.stored_filename, dv.chunk_index
                "#,
            )
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?
        } else {
            let source_strs: Vec<&'static str> = allowed_sources.iter().map(|s| s.as_str()).collect();
            sqlx::query(
                r#"
                SELECT dv.document_id, dv.chunk_index, dv.content, dv.metadata, dv.embedding
                FROM documents_vectors dv
                JOIN documents d ON d.id = dv.document_id
                WHERE d.chat_id = $1 AND d.source_type = ANY($2)
                ORDER BY d.stored_filename, dv.chunk_index
                "#,
            )
            .bind(chat_id)
            .bind(&source_strs)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows
            .into_iter()
            .map(|row| {
                let embedding: pgvector::Vector = row.get("embedding");
                ScoredChunk {
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    metadata: row.get::<Json, _>("metadata"),
                    score: 1.0,
                    vector_similarity: 0.0,
                    lexical_score: 0.0,
                    combined_score: 1.0,
                    embedding: embedding.to_vec(),
                }
            })
            .collect())
    }

    /// Fallback when the dense-only candidate set is empty: calls the
    /// `search_hybrid_vectors` SQL function created by the migration.
    pub async fn hybrid_search_fallback(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        vector_weight: f32,
        min_similarity: f32,
        limit: i64,
    ) -> CoreResult<Vec<ScoredChunk>> {
        let embedding = pgvector::Vector::from(query_embedding.to_vec());
        let rows = sqlx::query(
            "SELECT document_id, content, metadata, similarity, lexical_rank, combined \
             FROM search_hybrid_vectors($1, $2, $3, $4, $5)",
        )
        .bind(&embedding)
        .bind(query_text)
        .bind(vector_weight as f64)
        .bind(min_similarity as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(format!("hybrid_search_fallback: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                let lexical: f64 = row.get("lexical_rank");
                let combined: f64 = row.get("combined");
                ScoredChunk {
                    document_id: row.get("document_id"),
                    chunk_index: 0,
                    content: row.get("content"),
                    metadata: row.get::<Json, _>("metadata"),
                    score: combined as f32,
                    vector_similarity: similarity as f32,
                    lexical_score: lexical as f32,
                    combined_score: combined as f32,
                    embedding: Vec::new(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_source_rank_outranks_higher_similarity_from_a_lower_priority_source() {
        // A website hit with higher raw similarity must still sort after a
        // portal hit with lower similarity: rank is the primary sort key.
        let mut rows: Vec<(SourceType, f32)> =
            vec![(SourceType::Website, 0.95), (SourceType::Portal, 0.10)];
        rows.sort_by(|(a_src, a_sim), (b_src, b_sim)| {
            a_src.rank().cmp(&b_src.rank()).then_with(|| b_sim.partial_cmp(a_sim).unwrap())
        });
        assert_eq!(rows[0].0, SourceType::Portal);
        assert_eq!(rows[1].0, SourceType::Website);
    }

    #[test]
    fn fixed_source_rank_breaks_ties_by_similarity_within_same_source() {
        let mut rows: Vec<(SourceType, f32)> =
            vec![(SourceType::Admin, 0.2), (SourceType::Admin, 0.8)];
        rows.sort_by(|(a_src, a_sim), (b_src, b_sim)| {
            a_src.rank().cmp(&b_src.rank()).then_with(|| b_sim.partial_cmp(a_sim).unwrap())
        });
        assert_eq!(rows[0].1, 0.8);
        assert_eq!(rows[1].1, 0.2);
    }
}
