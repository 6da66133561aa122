//! Hybrid (vector + lexical) retrieval with pseudo-relevance feedback,
//! question-echo filtering, and permission-scoped source filtering.
//!
//! This is the largest single component of the crate. The pipeline (see
//! [`retrieve`]) mirrors, step for step, the over-fetch → dedupe → echo
//! filter → MMR pad → PRF mine → BM25 → fuse → floor pipeline described for
//! this subsystem, translated from a Python LangChain retriever into owned
//! Rust data structures with no framework underneath.

use std::collections::{HashMap, HashSet};

use serde_json::Value as Json;
use uuid::Uuid;

use crate::cache::SearchCache;
use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;
use crate::models::{ScoredChunk, SourceType};
use crate::vector_store::VectorStore;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
    "to", "of", "in", "on", "at", "for", "with", "by", "from", "as", "that", "this", "these",
    "those", "it", "its", "what", "which", "who", "whom", "how", "why", "yang", "dan", "atau",
    "di", "ke", "dari", "untuk", "dengan", "pada", "adalah", "ini", "itu", "apa", "bagaimana",
];

const FOLLOWUP_HINTS: &[&str] = &[
    "itu", "tersebut", "nya", "this", "that", "it", "these", "those", "further", "more",
    "lanjut", "lebih",
];

const LABEL_KEYS: &[&str] = &["title", "document_name", "original_filename", "subject", "heading"];

/// Non-admin permission context for scoping retrieval by source type.
#[derive(Debug, Clone)]
pub struct PermissionContext {
    pub is_admin: bool,
    pub is_portal_user: bool,
    pub accessible_portal_document_ids: Vec<Uuid>,
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_informative(token: &str) -> bool {
    token.len() >= 3 && !STOPWORDS.contains(&token)
}

fn normalize_for_overlap(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves the final allowed source-type set per the permission rules:
/// admin bypasses; non-admin portal users are restricted to their mapped
/// documents (dropping `portal` entirely if that mapping is empty);
/// non-portal non-admin users never see `portal`; if filtering empties the
/// requested set, fall back to `{website, admin, user}`.
pub fn resolve_allowed_sources(
    requested: &[SourceType],
    ctx: &PermissionContext,
) -> Vec<SourceType> {
    let requested: Vec<SourceType> = if requested.is_empty() {
        vec![SourceType::Portal, SourceType::Website, SourceType::Admin]
    } else {
        requested.to_vec()
    };

    if ctx.is_admin {
        return requested;
    }

    let mut allowed: Vec<SourceType> = requested
        .into_iter()
        .filter(|s| {
            if *s != SourceType::Portal {
                return true;
            }
            ctx.is_portal_user && !ctx.accessible_portal_document_ids.is_empty()
        })
        .collect();

    if allowed.is_empty() {
        allowed = vec![SourceType::Website, SourceType::Admin, SourceType::User];
    }

    allowed
}

#[derive(Debug, Clone)]
struct Candidate {
    chunk: ScoredChunk,
    doc_key: String,
}

fn doc_key(chunk: &ScoredChunk) -> String {
    if let Some(stored) = chunk.metadata.get("stored_filename").and_then(Json::as_str) {
        return stored.to_string();
    }
    if let Some(source) = chunk.metadata.get("document_source").and_then(Json::as_str) {
        return source.to_string();
    }
    if let Some(source) = chunk.metadata.get("source").and_then(Json::as_str) {
        return source.to_string();
    }
    format!("{}#{}", chunk.document_id, crc32_of(&chunk.content))
}

fn crc32_of(text: &str) -> u32 {
    // Cheap, dependency-free fallback hash used only to key otherwise
    // unlabeled chunks for dedup; not used for anything security-sensitive.
    text.bytes().fold(0x811c9dc5u32, |h, b| {
        (h ^ b as u32).wrapping_mul(0x01000193)
    })
}

fn dedup_by_doc_key(chunks: Vec<ScoredChunk>) -> Vec<Candidate> {
    let mut best: HashMap<String, Candidate> = HashMap::new();
    for chunk in chunks {
        let key = doc_key(&chunk);
        let candidate = Candidate { chunk, doc_key: key.clone() };
        match best.get(&key) {
            Some(existing) if existing.chunk.score >= candidate.chunk.score => {}
            _ => {
                best.insert(key, candidate);
            }
        }
    }
    let mut out: Vec<Candidate> = best.into_values().collect();
    out.sort_by(|a, b| b.chunk.score.partial_cmp(&a.chunk.score).unwrap());
    out
}

/// Drops candidates that merely restate the question.
fn filter_question_echoes(candidates: Vec<Candidate>, question: &str) -> Vec<Candidate> {
    let normalized_question = normalize_for_overlap(question);
    let question_tokens: HashSet<String> = tokenize(question)
        .into_iter()
        .filter(|t| is_informative(t))
        .collect();
    let question_len = normalized_question.len();

    candidates
        .into_iter()
        .filter(|c| {
            if c.chunk
                .metadata
                .get("segment_type")
                .and_then(Json::as_str)
                .map(|s| matches!(s, "question" | "pertanyaan" | "prompt"))
                .unwrap_or(false)
            {
                return false;
            }

            let snippet = normalize_for_overlap(&c.chunk.content);
            let snippet_1024: String = snippet.chars().take(1024).collect();
            let ratio = strsim::normalized_levenshtein(&snippet_1024, &normalized_question) as f32;

            if ratio >= 0.92 && snippet.len() <= question_len + 60 {
                return false;
            }

            let doc_tokens: HashSet<String> = tokenize(&c.chunk.content)
                .into_iter()
                .filter(|t| is_informative(t))
                .collect();
            let coverage = if question_tokens.is_empty() {
                0.0
            } else {
                doc_tokens.intersection(&question_tokens).count() as f32
                    / question_tokens.len() as f32
            };

            if coverage >= 0.90 && doc_tokens.len() <= question_tokens.len() + 3 {
                return false;
            }
            if coverage >= 0.85 && snippet.len() as f32 <= question_len as f32 * 1.2 {
                return false;
            }

            true
        })
        .collect()
}

/// Mines up to `max_terms` expansion terms from the top `max_docs`
/// candidates: `doc_freq_ratio * (1 + tf_normalized)`, with a 1.15x boost
/// for tokens containing a digit.
fn extract_prf_terms(candidates: &[Candidate], question: &str, max_docs: usize, max_terms: usize) -> Vec<String> {
    let question_tokens: HashSet<String> = tokenize(question).into_iter().collect();
    let used_docs: Vec<&Candidate> = candidates.iter().take(max_docs).collect();
    if used_docs.is_empty() {
        return Vec::new();
    }

    let mut doc_freq: HashMap<String, usize> = HashMap::new();
    let mut term_freq: HashMap<String, usize> = HashMap::new();

    for doc in &used_docs {
        let tokens: Vec<String> = tokenize(&doc.chunk.content)
            .into_iter()
            .filter(|t| is_informative(t) && !question_tokens.contains(t))
            .collect();
        let seen: HashSet<String> = tokens.iter().cloned().collect();
        for t in seen {
            *doc_freq.entry(t).or_insert(0) += 1;
        }
        for t in tokens {
            *term_freq.entry(t).or_insert(0) += 1;
        }
    }

    let avg_freq: f32 = if term_freq.is_empty() {
        1.0
    } else {
        term_freq.values().sum::<usize>() as f32 / term_freq.len() as f32
    };

    let mut scored: Vec<(String, f32)> = doc_freq
        .into_iter()
        .map(|(term, d)| {
            let tf = *term_freq.get(&term).unwrap_or(&0) as f32;
            let mut score = (d as f32 / used_docs.len() as f32) * (1.0 + tf / avg_freq.max(1.0));
            if term.bytes().any(|b| b.is_ascii_digit()) {
                score *= 1.15;
            }
            (term, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.into_iter().take(max_terms).map(|(t, _)| t).collect()
}

/// BM25 (k1=1.5, b=0.75, add-one IDF smoothing) over the candidate set
/// only, min-max normalized to `[0, 1]`.
fn bm25_scores(candidates: &[Candidate], query_tokens: &[String]) -> Vec<f32> {
    const K1: f32 = 1.5;
    const B: f32 = 0.75;

    let n = candidates.len();
    if n == 0 || query_tokens.is_empty() {
        return vec![0.0; n];
    }

    let doc_tokens: Vec<Vec<String>> = candidates.iter().map(|c| tokenize(&c.chunk.content)).collect();
    let doc_lens: Vec<f32> = doc_tokens.iter().map(|t| t.len() as f32).collect();
    let avg_len: f32 = doc_lens.iter().sum::<f32>() / n as f32;

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for q in query_tokens {
        let df = doc_tokens
            .iter()
            .filter(|tokens| tokens.contains(q))
            .count();
        doc_freq.insert(q.as_str(), df);
    }

    let mut raw = vec![0.0f32; n];
    for (i, tokens) in doc_tokens.iter().enumerate() {
        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        for t in tokens {
            *term_counts.entry(t.as_str()).or_insert(0) += 1;
        }
        let mut score = 0.0f32;
        for q in query_tokens {
            let tf = *term_counts.get(q.as_str()).unwrap_or(&0) as f32;
            if tf == 0.0 {
                continue;
            }
            let df = *doc_freq.get(q.as_str()).unwrap_or(&0) as f32;
            let idf = (((n as f32 - df + 0.5) / (df + 0.5)) + 1.0).ln().max(0.0);
            let denom = tf + K1 * (1.0 - B + B * doc_lens[i] / avg_len.max(1.0));
            score += idf * (tf * (K1 + 1.0)) / denom.max(f32::EPSILON);
        }
        raw[i] = score;
    }

    min_max_normalize(&raw)
}

fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return values.iter().map(|v| if *v > 0.0 { 1.0 } else { 0.0 }).collect();
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Fuses vector and lexical signals, drops candidates below the similarity
/// floor, and returns the top `k` with scores attached.
fn rerank_hybrid(
    candidates: Vec<Candidate>,
    question: &str,
    prf_terms: &[String],
    config: &RetrievalConfig,
    k: usize,
) -> Vec<ScoredChunk> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let raw_vector_scores: Vec<f32> = candidates.iter().map(|c| c.chunk.vector_similarity).collect();
    let norm_vector = min_max_normalize(&raw_vector_scores);

    let mut query_tokens: Vec<String> = tokenize(question);
    query_tokens.extend(prf_terms.iter().cloned());

    let lexical = bm25_scores(&candidates, &query_tokens);

    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .zip(raw_vector_scores.iter())
        .zip(norm_vector.iter())
        .zip(lexical.iter())
        .filter_map(|(((candidate, raw_vec), norm_vec), lex)| {
            if *raw_vec < config.similarity_floor {
                return None;
            }
            let combined = config.vector_weight * norm_vec + (1.0 - config.vector_weight) * lex;
            let mut chunk = candidate.chunk;
            chunk.vector_similarity = *raw_vec;
            chunk.lexical_score = *lex;
            chunk.combined_score = combined;
            chunk.score = combined;
            Some(chunk)
        })
        .collect();

    scored.sort_by(|a, b| b.combined_score.partial_cmp(&a.combined_score).unwrap());
    scored.truncate(k);
    scored
}

/// Diversifies the candidate pool using maximal marginal relevance against
/// chunks already selected, used to pad results when too few survive the
/// echo filter.
fn mmr_pad(
    pool: &[ScoredChunk],
    already_selected: &[Candidate],
    query_embedding: &[f32],
    embeddings_by_key: &HashMap<String, Vec<f32>>,
    target: usize,
    lambda: f32,
) -> Vec<Candidate> {
    let mut selected: Vec<Candidate> = already_selected.to_vec();
    let mut selected_keys: HashSet<String> = selected.iter().map(|c| c.doc_key.clone()).collect();

    let mut remaining: Vec<ScoredChunk> = pool
        .iter()
        .filter(|c| !selected_keys.contains(&doc_key(c)))
        .cloned()
        .collect();

    while selected.len() < target && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (i, candidate) in remaining.iter().enumerate() {
            let relevance = candidate.vector_similarity;
            let key = doc_key(candidate);
            let max_sim_to_selected = embeddings_by_key
                .get(&key)
                .map(|emb| {
                    selected
                        .iter()
                        .filter_map(|s| embeddings_by_key.get(&s.doc_key))
                        .map(|other| cosine_similarity(emb, other))
                        .fold(0.0f32, f32::max)
                })
                .unwrap_or(0.0);
            let mmr_score = lambda * relevance - (1.0 - lambda) * max_sim_to_selected;
            if mmr_score > best_score {
                best_score = mmr_score;
                best_idx = i;
            }
        }
        let chosen = remaining.remove(best_idx);
        let key = doc_key(&chosen);
        selected_keys.insert(key.clone());
        selected.push(Candidate { chunk: chosen, doc_key: key });
    }

    let _ = query_embedding;
    selected
}

/// Detects whether a question is a likely follow-up: a pronoun/brevity hint
/// or three-or-fewer informative tokens.
fn is_followup_question(question: &str) -> bool {
    let lower = question.to_lowercase();
    if FOLLOWUP_HINTS.iter().any(|h| lower.contains(h)) {
        return true;
    }
    tokenize(question).into_iter().filter(|t| is_informative(t)).count() <= 3
}

/// Builds a refined query by appending up to `max_hints` labels drawn from
/// the top documents plus unused PRF terms.
pub fn refine_question_with_docs(
    question: &str,
    top_docs: &[ScoredChunk],
    prf_terms: &[String],
    max_hints: usize,
) -> String {
    if !is_followup_question(question) {
        return question.to_string();
    }

    let question_lower = question.to_lowercase();
    let mut hints: Vec<String> = Vec::new();

    for doc in top_docs {
        for key in LABEL_KEYS {
            if let Some(label) = doc.metadata.get(*key).and_then(Json::as_str) {
                let label = label.trim();
                if !label.is_empty() && !question_lower.contains(&label.to_lowercase()) {
                    hints.push(label.to_string());
                    break;
                }
            }
        }
        if hints.len() >= max_hints {
            break;
        }
    }

    for term in prf_terms {
        if hints.len() >= max_hints {
            break;
        }
        if !question_lower.contains(&term.to_lowercase()) && !hints.contains(term) {
            hints.push(term.clone());
        }
    }

    if hints.is_empty() {
        return question.to_string();
    }

    let hint_str = hints.join(", ");
    let trimmed = question.trim_end();
    if trimmed.ends_with('?') {
        let stem = trimmed.trim_end_matches('?').trim_end();
        format!("{stem} terkait {hint_str}?")
    } else {
        format!("{question} terkait {hint_str}")
    }
}

pub struct Retriever<'a> {
    pub store: &'a VectorStore,
    pub cache: &'a SearchCache,
    pub config: &'a RetrievalConfig,
}

impl<'a> Retriever<'a> {
    /// Main retrieval pipeline: over-fetch, dedupe, echo-filter, MMR-pad,
    /// mine PRF terms, fuse dense+lexical, floor-filter, return top `k`.
    pub async fn retrieve(
        &self,
        user_id: &str,
        question: &str,
        query_embedding: &[f32],
        k: usize,
        allowed_sources: &[SourceType],
    ) -> crate::error::CoreResult<Vec<ScoredChunk>> {
        let source_names: Vec<String> = allowed_sources.iter().map(|s| s.to_string()).collect();
        if let Some(cached) = self
            .cache
            .get(user_id, question, k, self.config.vector_doc_min_score, &source_names)
        {
            return Ok(cached);
        }

        let base_k = (k * 5).min(80) as i64;
        let mut dense = self
            .store
            .similarity_search(
                query_embedding,
                allowed_sources,
                self.config.vector_doc_min_score,
                base_k,
            )
            .await?;

        if dense.is_empty() {
            dense = self
                .store
                .hybrid_search_fallback(
                    query_embedding,
                    question,
                    self.config.vector_weight,
                    self.config.similarity_floor,
                    base_k,
                )
                .await?;
        }

        let deduped = dedup_by_doc_key(dense);
        let mut filtered = filter_question_echoes(deduped.clone(), question);

        let min_needed = k.max(5);
        if filtered.len() < min_needed {
            let mut embeddings_by_key = HashMap::new();
            for c in &deduped {
                embeddings_by_key
                    .entry(c.doc_key.clone())
                    .or_insert_with(|| c.chunk.embedding.clone());
            }
            let pool: Vec<ScoredChunk> = deduped.iter().map(|c| c.chunk.clone()).collect();
            filtered = mmr_pad(&pool, &filtered, query_embedding, &embeddings_by_key, min_needed, 0.5);
            filtered = filter_question_echoes(filtered, question);
        }

        // PRF mining runs over the surviving (post echo-filter/MMR-pad)
        // candidates, not the raw deduped set, so echoing chunks never
        // contribute expansion terms.
        let prf_terms = extract_prf_terms(&filtered, question, 12, 6);

        let top_docs_for_refinement: Vec<ScoredChunk> =
            filtered.iter().take(5).map(|c| c.chunk.clone()).collect();
        let refined_question = refine_question_with_docs(question, &top_docs_for_refinement, &prf_terms, 3);
        if refined_question != question {
            log::info!("refined follow-up question \"{question}\" -> \"{refined_question}\"");
        }

        let results = rerank_hybrid(filtered, &refined_question, &prf_terms, self.config, k);

        self.cache.put(
            user_id,
            question,
            k,
            self.config.vector_doc_min_score,
            &source_names,
            results.clone(),
        );

        Ok(results)
    }

    /// Attachment retrieval: chunks owned by documents carrying `chat_id`.
    /// When `query_embedding` is given, scores by cosine similarity against
    /// a 0.2 floor and caps the result at `max(50, k_per_file*10)`;
    /// otherwise returns every chunk in `(stored_filename, chunk_index)`
    /// order with a synthetic score of 1.0 so attachments are prioritized
    /// ahead of corpus-wide results when merged by a caller.
    pub async fn retrieve_attachments(
        &self,
        chat_id: Uuid,
        query_embedding: Option<&[f32]>,
        allowed_sources: &[SourceType],
    ) -> crate::error::CoreResult<Vec<ScoredChunk>> {
        const SIMILARITY_THRESHOLD: f32 = 0.2;
        let chunks = self.store.chunks_for_chat(chat_id, allowed_sources).await?;

        let Some(query_embedding) = query_embedding.filter(|e| !e.is_empty()) else {
            return Ok(chunks);
        };

        let k_per_file = chunks.len().max(1);
        let cap = 50.max(k_per_file * 10);

        let mut scored: Vec<ScoredChunk> = chunks
            .into_iter()
            .filter_map(|mut c| {
                let similarity = cosine_similarity(query_embedding, &c.embedding);
                if similarity < SIMILARITY_THRESHOLD {
                    return None;
                }
                c.score = similarity;
                c.vector_similarity = similarity;
                c.combined_score = similarity;
                Some(c)
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        scored.truncate(cap);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(content: &str, similarity: f32, metadata: Json) -> ScoredChunk {
        ScoredChunk {
            document_id: Uuid::new_v4(),
            chunk_index: 0,
            content: content.to_string(),
            metadata,
            score: similarity,
            vector_similarity: similarity,
            lexical_score: 0.0,
            combined_score: similarity,
            embedding: Vec::new(),
        }
    }

    #[test]
    fn tokenize_lowercases_and_splits_on_non_alnum() {
        assert_eq!(tokenize("Product-Code AB12!"), vec!["product", "code", "ab12"]);
    }

    #[test]
    fn resolve_allowed_sources_admin_sees_everything_requested() {
        let ctx = PermissionContext {
            is_admin: true,
            is_portal_user: false,
            accessible_portal_document_ids: vec![],
        };
        let allowed = resolve_allowed_sources(&[SourceType::Portal], &ctx);
        assert_eq!(allowed, vec![SourceType::Portal]);
    }

    #[test]
    fn resolve_allowed_sources_drops_portal_for_non_portal_user() {
        let ctx = PermissionContext {
            is_admin: false,
            is_portal_user: false,
            accessible_portal_document_ids: vec![],
        };
        let allowed = resolve_allowed_sources(&[SourceType::Portal, SourceType::Website], &ctx);
        assert_eq!(allowed, vec![SourceType::Website]);
    }

    #[test]
    fn resolve_allowed_sources_falls_back_when_empty() {
        let ctx = PermissionContext {
            is_admin: false,
            is_portal_user: false,
            accessible_portal_document_ids: vec![],
        };
        let allowed = resolve_allowed_sources(&[SourceType::Portal], &ctx);
        assert_eq!(
            allowed,
            vec![SourceType::Website, SourceType::Admin, SourceType::User]
        );
    }

    #[test]
    fn echo_filter_drops_verbatim_question_restatement() {
        let question = "What is the leave policy for 2024?";
        let candidates = vec![Candidate {
            chunk: chunk(question, 0.9, json!({})),
            doc_key: "a".into(),
        }];
        let filtered = filter_question_echoes(candidates, question);
        assert!(filtered.is_empty());
    }

    #[test]
    fn echo_filter_keeps_substantively_different_content() {
        let question = "What is the leave policy for 2024?";
        let candidates = vec![Candidate {
            chunk: chunk(
                "Employees accrue 12 days of annual leave per calendar year under the 2024 policy revision, with carryover capped at 5 days.",
                0.8,
                json!({}),
            ),
            doc_key: "a".into(),
        }];
        let filtered = filter_question_echoes(candidates, question);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn bm25_scores_rank_exact_term_match_higher() {
        let candidates = vec![
            Candidate { chunk: chunk("product code AB12 dosage info", 0.5, json!({})), doc_key: "a".into() },
            Candidate { chunk: chunk("unrelated text about weather", 0.5, json!({})), doc_key: "b".into() },
        ];
        let scores = bm25_scores(&candidates, &["ab12".to_string()]);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn rerank_hybrid_drops_candidates_below_similarity_floor() {
        let config = RetrievalConfig {
            vector_weight: 0.6,
            similarity_floor: 0.5,
            product_code_similarity_threshold: 0.05,
            vector_doc_min_score: 0.1,
        };
        let candidates = vec![
            Candidate { chunk: chunk("alpha text here", 0.9, json!({})), doc_key: "a".into() },
            Candidate { chunk: chunk("beta text here", 0.1, json!({})), doc_key: "b".into() },
        ];
        let results = rerank_hybrid(candidates, "alpha", &[], &config, 10);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn refine_question_appends_hints_for_followups() {
        let top_docs = vec![chunk("content", 0.9, json!({"title": "Kebijakan Cuti 2024"}))];
        let refined = refine_question_with_docs("jelaskan lebih lanjut", &top_docs, &[], 3);
        assert_eq!(refined, "jelaskan lebih lanjut terkait Kebijakan Cuti 2024");
    }

    #[test]
    fn refine_question_leaves_non_followup_untouched() {
        let top_docs = vec![chunk("content", 0.9, json!({"title": "Some Title"}))];
        let refined = refine_question_with_docs(
            "What is the complete annual leave policy for full-time employees?",
            &top_docs,
            &[],
            3,
        );
        assert_eq!(
            refined,
            "What is the complete annual leave policy for full-time employees?"
        );
    }

    #[test]
    fn prf_terms_boost_digit_containing_tokens() {
        let candidates = vec![
            Candidate { chunk: chunk("the product ab12 ab12 ab12 is available", 0.9, json!({})), doc_key: "a".into() },
            Candidate { chunk: chunk("the product zzzz zzzz zzzz is available", 0.8, json!({})), doc_key: "b".into() },
        ];
        let terms = extract_prf_terms(&candidates, "the product is available", 12, 6);
        assert!(terms.contains(&"ab12".to_string()));
    }
}
