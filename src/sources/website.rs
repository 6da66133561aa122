//! Website crawler: first-party pages come from the official pages API;
//! affiliated microsites are discovered by crawling same-host links and
//! fetching each page's textual content.

use std::collections::{HashSet, VecDeque};

use reqwest::Url;
use scraper::{Html, Selector};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

use crate::config::WebsiteConfig;
use crate::error::{CoreError, CoreResult};
use crate::ingest::{find_by_metadata_field, ingest_document, purge_document, IngestContext, IngestRequest};
use crate::models::{ItemType, SourceType, SyncItemResult};
use crate::sync_logger::SyncLogger;

#[derive(Debug, Clone, Default)]
pub struct WebsitePullSummary {
    pub ingested_urls: Vec<String>,
    pub skipped: usize,
    pub failed: usize,
}

struct CrawledPage {
    url: String,
    title: String,
    locale: Option<String>,
    content: String,
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn extract_visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("body").unwrap();
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

async fn fetch_page_text(client: &reqwest::Client, url: &str) -> CoreResult<String> {
    let resp = client
        .get(url)
        .timeout(std::time::Duration::from_secs(15))
        .send()
        .await
        .map_err(|e| CoreError::Upstream(format!("fetching {url}: {e}")))?;
    if !resp.status().is_success() {
        return Err(CoreError::Upstream(format!("{url} returned {}", resp.status())));
    }
    let html = resp
        .text()
        .await
        .map_err(|e| CoreError::Upstream(format!("reading {url}: {e}")))?;
    Ok(extract_visible_text(&html))
}

async fn collect_first_party_pages(
    client: &reqwest::Client,
    base_url: &str,
    limit: usize,
) -> Vec<CrawledPage> {
    let mut results = Vec::new();
    let mut seen = HashSet::new();

    let parsed = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return results,
    };
    let base_prefix = format!("{}://{}/", parsed.scheme(), parsed.host_str().unwrap_or("www.combiphar.com"));

    let payload: Json = match client
        .get("https://www.combiphar.com/back/api/v1/pages")
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
    {
        Ok(resp) => match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                log::error!("failed to parse Combiphar page list: {e}");
                return results;
            }
        },
        Err(e) => {
            log::error!("failed to fetch Combiphar page list: {e}");
            return results;
        }
    };

    let pages = payload
        .get("data")
        .and_then(|d| d.get("pages"))
        .and_then(|p| p.get("data"))
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default();

    for page in pages {
        if results.len() >= limit {
            break;
        }
        let fallback_title = page.get("title").and_then(Json::as_str).unwrap_or("Combiphar Page").to_string();
        let Some(translations) = page.get("translated_locales").and_then(Json::as_object) else { continue };

        for (locale, translation) in translations {
            if results.len() >= limit {
                break;
            }
            let Some(slug) = translation.get("slug").and_then(Json::as_str) else { continue };
            let title = translation
                .get("title")
                .and_then(Json::as_str)
                .unwrap_or(&fallback_title)
                .to_string();
            let locale_code = locale.to_lowercase();
            let path = if locale_code.is_empty() {
                slug.trim_matches('/').to_string()
            } else {
                format!("{locale_code}/{}", slug.trim_matches('/'))
            };
            let Ok(url) = Url::parse(&base_prefix).and_then(|b| b.join(&path)) else { continue };
            let url = url.to_string();
            if !seen.insert(url.clone()) {
                continue;
            }

            match fetch_page_text(client, &url).await {
                Ok(content) if !content.trim().is_empty() => {
                    results.push(CrawledPage {
                        url,
                        title,
                        locale: Some(locale_code),
                        content,
                    });
                }
                Ok(_) => {}
                Err(e) => log::warn!("skipping {url}: {e}"),
            }
        }
    }

    results
}

async fn discover_generic_site_pages(
    client: &reqwest::Client,
    base_url: &str,
    first_party_host: &str,
    limit: usize,
) -> Vec<CrawledPage> {
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();

    let Ok(base) = Url::parse(base_url) else { return results };
    let host = base.host_str().unwrap_or_default().to_string();
    if host.is_empty() {
        return results;
    }

    queue.push_back(base.clone());
    seen.insert(base.to_string());

    let link_selector = Selector::parse("a[href]").unwrap();
    let discovery_cap = limit * 2;

    while let Some(url) = queue.pop_front() {
        if results.len() >= discovery_cap {
            break;
        }

        let html = match client
            .get(url.as_str())
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => continue,
        };

        let content = extract_visible_text(&html);
        if !content.trim().is_empty() {
            results.push(CrawledPage {
                url: url.to_string(),
                title: url.to_string(),
                locale: None,
                content,
            });
        }

        if results.len() >= discovery_cap {
            break;
        }

        let doc = Html::parse_document(&html);
        for link in doc.select(&link_selector) {
            let Some(href) = link.value().attr("href") else { continue };
            let Ok(next) = url.join(href) else { continue };
            let same_site = next
                .host_str()
                .map(|h| h == host || h.ends_with(first_party_host))
                .unwrap_or(false);
            if !same_site || seen.contains(next.as_str()) {
                continue;
            }
            seen.insert(next.to_string());
            queue.push_back(next);
        }
    }

    if results.is_empty() {
        results.push(CrawledPage {
            url: base.to_string(),
            title: base.to_string(),
            locale: None,
            content: String::new(),
        });
    }

    results.truncate(limit);
    results
}

pub async fn pull_websites(
    ctx: &IngestContext<'_>,
    config: &WebsiteConfig,
    max_pages_per_site: usize,
    logger: Option<&SyncLogger>,
) -> CoreResult<WebsitePullSummary> {
    let client = reqwest::Client::new();
    let mut summary = WebsitePullSummary::default();

    for base_url in &config.base_urls {
        let is_first_party = base_url.contains(&config.first_party_host);
        let pages = if is_first_party {
            collect_first_party_pages(&client, base_url, max_pages_per_site).await
        } else {
            discover_generic_site_pages(&client, base_url, &config.first_party_host, max_pages_per_site).await
        };

        for page in pages {
            if page.content.trim().is_empty() {
                summary.skipped += 1;
                continue;
            }

            let hash = content_hash(&page.content);
            let existing = find_by_metadata_field(ctx.pool, SourceType::Website, "url", &page.url).await?;

            if let Some((existing_id, _, existing_stored)) = &existing {
                let existing_hash = sqlx::query_scalar::<_, Option<String>>(
                    "SELECT metadata->>'content_hash' FROM documents WHERE id = $1",
                )
                .bind(existing_id)
                .fetch_one(ctx.pool)
                .await
                .ok()
                .flatten();

                let vector_count = ctx.vector_store.count_for_stored_filename(existing_stored).await.unwrap_or(0);
                let storage_path = ctx.blob_store.relative_path(SourceType::Website, None, existing_stored);
                let file_present = ctx.blob_store.exists(&storage_path).await;

                if existing_hash.as_deref() == Some(hash.as_str()) && file_present && vector_count > 0 {
                    summary.skipped += 1;
                    continue;
                }

                purge_document(ctx, *existing_id, &storage_path).await.ok();
            }

            let metadata = serde_json::json!({
                "url": page.url,
                "title": page.title,
                "locale": page.locale,
                "source": config.first_party_host,
                "content_hash": hash,
                "last_fetched_at": chrono::Utc::now().to_rfc3339(),
            });

            let request = IngestRequest {
                source_type: SourceType::Website,
                original_filename: format!("{}.txt", slugify(&page.title)),
                bytes: page.content.clone().into_bytes(),
                mime_type: "text/plain".to_string(),
                uploaded_by: None,
                chat_id: None,
                display_name: Some(page.title.clone()),
                extra_metadata: metadata,
            };

            match ingest_document(ctx, request).await {
                Ok(Some(outcome)) => {
                    summary.ingested_urls.push(page.url.clone());
                    if let Some(logger) = logger {
                        logger
                            .record_item(&SyncItemResult {
                                item_type: ItemType::Website,
                                item_url: Some(page.url.clone()),
                                item_source: Some(config.first_party_host.clone()),
                                document_title: Some(page.title.clone()),
                                document_filename: None,
                                document_id: Some(outcome.document_id),
                                success: true,
                                error_message: None,
                                file_size: Some(page.content.len() as i64),
                                metadata: serde_json::json!({ "chunks_written": outcome.chunks_written }),
                            })
                            .await
                            .ok();
                    }
                }
                Ok(None) | Err(_) => {
                    summary.failed += 1;
                    if let Some(logger) = logger {
                        logger
                            .record_item(&SyncItemResult {
                                item_type: ItemType::Website,
                                item_url: Some(page.url.clone()),
                                item_source: Some(config.first_party_host.clone()),
                                document_title: Some(page.title.clone()),
                                document_filename: None,
                                document_id: None,
                                success: false,
                                error_message: Some("ingestion failed or produced no text".to_string()),
                                file_size: None,
                                metadata: serde_json::json!({}),
                            })
                            .await
                            .ok();
                    }
                }
            }
        }
    }

    Ok(summary)
}

fn slugify(value: &str) -> String {
    let slug: String = value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let cleaned: Vec<&str> = slug.split('_').filter(|s| !s.is_empty()).collect();
    if cleaned.is_empty() {
        "page".to_string()
    } else {
        cleaned.join("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_replaces_non_alphanumeric() {
        assert_eq!(slugify("Tentang Kami & Sejarah"), "tentang_kami_sejarah");
    }

    #[test]
    fn slugify_falls_back_when_empty() {
        assert_eq!(slugify("!!!"), "page");
    }

    #[test]
    fn extract_visible_text_strips_tags() {
        let html = "<html><body><h1>Title</h1><p>Hello <b>world</b></p></body></html>";
        let text = extract_visible_text(html);
        assert_eq!(text, "Title Hello world");
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
