//! Source adapters: portal puller, website crawler, and upload handler.
//!
//! Every adapter produces [`crate::ingest::IngestRequest`]s and hands them to
//! [`crate::ingest::ingest_document`] — the adapters differ only in where
//! bytes come from and how they decide a given item is already up to date.

pub mod portal;
pub mod upload;
pub mod website;
