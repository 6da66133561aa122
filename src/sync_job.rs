//! Sync job manager: a singleton `document_sync` row used to prevent two
//! sync runs from overlapping and to expose run status to callers.
//!
//! Claiming is a single atomic `UPDATE ... WHERE state != 'running'`; the
//! caller that flips zero rows lost the race and must not run.

use std::future::Future;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use tokio::task::JoinHandle;

use crate::error::CoreResult;
use crate::models::SyncJobStatus;

/// Process-wide handle to whatever run `trigger` last spawned, so a second
/// `trigger` call can tell a live background run apart from a finished one
/// without touching the database. One job per process, same as the
/// singleton `document_sync` row this module guards.
fn active_run_slot() -> &'static Mutex<Option<JoinHandle<()>>> {
    static ACTIVE_RUN: OnceLock<Mutex<Option<JoinHandle<()>>>> = OnceLock::new();
    ACTIVE_RUN.get_or_init(|| Mutex::new(None))
}

#[derive(Clone)]
pub struct SyncJobManager {
    pool: PgPool,
    job_name: String,
}

impl SyncJobManager {
    pub fn new(pool: PgPool, job_name: impl Into<String>) -> Self {
        SyncJobManager { pool, job_name: job_name.into() }
    }

    /// Attempts to claim the job row, inserting it on first use. Returns
    /// `true` if this caller now owns the run.
    pub async fn claim(&self, trigger_source: &str, triggered_by: Option<&str>) -> CoreResult<bool> {
        sqlx::query(
            "INSERT INTO document_sync (job_name, state) VALUES ($1, 'idle') \
             ON CONFLICT (job_name) DO NOTHING",
        )
        .bind(&self.job_name)
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE document_sync SET
                state = 'running',
                trigger_source = $2,
                triggered_by = $3,
                started_at = now(),
                finished_at = NULL,
                runtime_seconds = NULL,
                result = NULL,
                error = NULL,
                updated_at = now()
            WHERE job_name = $1 AND state != 'running'
            "#,
        )
        .bind(&self.job_name)
        .bind(trigger_source)
        .bind(triggered_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Starts `run` in the background unless a run is already active, and
    /// returns immediately. `run` resolves to the final `document_sync`
    /// state (`succeeded`, `failed`, or `partial_success`) and the result
    /// payload to persist. `started=false` means another run already owns
    /// the job, either the in-process task from an earlier `trigger` or a
    /// claim held by another process; the returned status is the current
    /// snapshot either way.
    pub async fn trigger<F, Fut>(
        &self,
        trigger_source: &str,
        triggered_by: Option<&str>,
        run: F,
    ) -> CoreResult<(bool, SyncJobStatus)>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<(String, Json)>> + Send + 'static,
    {
        {
            let mut slot = active_run_slot().lock().unwrap();
            if let Some(handle) = slot.as_ref() {
                if !handle.is_finished() {
                    return Ok((false, self.status_or_idle().await?));
                }
            }
            *slot = None;
        }

        if !self.claim(trigger_source, triggered_by).await? {
            return Ok((false, self.status_or_idle().await?));
        }

        let manager = self.clone();
        let handle = tokio::task::spawn(async move {
            let (state, result, error) = match run().await {
                Ok((state, result)) => (state, result, None),
                Err(e) => ("failed".to_string(), Json::Null, Some(e.to_string())),
            };
            if let Err(e) = manager.finalize(&state, result, error.as_deref()).await {
                log::error!("sync job: failed to finalize background run: {e}");
            }
        });
        *active_run_slot().lock().unwrap() = Some(handle);

        Ok((true, self.status_or_idle().await?))
    }

    /// Runs `run` inline, guarded by the same claim as `trigger`. Returns
    /// `executed=false` without running `run` if another run (background or
    /// otherwise) already holds the claim.
    pub async fn run_blocking<F, Fut>(
        &self,
        trigger_source: &str,
        triggered_by: Option<&str>,
        run: F,
    ) -> CoreResult<(bool, SyncJobStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<(String, Json)>>,
    {
        if !self.claim(trigger_source, triggered_by).await? {
            return Ok((false, self.status_or_idle().await?));
        }

        let (state, result, error) = match run().await {
            Ok((state, result)) => (state, result, None),
            Err(e) => ("failed".to_string(), Json::Null, Some(e.to_string())),
        };
        self.finalize(&state, result, error.as_deref()).await?;

        Ok((true, self.status_or_idle().await?))
    }

    /// `status()` with the no-row case folded into an idle snapshot; `claim`
    /// always inserts the row first, so callers past that point can rely on
    /// a status always being available.
    async fn status_or_idle(&self) -> CoreResult<SyncJobStatus> {
        Ok(self.status().await?.unwrap_or(SyncJobStatus {
            job_name: self.job_name.clone(),
            state: "idle".to_string(),
            trigger_source: None,
            triggered_by: None,
            started_at: None,
            finished_at: None,
            runtime_seconds: None,
            result: None,
            error: None,
        }))
    }

    /// Closes out a claimed run with the outcome state and result payload.
    pub async fn finalize(&self, state: &str, result: Json, error: Option<&str>) -> CoreResult<()> {
        let runtime_seconds: f64 = sqlx::query_scalar(
            "SELECT EXTRACT(EPOCH FROM (now() - started_at)) FROM document_sync WHERE job_name = $1",
        )
        .bind(&self.job_name)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE document_sync SET
                state = $2,
                finished_at = now(),
                runtime_seconds = $3,
                result = $4,
                error = $5,
                updated_at = now()
            WHERE job_name = $1
            "#,
        )
        .bind(&self.job_name)
        .bind(state)
        .bind(runtime_seconds)
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a run that was interrupted mid-flight (e.g. process restart
    /// while `state = 'running'`) back to `failed` so a stale claim never
    /// blocks future runs forever.
    pub async fn reap_stale(&self, max_runtime_seconds: f64) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE document_sync SET
                state = 'failed',
                finished_at = now(),
                error = 'reaped: exceeded max runtime',
                updated_at = now()
            WHERE job_name = $1 AND state = 'running'
              AND EXTRACT(EPOCH FROM (now() - started_at)) > $2
            "#,
        )
        .bind(&self.job_name)
        .bind(max_runtime_seconds)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn status(&self) -> CoreResult<Option<SyncJobStatus>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, Option<chrono::DateTime<Utc>>, Option<chrono::DateTime<Utc>>, Option<f64>, Option<Json>, Option<String>)>(
            "SELECT job_name, state, trigger_source, triggered_by, started_at, finished_at, runtime_seconds, result, error \
             FROM document_sync WHERE job_name = $1",
        )
        .bind(&self.job_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(job_name, state, trigger_source, triggered_by, started_at, finished_at, runtime_seconds, result, error)| {
            SyncJobStatus {
                job_name,
                state,
                trigger_source,
                triggered_by,
                started_at,
                finished_at,
                runtime_seconds,
                result,
                error,
            }
        }))
    }
}

