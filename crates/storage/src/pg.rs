// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres realization of the [`Store`] contract.

use crate::retry::with_retry;
use crate::{CancelOutcome, CloseOutcome, JobStats, StartOutcome, Store, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_core::{
    Dimensions, FailureKind, FailureRecord, ItemClose, ItemId, ItemStatus, Job, JobCounters,
    JobId, JobState, LogEntry, LogLevel, NewFailure, NewItem, NewJob, WorkItem,
};
use serde_json::Map;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row as _;
use tracing::{debug, info};

const TERMINAL_STATES: &str = "('completed','failed','cancelled')";

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Postgres-backed store. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool against the given DSN.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(20)
            .connect(dsn)
            .await?;
        info!("store connected");
        Ok(Self { pool })
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(sqlx::Error::Migrate(Box::new(e))))?;
        info!("store migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_err(what: &str, raw: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unrecognized {what}: {raw:?}").into())
}

fn epoch_ms(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_millis().max(0) as u64
}

fn opt_epoch_ms(ts: Option<DateTime<Utc>>) -> Option<u64> {
    ts.map(epoch_ms)
}

fn json_object(value: serde_json::Value) -> Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    let state_raw: String = row.try_get("state")?;
    let state = JobState::parse(&state_raw).ok_or_else(|| decode_err("job state", &state_raw))?;
    let kind_raw: String = row.try_get("kind")?;
    let kind =
        pf_core::JobKind::parse(&kind_raw).ok_or_else(|| decode_err("job kind", &kind_raw))?;

    Ok(Job {
        id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        kind,
        campaign_name: row.try_get("campaign_name")?,
        state,
        counters: JobCounters {
            total: row.try_get("total")?,
            processed: row.try_get("processed")?,
            success: row.try_get("success")?,
            failure: row.try_get("failure")?,
        },
        template: row.try_get("template_html")?,
        dims: Dimensions::new(
            row.try_get::<i32, _>("width")?.max(0) as u32,
            row.try_get::<i32, _>("height")?.max(0) as u32,
        ),
        skip_overlays: row.try_get("skip_overlays")?,
        model: row.try_get("model")?,
        logo_handle: row.try_get("logo_handle")?,
        error_message: row.try_get("error_message")?,
        metadata: json_object(row.try_get("metadata")?),
        created_at_ms: epoch_ms(row.try_get("created_at")?),
        started_at_ms: opt_epoch_ms(row.try_get("started_at")?),
        completed_at_ms: opt_epoch_ms(row.try_get("completed_at")?),
    })
}

fn item_from_row(row: &PgRow) -> Result<WorkItem, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status =
        ItemStatus::parse(&status_raw).ok_or_else(|| decode_err("item status", &status_raw))?;

    Ok(WorkItem {
        job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
        item_id: ItemId::from_string(row.try_get::<String, _>("item_id")?),
        input_identifier: row.try_get("input_identifier")?,
        status,
        display_name: row.try_get("display_name")?,
        artifact_url: row.try_get("artifact_url")?,
        artifact_key: row.try_get("artifact_key")?,
        processing_ms: row.try_get("processing_ms")?,
        error_message: row.try_get("error_message")?,
        metadata: json_object(row.try_get("metadata")?),
    })
}

fn counters_from_row(row: &PgRow) -> Result<JobCounters, sqlx::Error> {
    Ok(JobCounters {
        total: row.try_get("total")?,
        processed: row.try_get("processed")?,
        success: row.try_get("success")?,
        failure: row.try_get("failure")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_job(&self, job: &NewJob) -> Result<(), StoreError> {
        let result = with_retry("create_job", || {
            let pool = &self.pool;
            async move {
                sqlx::query(
                    "INSERT INTO jobs (job_id, kind, campaign_name, state, total, template_html, \
                     width, height, skip_overlays, model, logo_handle, metadata) \
                     VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10, $11) \
                     ON CONFLICT (job_id) DO NOTHING",
                )
                .bind(job.id.as_str())
                .bind(job.kind.to_string())
                .bind(&job.campaign_name)
                .bind(job.total)
                .bind(&job.template)
                .bind(job.dims.width as i32)
                .bind(job.dims.height as i32)
                .bind(job.skip_overlays)
                .bind(&job.model)
                .bind(&job.logo_handle)
                .bind(serde_json::Value::Object(job.metadata.clone()))
                .execute(pool)
                .await
            }
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateJob(job.id));
        }
        debug!(job_id = %job.id, total = job.total, "job created");
        Ok(())
    }

    async fn transition_job(
        &self,
        job_id: &JobId,
        from: JobState,
        to: JobState,
    ) -> Result<(), StoreError> {
        // Terminal targets stamp completed_at and entering processing
        // stamps started_at, in the same statement as the CAS (I2).
        let sql = if to.is_terminal() {
            "UPDATE jobs SET state = $3, completed_at = now() WHERE job_id = $1 AND state = $2"
        } else if to == JobState::Processing {
            "UPDATE jobs SET state = $3, started_at = now() WHERE job_id = $1 AND state = $2"
        } else {
            "UPDATE jobs SET state = $3 WHERE job_id = $1 AND state = $2"
        };

        let result = with_retry("transition_job", || {
            let pool = &self.pool;
            async move {
                sqlx::query(sql)
                    .bind(job_id.as_str())
                    .bind(from.to_string())
                    .bind(to.to_string())
                    .execute(pool)
                    .await
            }
        })
        .await?;

        if result.rows_affected() > 0 {
            debug!(job_id = %job_id, %from, %to, "job transitioned");
            return Ok(());
        }

        let actual: Option<String> =
            sqlx::query_scalar("SELECT state FROM jobs WHERE job_id = $1")
                .bind(job_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match actual.and_then(|s| JobState::parse(&s)) {
            Some(actual) => Err(StoreError::StateMismatch { expected: from, actual }),
            None => Err(StoreError::JobNotFound(*job_id)),
        }
    }

    async fn fail_job(&self, job_id: &JobId, error: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE jobs SET state = 'failed', error_message = $2, completed_at = now() \
             WHERE job_id = $1 AND state NOT IN {TERMINAL_STATES}"
        );
        let result = with_retry("fail_job", || {
            let pool = &self.pool;
            let sql = sql.as_str();
            async move {
                sqlx::query(sql)
                    .bind(job_id.as_str())
                    .bind(error)
                    .execute(pool)
                    .await
            }
        })
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM jobs WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::JobNotFound(*job_id)),
        }
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<CancelOutcome, StoreError> {
        // Select-then-CAS so the prior state can be reported. A failed CAS
        // means the state moved under us; re-read and try again. States
        // only move toward terminal, so this converges.
        loop {
            let current: Option<String> =
                sqlx::query_scalar("SELECT state FROM jobs WHERE job_id = $1")
                    .bind(job_id.as_str())
                    .fetch_optional(&self.pool)
                    .await?;
            let prior = match current.and_then(|s| JobState::parse(&s)) {
                Some(state) => state,
                None => return Err(StoreError::JobNotFound(*job_id)),
            };
            if prior.is_terminal() {
                return Ok(CancelOutcome::AlreadyTerminal(prior));
            }

            let result = sqlx::query(
                "UPDATE jobs SET state = 'cancelled', error_message = $3, completed_at = now() \
                 WHERE job_id = $1 AND state = $2",
            )
            .bind(job_id.as_str())
            .bind(prior.to_string())
            .bind("cancelled by user")
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                info!(job_id = %job_id, %prior, "job cancelled");
                return Ok(CancelOutcome::Cancelled { prior });
            }
        }
    }

    async fn start_item(&self, job_id: &JobId, item: &NewItem) -> Result<StartOutcome, StoreError> {
        let claimed = with_retry("start_item", || {
            let pool = &self.pool;
            async move {
                sqlx::query(
                    "INSERT INTO work_items (job_id, item_id, input_identifier, display_name, status, metadata) \
                     VALUES ($1, $2, $3, $4, 'processing', $5) \
                     ON CONFLICT (job_id, item_id) DO UPDATE \
                     SET status = 'processing', \
                         display_name = COALESCE(EXCLUDED.display_name, work_items.display_name), \
                         updated_at = now() \
                     WHERE work_items.status IN ('pending', 'processing') \
                     RETURNING status",
                )
                .bind(job_id.as_str())
                .bind(item.item_id.as_str())
                .bind(&item.input_identifier)
                .bind(&item.display_name)
                .bind(serde_json::Value::Object(item.metadata.clone()))
                .fetch_optional(pool)
                .await
            }
        })
        .await?;

        if claimed.is_some() {
            return Ok(StartOutcome::Started);
        }

        // Conflict row was terminal: report its status so the worker can
        // skip the item without side effects (I4).
        let status_raw: String =
            sqlx::query_scalar("SELECT status FROM work_items WHERE job_id = $1 AND item_id = $2")
                .bind(job_id.as_str())
                .bind(item.item_id.as_str())
                .fetch_one(&self.pool)
                .await?;
        let status = ItemStatus::parse(&status_raw)
            .ok_or_else(|| decode_err("item status", &status_raw))?;
        Ok(StartOutcome::AlreadyClosed(status))
    }

    async fn close_item(
        &self,
        job_id: &JobId,
        item_id: &ItemId,
        close: &ItemClose,
    ) -> Result<CloseOutcome, StoreError> {
        let error_message = close.error.as_ref().map(|(_, message)| message.clone());
        let (d_success, d_failure) = match close.status {
            ItemStatus::Completed => (1i64, 0i64),
            _ => (0, 1),
        };

        let outcome = with_retry("close_item", || {
            let pool = &self.pool;
            let error_message = error_message.clone();
            async move {
                let mut tx = pool.begin().await?;

                let updated = sqlx::query(
                    "UPDATE work_items SET status = $3, \
                         display_name = COALESCE($4, display_name), \
                         artifact_url = $5, artifact_key = $6, \
                         processing_ms = $7, error_message = $8, \
                         metadata = metadata || $9, updated_at = now() \
                     WHERE job_id = $1 AND item_id = $2 \
                       AND status IN ('pending', 'processing')",
                )
                .bind(job_id.as_str())
                .bind(item_id.as_str())
                .bind(close.status.to_string())
                .bind(&close.display_name)
                .bind(&close.artifact_url)
                .bind(&close.artifact_key)
                .bind(close.processing_ms)
                .bind(&error_message)
                .bind(serde_json::Value::Object(close.metadata.clone()))
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    let existing: Option<String> = sqlx::query_scalar(
                        "SELECT status FROM work_items WHERE job_id = $1 AND item_id = $2",
                    )
                    .bind(job_id.as_str())
                    .bind(item_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
                    match existing {
                        // Redelivered close of a terminal item: no side effects.
                        Some(_) => {
                            tx.rollback().await?;
                            return Ok(CloseOutcome::AlreadyClosed);
                        }
                        // Close without a prior start keeps the upsert contract.
                        None => {
                            sqlx::query(
                                "INSERT INTO work_items (job_id, item_id, input_identifier, \
                                     status, display_name, artifact_url, artifact_key, \
                                     processing_ms, error_message, metadata) \
                                 VALUES ($1, $2, '', $3, $4, $5, $6, $7, $8, $9)",
                            )
                            .bind(job_id.as_str())
                            .bind(item_id.as_str())
                            .bind(close.status.to_string())
                            .bind(&close.display_name)
                            .bind(&close.artifact_url)
                            .bind(&close.artifact_key)
                            .bind(close.processing_ms)
                            .bind(&error_message)
                            .bind(serde_json::Value::Object(close.metadata.clone()))
                            .execute(&mut *tx)
                            .await?;
                        }
                    }
                }

                // Counters move only while the job is processing; a close
                // landing after cancel is recorded but not counted.
                let counters = sqlx::query(
                    "UPDATE jobs SET processed = processed + 1, \
                         success = success + $2, failure = failure + $3 \
                     WHERE job_id = $1 AND state = 'processing' AND processed < total \
                     RETURNING total, processed, success, failure",
                )
                .bind(job_id.as_str())
                .bind(d_success)
                .bind(d_failure)
                .fetch_optional(&mut *tx)
                .await?;

                tx.commit().await?;

                Ok(match counters {
                    Some(row) => CloseOutcome::Applied(counters_from_row(&row)?),
                    None => CloseOutcome::Discarded,
                })
            }
        })
        .await?;

        Ok(outcome)
    }

    async fn bump_counters(
        &self,
        job_id: &JobId,
        processed: i64,
        success: i64,
        failure: i64,
    ) -> Result<JobCounters, StoreError> {
        let row = with_retry("bump_counters", || {
            let pool = &self.pool;
            async move {
                sqlx::query(
                    "UPDATE jobs SET processed = processed + $2, \
                         success = success + $3, failure = failure + $4 \
                     WHERE job_id = $1 AND processed + $2 <= total \
                     RETURNING total, processed, success, failure",
                )
                .bind(job_id.as_str())
                .bind(processed)
                .bind(success)
                .bind(failure)
                .fetch_optional(pool)
                .await
            }
        })
        .await?;

        match row {
            Some(row) => Ok(counters_from_row(&row)?),
            None => {
                let exists: Option<i32> =
                    sqlx::query_scalar("SELECT 1 FROM jobs WHERE job_id = $1")
                        .bind(job_id.as_str())
                        .fetch_optional(&self.pool)
                        .await?;
                match exists {
                    Some(_) => Err(StoreError::CounterOverflow(*job_id)),
                    None => Err(StoreError::JobNotFound(*job_id)),
                }
            }
        }
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| job_from_row(&r)).transpose().map_err(StoreError::from)
    }

    async fn list_jobs(
        &self,
        state: Option<JobState>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = match state {
            Some(state) => {
                sqlx::query(
                    "SELECT * FROM jobs WHERE state = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(state.to_string())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(job_from_row).collect::<Result<_, _>>().map_err(StoreError::from)
    }

    async fn get_items(&self, job_id: &JobId) -> Result<Vec<WorkItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM work_items WHERE job_id = $1 ORDER BY item_id ASC",
        )
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect::<Result<_, _>>().map_err(StoreError::from)
    }

    async fn get_stats(&self, job_id: &JobId) -> Result<JobStats, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
                 COUNT(*) FILTER (WHERE status = 'processing') AS processing, \
                 COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
                 COUNT(*) FILTER (WHERE status = 'failed') AS failed, \
                 AVG(processing_ms)::float8 AS avg_time_ms \
             FROM work_items WHERE job_id = $1",
        )
        .bind(job_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(JobStats {
            total: row.try_get("total")?,
            pending: row.try_get("pending")?,
            processing: row.try_get("processing")?,
            completed: row.try_get("completed")?,
            failed: row.try_get("failed")?,
            avg_processing_ms: row.try_get("avg_time_ms")?,
        })
    }

    async fn append_log(
        &self,
        job_id: &JobId,
        level: LogLevel,
        message: &str,
        details: Map<String, serde_json::Value>,
    ) -> Result<(), StoreError> {
        with_retry("append_log", || {
            let pool = &self.pool;
            let details = details.clone();
            async move {
                sqlx::query(
                    "INSERT INTO job_logs (job_id, level, message, details) VALUES ($1, $2, $3, $4)",
                )
                .bind(job_id.as_str())
                .bind(level.to_string())
                .bind(message)
                .bind(serde_json::Value::Object(details))
                .execute(pool)
                .await
            }
        })
        .await?;
        Ok(())
    }

    async fn get_logs(
        &self,
        job_id: &JobId,
        level: Option<LogLevel>,
        limit: i64,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let rows = match level {
            Some(level) => {
                sqlx::query(
                    "SELECT * FROM job_logs WHERE job_id = $1 AND level = $2 \
                     ORDER BY created_at DESC LIMIT $3",
                )
                .bind(job_id.as_str())
                .bind(level.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM job_logs WHERE job_id = $1 \
                     ORDER BY created_at DESC LIMIT $2",
                )
                .bind(job_id.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| {
                let level_raw: String = row.try_get("level")?;
                Ok(LogEntry {
                    job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
                    level: LogLevel::parse(&level_raw)
                        .ok_or_else(|| decode_err("log level", &level_raw))?,
                    message: row.try_get("message")?,
                    details: json_object(row.try_get("details")?),
                    created_at_ms: epoch_ms(row.try_get("created_at")?),
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    async fn record_failure(&self, failure: &NewFailure) -> Result<(), StoreError> {
        with_retry("record_failure", || {
            let pool = &self.pool;
            let details = failure.details.clone();
            async move {
                sqlx::query(
                    "INSERT INTO failure_records (job_id, item_id, identifier, failure_kind, \
                         error_message, details, template_snapshot) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(failure.job_id.as_str())
                .bind(failure.item_id.as_ref().map(|id| id.as_str().to_string()))
                .bind(&failure.identifier)
                .bind(failure.kind.to_string())
                .bind(&failure.error_message)
                .bind(serde_json::Value::Object(details))
                .bind(&failure.template_snapshot)
                .execute(pool)
                .await
            }
        })
        .await?;
        Ok(())
    }

    async fn get_failures(&self, job_id: &JobId) -> Result<Vec<FailureRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM failure_records WHERE job_id = $1 ORDER BY created_at DESC",
        )
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind_raw: String = row.try_get("failure_kind")?;
                Ok(FailureRecord {
                    job_id: JobId::from_string(row.try_get::<String, _>("job_id")?),
                    item_id: row
                        .try_get::<Option<String>, _>("item_id")?
                        .map(ItemId::from_string),
                    identifier: row.try_get("identifier")?,
                    kind: FailureKind::parse(&kind_raw)
                        .ok_or_else(|| decode_err("failure kind", &kind_raw))?,
                    error_message: row.try_get("error_message")?,
                    details: json_object(row.try_get("details")?),
                    template_snapshot: row.try_get("template_snapshot")?,
                    created_at_ms: epoch_ms(row.try_get("created_at")?),
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(StoreError::from)
    }
}
