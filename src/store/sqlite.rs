// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! SQLite store implementation

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use super::{models::*, Store};
use crate::error::{Error, Result};

/// SQLite-backed store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and ensure the schema exists
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // every connection to :memory: opens its own database
        let in_memory = database_url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections.max(1) });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                input_image_url TEXT NOT NULL,
                output_url TEXT,
                user_id TEXT NOT NULL,
                settings TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS community_posts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                job_id TEXT NOT NULL REFERENCES jobs(id),
                input_image_url TEXT NOT NULL,
                output_image_url TEXT,
                hairstyle_settings TEXT NOT NULL,
                likes_count INTEGER NOT NULL DEFAULT 0,
                posted_at TEXT NOT NULL,
                week_number INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS community_likes (
                user_id TEXT NOT NULL,
                post_id TEXT NOT NULL REFERENCES community_posts(id),
                created_at TEXT NOT NULL,
                UNIQUE(user_id, post_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_user_id ON jobs(user_id, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_job(&self, job: &JobRecord) -> Result<()> {
        let settings = serde_json::to_string(&job.settings)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, status, input_image_url, output_url, user_id,
                settings, error, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(&job.input_image_url)
        .bind(&job.output_url)
        .bind(&job.user_id)
        .bind(&settings)
        .bind(&job.error)
        .bind(timestamp(job.created_at))
        .bind(timestamp(job.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn apply_status_update(&self, id: &str, update: &StatusUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                output_url = ?,
                error = ?,
                updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.output_url)
        .bind(&update.error)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_jobs_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<JobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_stale_jobs(&self, created_before: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM jobs WHERE status = 'PENDING' AND created_at < ? ORDER BY created_at ASC",
        )
        .bind(timestamp(created_before))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn create_post(&self, post: &CommunityPost) -> Result<()> {
        let settings = serde_json::to_string(&post.hairstyle_settings)?;

        sqlx::query(
            r#"
            INSERT INTO community_posts (
                id, user_id, job_id, input_image_url, output_image_url,
                hairstyle_settings, likes_count, posted_at, week_number
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post.id.to_string())
        .bind(&post.user_id)
        .bind(&post.job_id)
        .bind(&post.input_image_url)
        .bind(&post.output_image_url)
        .bind(&settings)
        .bind(post.likes_count)
        .bind(timestamp(post.posted_at))
        .bind(post.week_number as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<CommunityPost>> {
        let row: Option<PostRow> = sqlx::query_as("SELECT * FROM community_posts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn list_posts(&self, limit: usize) -> Result<Vec<CommunityPost>> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "SELECT * FROM community_posts ORDER BY likes_count DESC, posted_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn toggle_like(&self, user_id: &str, post_id: Uuid) -> Result<LikeOutcome> {
        let post_key = post_id.to_string();
        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM community_posts WHERE id = ?")
            .bind(&post_key)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(Error::PostNotFound(post_id));
        }

        let existing_like: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM community_likes WHERE user_id = ? AND post_id = ?")
                .bind(user_id)
                .bind(&post_key)
                .fetch_optional(&mut *tx)
                .await?;

        let liked = match existing_like {
            Some(_) => {
                sqlx::query("DELETE FROM community_likes WHERE user_id = ? AND post_id = ?")
                    .bind(user_id)
                    .bind(&post_key)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "UPDATE community_posts SET likes_count = MAX(likes_count - 1, 0) WHERE id = ?",
                )
                .bind(&post_key)
                .execute(&mut *tx)
                .await?;
                false
            }
            None => {
                sqlx::query(
                    "INSERT INTO community_likes (user_id, post_id, created_at) VALUES (?, ?, ?)",
                )
                .bind(user_id)
                .bind(&post_key)
                .bind(timestamp(Utc::now()))
                .execute(&mut *tx)
                .await?;
                sqlx::query("UPDATE community_posts SET likes_count = likes_count + 1 WHERE id = ?")
                    .bind(&post_key)
                    .execute(&mut *tx)
                    .await?;
                true
            }
        };

        let row: PostRow = sqlx::query_as("SELECT * FROM community_posts WHERE id = ?")
            .bind(&post_key)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(LikeOutcome {
            post: row.try_into()?,
            liked,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let result: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(result.0 == 1)
    }
}

// =============================================================================
// Row types for sqlx
// =============================================================================

/// Fixed-width RFC 3339 so text comparison orders correctly
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    status: String,
    input_image_url: String,
    output_url: Option<String>,
    user_id: String,
    settings: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| Error::Internal(format!("Unknown status: {}", row.status)))?;
        let settings: JobSettings = serde_json::from_str(&row.settings)?;

        Ok(JobRecord {
            id: row.id,
            status,
            input_image_url: row.input_image_url,
            output_url: row.output_url,
            user_id: row.user_id,
            settings,
            error: row.error,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    user_id: String,
    job_id: String,
    input_image_url: String,
    output_image_url: Option<String>,
    hairstyle_settings: String,
    likes_count: i64,
    posted_at: String,
    week_number: i64,
}

impl TryFrom<PostRow> for CommunityPost {
    type Error = Error;

    fn try_from(row: PostRow) -> Result<Self> {
        Ok(CommunityPost {
            id: Uuid::parse_str(&row.id).map_err(|e| Error::Internal(e.to_string()))?,
            user_id: row.user_id,
            job_id: row.job_id,
            input_image_url: row.input_image_url,
            output_image_url: row.output_image_url,
            hairstyle_settings: serde_json::from_str(&row.hairstyle_settings)?,
            likes_count: row.likes_count,
            posted_at: parse_timestamp(&row.posted_at)?,
            week_number: row.week_number as u32,
        })
    }
}
