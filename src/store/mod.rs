// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Persistent state store

pub mod models;
mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use models::{CommunityPost, JobRecord, LikeOutcome, StatusUpdate};

/// Abstract store trait for different database backends
#[async_trait]
pub trait Store: Send + Sync {
    // Job operations
    async fn create_job(&self, job: &JobRecord) -> Result<()>;
    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>>;
    /// Apply a status change to a job that is still pending.
    /// Returns `false` when the row is missing or already terminal.
    async fn apply_status_update(&self, id: &str, update: &StatusUpdate) -> Result<bool>;
    async fn list_jobs_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<JobRecord>>;
    async fn list_stale_jobs(&self, created_before: DateTime<Utc>) -> Result<Vec<JobRecord>>;

    // Community operations
    async fn create_post(&self, post: &CommunityPost) -> Result<()>;
    async fn get_post(&self, id: Uuid) -> Result<Option<CommunityPost>>;
    async fn list_posts(&self, limit: usize) -> Result<Vec<CommunityPost>>;
    async fn toggle_like(&self, user_id: &str, post_id: Uuid) -> Result<LikeOutcome>;

    // Utility
    async fn health_check(&self) -> Result<bool>;
}
