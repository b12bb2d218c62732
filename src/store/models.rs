// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Database models

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored job status. Transitions only PENDING -> COMPLETED | FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings snapshot captured at submission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSettings {
    pub hairstyle_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_image_url: Option<String>,
}

/// Job record, keyed by the provider-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub input_image_url: String,
    pub output_url: Option<String>,
    pub user_id: String,
    pub settings: JobSettings,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Fresh record for a job the provider just accepted
    pub fn pending(id: String, user_id: String, input_image_url: String, settings: JobSettings) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            input_image_url,
            output_url: None,
            user_id,
            settings,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status change applied by the webhook receiver
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn completed(output_url: Option<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            output_url,
            error: None,
        }
    }

    pub fn failed(error: Option<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            output_url: None,
            error,
        }
    }
}

/// Community post sharing a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityPost {
    pub id: Uuid,
    pub user_id: String,
    pub job_id: String,
    pub input_image_url: String,
    pub output_image_url: Option<String>,
    pub hairstyle_settings: serde_json::Value,
    pub likes_count: i64,
    pub posted_at: DateTime<Utc>,
    pub week_number: u32,
}

impl CommunityPost {
    pub fn from_job(job: &JobRecord, user_id: String) -> Self {
        let now = Utc::now();
        let hairstyle_settings = serde_json::to_value(&job.settings)
            .unwrap_or_else(|_| serde_json::json!({ "hairstyle_type": "unknown" }));
        Self {
            id: Uuid::new_v4(),
            user_id,
            job_id: job.id.clone(),
            input_image_url: job.input_image_url.clone(),
            output_image_url: job.output_url.clone(),
            hairstyle_settings,
            likes_count: 0,
            posted_at: now,
            week_number: week_number(now),
        }
    }
}

/// Outcome of a like toggle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeOutcome {
    #[serde(flatten)]
    pub post: CommunityPost,
    pub liked: bool,
}

/// ISO week of the year, used to group posts for weekly contests
pub fn week_number(at: DateTime<Utc>) -> u32 {
    at.iso_week().week()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trip() {
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("IN_PROGRESS"), None);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&JobStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_pending_record() {
        let settings = JobSettings {
            hairstyle_type: "Afro, short".to_string(),
            workflow: None,
            style_image_url: None,
        };
        let job = JobRecord::pending(
            "abc123".to_string(),
            "user_1".to_string(),
            "https://x/img.png".to_string(),
            settings,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.output_url.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_week_number() {
        let at = Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap();
        assert_eq!(week_number(at), 2);
    }
}
