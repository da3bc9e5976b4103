use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel `target_id` the service uses for backlog scans that are not
/// tied to a single account.
pub const GLOBAL_SCAN_TARGET: &str = "global_check";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Douyin,
    Tiktok,
    #[serde(other)]
    Other,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Douyin => f.write_str("douyin"),
            Platform::Tiktok => f.write_str("tiktok"),
            Platform::Other => f.write_str("other"),
        }
    }
}

/// A tracked creator account as reported by the service. `uid` is unique
/// within the registry; everything else is display data or sync policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub uid: String,
    #[serde(default)]
    pub sec_user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    pub auto_update: bool,
    #[serde(default)]
    pub download_video_override: Option<bool>,
    #[serde(default)]
    pub download_note_override: Option<bool>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub platform: Platform,
}

impl Account {
    /// Refresh calls key off the platform-specific id. Accounts created
    /// from a bare URL may not have one yet; the service accepts an empty
    /// string in that case.
    pub fn sec_user_id_or_empty(&self) -> &str {
        self.sec_user_id.as_deref().unwrap_or("")
    }

    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.uid)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A server-tracked unit of work. The client only ever sees tasks that
/// are still in the active set; once a task leaves {pending, running} it
/// disappears from the snapshot and is never cached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub target_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
}

impl Task {
    pub fn is_global_scan(&self) -> bool {
        self.target_id == GLOBAL_SCAN_TARGET
    }

    pub fn targets_account(&self, account: &Account) -> bool {
        self.target_id == account.uid || self.target_id == account.sec_user_id_or_empty()
    }
}

/// Read-only snapshot of the server-side auto-update scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub last_run: Option<i64>,
    pub next_run: Option<i64>,
    pub is_running: bool,
}

/// Service-wide defaults that per-account overrides resolve against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub download_video: bool,
    pub download_note: bool,
    pub auto_update_interval: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShareDownloadResult {
    pub filename: String,
    pub downloaded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoParseInfo {
    pub aweme_id: String,
    pub aweme_type: i32,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_avatar: Option<String>,
    pub platform: Platform,
}
