use crate::model::{
    Account, GlobalSettings, SchedulerStatus, ShareDownloadResult, Task, VideoParseInfo,
};
use crate::prefs::PreferencePair;
use std::future::Future;
use std::pin::Pin;

pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + 'a>>;

/// Everything the engine needs from the remote sync service. The HTTP
/// implementation lives in the api crate; tests substitute their own.
/// Every call is terminal for that attempt: no retries anywhere, the
/// caller decides what a failure means.
pub trait SyncService {
    /// Exchange credentials for a bearer token.
    fn login<'a>(&'a self, username: &'a str, password: &'a str) -> ServiceFuture<'a, String>;

    /// Whether the currently attached token is still accepted.
    fn check_session<'a>(&'a self) -> ServiceFuture<'a, bool>;

    fn change_password<'a>(
        &'a self,
        old_password: &'a str,
        new_password: &'a str,
    ) -> ServiceFuture<'a, ()>;

    fn settings<'a>(&'a self) -> ServiceFuture<'a, GlobalSettings>;

    fn update_settings<'a>(&'a self, settings: &'a GlobalSettings) -> ServiceFuture<'a, ()>;

    /// Submit the complete preference tuple for one account.
    fn update_preference<'a>(
        &'a self,
        uid: &'a str,
        pair: PreferencePair,
    ) -> ServiceFuture<'a, ()>;

    fn list_accounts<'a>(&'a self) -> ServiceFuture<'a, Vec<Account>>;

    /// Enqueue tracking of a new account from a share/profile URL.
    fn add_account<'a>(&'a self, url: &'a str) -> ServiceFuture<'a, ()>;

    /// Enqueue an incremental sync for one account.
    fn refresh_account<'a>(&'a self, sec_user_id: &'a str) -> ServiceFuture<'a, ()>;

    fn toggle_auto_update<'a>(&'a self, uid: &'a str, enabled: bool) -> ServiceFuture<'a, ()>;

    fn delete_account<'a>(&'a self, uid: &'a str) -> ServiceFuture<'a, ()>;

    fn download_share_url<'a>(
        &'a self,
        share_url: &'a str,
    ) -> ServiceFuture<'a, ShareDownloadResult>;

    fn active_tasks<'a>(&'a self) -> ServiceFuture<'a, Vec<Task>>;

    fn scheduler_status<'a>(&'a self) -> ServiceFuture<'a, SchedulerStatus>;

    fn run_scheduler_now<'a>(&'a self) -> ServiceFuture<'a, ()>;

    /// Kick off the global backlog scan.
    fn check_backlog<'a>(&'a self) -> ServiceFuture<'a, ()>;

    fn parse_video<'a>(&'a self, share_url: &'a str) -> ServiceFuture<'a, VideoParseInfo>;

    fn fetch_logs<'a>(&'a self) -> ServiceFuture<'a, Vec<String>>;

    /// Attach or drop the bearer credential used for every call.
    fn set_token(&self, token: Option<String>);
}
