use crate::error::{ApiError, ApiResult};
use crate::models::{
    Ack, AuthResponse, LoginRequest, LoginStatus, LogsResponse, PasswordChangeRequest,
    PreferenceRequest,
};
use anyhow::Context;
use msync_core::model::{
    Account, GlobalSettings, SchedulerStatus, ShareDownloadResult, Task, VideoParseInfo,
};
use msync_core::prefs::PreferencePair;
use msync_core::service::{ServiceFuture, SyncService};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the sync service. One base path, JSON in and out,
/// bearer token on every request once a credential exists. Each call is
/// a single attempt; the engine's polling loop is the only retry there
/// is.
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        if base_url.is_empty() {
            anyhow::bail!("base url must not be empty");
        }
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent("msync")
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url,
            token: RwLock::new(None),
        })
    }

    fn request(&self, method: Method, endpoint: &'static str) -> RequestBuilder {
        let url = format!("{}{endpoint}", self.base_url);
        let builder = self.http.request(method, url);
        let token = self.token.read().ok().and_then(|guard| guard.clone());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        endpoint: &'static str,
    ) -> ApiResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { endpoint, status });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        endpoint: &'static str,
    ) -> ApiResult<T> {
        let response = self.send(builder, endpoint).await?;
        response
            .json()
            .await
            .map_err(|source| ApiError::Decode { endpoint, source })
    }

    /// Drain the loosely-typed acknowledgement body. Status already
    /// decided success; the ack is only good for a debug line.
    async fn send_ack(&self, builder: RequestBuilder, endpoint: &'static str) -> ApiResult<()> {
        let ack: Ack = self.send_json(builder, endpoint).await?;
        if let Some(message) = ack.message {
            debug!(endpoint, message = %message, "service acknowledgement");
        }
        Ok(())
    }

    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthResponse> {
        let body = LoginRequest { username, password };
        let builder = self.request(Method::POST, "login").json(&body);
        self.send_json(builder, "login").await
    }

    /// `401` here means "token rejected", not a fault; anything else
    /// non-2xx is still an error.
    pub async fn check_session(&self) -> ApiResult<bool> {
        let builder = self.request(Method::GET, "login/status");
        match self.send_json::<LoginStatus>(builder, "login/status").await {
            Ok(status) => Ok(status.logged_in),
            Err(ApiError::Status {
                status: StatusCode::UNAUTHORIZED,
                ..
            }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> ApiResult<()> {
        let body = PasswordChangeRequest {
            old_password,
            new_password,
        };
        let builder = self.request(Method::POST, "change_password").json(&body);
        self.send_ack(builder, "change_password").await
    }

    pub async fn settings(&self) -> ApiResult<GlobalSettings> {
        let builder = self.request(Method::GET, "settings");
        self.send_json(builder, "settings").await
    }

    pub async fn update_settings(&self, settings: &GlobalSettings) -> ApiResult<()> {
        let builder = self.request(Method::POST, "settings").json(settings);
        self.send_ack(builder, "settings").await
    }

    pub async fn update_preference(&self, uid: &str, pair: PreferencePair) -> ApiResult<()> {
        let body = PreferenceRequest {
            uid,
            video_pref: pair.video,
            note_pref: pair.note,
        };
        let builder = self.request(Method::POST, "user/preference").json(&body);
        self.send_ack(builder, "user/preference").await
    }

    pub async fn list_accounts(&self) -> ApiResult<Vec<Account>> {
        let builder = self.request(Method::GET, "users");
        self.send_json(builder, "users").await
    }

    pub async fn add_account(&self, url: &str) -> ApiResult<()> {
        let builder = self
            .request(Method::POST, "download_user_videos")
            .query(&[("url", url)]);
        self.send_ack(builder, "download_user_videos").await
    }

    pub async fn refresh_account(&self, sec_user_id: &str) -> ApiResult<()> {
        let builder = self
            .request(Method::POST, "refresh_user_videos")
            .query(&[("sec_user_id", sec_user_id)]);
        self.send_ack(builder, "refresh_user_videos").await
    }

    pub async fn toggle_auto_update(&self, uid: &str, enabled: bool) -> ApiResult<()> {
        let builder = self
            .request(Method::POST, "toggle_auto_update")
            .query(&[("uid", uid), ("enabled", if enabled { "true" } else { "false" })]);
        self.send_ack(builder, "toggle_auto_update").await
    }

    pub async fn delete_account(&self, uid: &str) -> ApiResult<()> {
        let builder = self
            .request(Method::DELETE, "delete_user")
            .query(&[("uid", uid)]);
        self.send_ack(builder, "delete_user").await
    }

    pub async fn download_share_url(&self, share_url: &str) -> ApiResult<ShareDownloadResult> {
        let builder = self
            .request(Method::POST, "download_share_url")
            .query(&[("share_url", share_url)]);
        self.send_json(builder, "download_share_url").await
    }

    pub async fn active_tasks(&self) -> ApiResult<Vec<Task>> {
        let builder = self.request(Method::GET, "tasks/active");
        self.send_json(builder, "tasks/active").await
    }

    pub async fn scheduler_status(&self) -> ApiResult<SchedulerStatus> {
        let builder = self.request(Method::GET, "scheduler/status");
        self.send_json(builder, "scheduler/status").await
    }

    pub async fn run_scheduler_now(&self) -> ApiResult<()> {
        let builder = self.request(Method::POST, "scheduler/run_now");
        self.send_ack(builder, "scheduler/run_now").await
    }

    pub async fn check_backlog(&self) -> ApiResult<()> {
        let builder = self.request(Method::POST, "tasks/check_undownloaded");
        self.send_ack(builder, "tasks/check_undownloaded").await
    }

    pub async fn parse_video(&self, share_url: &str) -> ApiResult<VideoParseInfo> {
        let builder = self
            .request(Method::POST, "parse_video")
            .query(&[("share_url", share_url)]);
        self.send_json(builder, "parse_video").await
    }

    pub async fn fetch_logs(&self) -> ApiResult<Vec<String>> {
        let builder = self.request(Method::GET, "logs");
        let response: LogsResponse = self.send_json(builder, "logs").await?;
        Ok(response.logs)
    }
}

impl SyncService for ApiClient {
    fn login<'a>(&'a self, username: &'a str, password: &'a str) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let response = ApiClient::login(self, username, password).await?;
            Ok(response.access_token)
        })
    }

    fn check_session<'a>(&'a self) -> ServiceFuture<'a, bool> {
        Box::pin(async move { Ok(ApiClient::check_session(self).await?) })
    }

    fn change_password<'a>(
        &'a self,
        old_password: &'a str,
        new_password: &'a str,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            Ok(ApiClient::change_password(self, old_password, new_password).await?)
        })
    }

    fn settings<'a>(&'a self) -> ServiceFuture<'a, GlobalSettings> {
        Box::pin(async move { Ok(ApiClient::settings(self).await?) })
    }

    fn update_settings<'a>(&'a self, settings: &'a GlobalSettings) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::update_settings(self, settings).await?) })
    }

    fn update_preference<'a>(
        &'a self,
        uid: &'a str,
        pair: PreferencePair,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::update_preference(self, uid, pair).await?) })
    }

    fn list_accounts<'a>(&'a self) -> ServiceFuture<'a, Vec<Account>> {
        Box::pin(async move { Ok(ApiClient::list_accounts(self).await?) })
    }

    fn add_account<'a>(&'a self, url: &'a str) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::add_account(self, url).await?) })
    }

    fn refresh_account<'a>(&'a self, sec_user_id: &'a str) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::refresh_account(self, sec_user_id).await?) })
    }

    fn toggle_auto_update<'a>(&'a self, uid: &'a str, enabled: bool) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::toggle_auto_update(self, uid, enabled).await?) })
    }

    fn delete_account<'a>(&'a self, uid: &'a str) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::delete_account(self, uid).await?) })
    }

    fn download_share_url<'a>(
        &'a self,
        share_url: &'a str,
    ) -> ServiceFuture<'a, ShareDownloadResult> {
        Box::pin(async move { Ok(ApiClient::download_share_url(self, share_url).await?) })
    }

    fn active_tasks<'a>(&'a self) -> ServiceFuture<'a, Vec<Task>> {
        Box::pin(async move { Ok(ApiClient::active_tasks(self).await?) })
    }

    fn scheduler_status<'a>(&'a self) -> ServiceFuture<'a, SchedulerStatus> {
        Box::pin(async move { Ok(ApiClient::scheduler_status(self).await?) })
    }

    fn run_scheduler_now<'a>(&'a self) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::run_scheduler_now(self).await?) })
    }

    fn check_backlog<'a>(&'a self) -> ServiceFuture<'a, ()> {
        Box::pin(async move { Ok(ApiClient::check_backlog(self).await?) })
    }

    fn parse_video<'a>(&'a self, share_url: &'a str) -> ServiceFuture<'a, VideoParseInfo> {
        Box::pin(async move { Ok(ApiClient::parse_video(self, share_url).await?) })
    }

    fn fetch_logs<'a>(&'a self) -> ServiceFuture<'a, Vec<String>> {
        Box::pin(async move { Ok(ApiClient::fetch_logs(self).await?) })
    }

    fn set_token(&self, token: Option<String>) {
        ApiClient::set_token(self, token);
    }
}
