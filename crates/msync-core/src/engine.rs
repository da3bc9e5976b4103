use crate::bootstrap::{self, AuthState};
use crate::model::{
    Account, GlobalSettings, SchedulerStatus, ShareDownloadResult, Task, VideoParseInfo,
};
use crate::notify::{Notifier, Severity, TOAST_DURATION};
use crate::poller::{POLL_PERIOD, PollOutcome, TaskPoller};
use crate::prefs::{PreferenceAxis, PreferenceOverride, PreferencePair};
use crate::registry::AccountRegistry;
use crate::service::SyncService;
use crate::session::TokenStore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// User intents and internal timer wakeups, serialized onto the engine's
/// single loop.
#[derive(Debug)]
pub enum Command {
    Login { username: String, password: String },
    Logout,
    ReloadAccounts,
    AddAccount { url: String },
    RefreshAccount { uid: String },
    ToggleAutoUpdate { uid: String, enabled: bool },
    DeleteAccount { uid: String },
    SetPreference {
        uid: String,
        axis: PreferenceAxis,
        value: PreferenceOverride,
    },
    FetchSettings,
    SaveSettings(GlobalSettings),
    ChangePassword {
        old_password: String,
        new_password: String,
    },
    FetchSchedulerStatus,
    RunSchedulerNow,
    CheckBacklog,
    FetchLogs,
    ParseShare { url: String },
    DownloadShare { url: String },
    DismissToast { generation: u64 },
    Shutdown,
}

/// State snapshots pushed to whatever front end is listening.
#[derive(Clone, Debug)]
pub enum Event {
    Auth(AuthState),
    Accounts(Vec<Account>),
    Tasks(Vec<Task>),
    Toast {
        message: String,
        severity: Severity,
        generation: u64,
    },
    ToastCleared,
    Settings(GlobalSettings),
    Scheduler(SchedulerStatus),
    Logs(Vec<String>),
    ShareParsed(VideoParseInfo),
    ShareDownloaded(ShareDownloadResult),
}

/// Supervises the session, the account registry and the task poller on
/// one logical thread. All mutable state is owned here; the UI talks to
/// it exclusively through the command/event channels, so poll ticks,
/// user actions and toast timers can only ever interleave between
/// `.await` points, never race.
pub struct Engine<S> {
    service: S,
    session: TokenStore,
    registry: AccountRegistry,
    poller: TaskPoller,
    notifier: Notifier,
    auth: AuthState,
    poll_interval: Option<Interval>,
    commands: UnboundedSender<Command>,
    events: UnboundedSender<Event>,
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl<S: SyncService> Engine<S> {
    pub fn new(
        service: S,
        session: TokenStore,
        events: UnboundedSender<Event>,
    ) -> (Self, UnboundedSender<Command>, UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Self {
            service,
            session,
            registry: AccountRegistry::new(),
            poller: TaskPoller::new(),
            notifier: Notifier::new(),
            auth: AuthState::Unknown,
            poll_interval: None,
            commands: tx.clone(),
            events,
        };
        (engine, tx, rx)
    }

    pub async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        self.bootstrap().await;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command).await,
                },
                _ = next_tick(&mut self.poll_interval) => self.poll_once().await,
            }
        }
        debug!("engine loop stopped");
    }

    async fn bootstrap(&mut self) {
        self.emit(Event::Auth(AuthState::Unknown));
        match bootstrap::resolve_session(&self.service, &self.session).await {
            AuthState::Authenticated => self.enter_authenticated().await,
            _ => {
                self.auth = AuthState::Unauthenticated;
                self.emit(Event::Auth(self.auth));
            }
        }
    }

    /// Session became valid: one full account load, then start the
    /// fixed-cadence task poll.
    async fn enter_authenticated(&mut self) {
        self.auth = AuthState::Authenticated;
        self.emit(Event::Auth(self.auth));
        self.load_accounts().await;
        let mut interval = tokio::time::interval(POLL_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick; the first poll lands one full
        // period after login, matching the reference cadence.
        interval.reset();
        self.poll_interval = Some(interval);
        info!("session established; task polling started");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Login { username, password } => self.login(username, password).await,
            Command::Logout => self.logout(),
            Command::ReloadAccounts => self.load_accounts().await,
            Command::AddAccount { url } => self.add_account(url).await,
            Command::RefreshAccount { uid } => self.refresh_account(uid).await,
            Command::ToggleAutoUpdate { uid, enabled } => {
                self.toggle_auto_update(uid, enabled).await
            }
            Command::DeleteAccount { uid } => self.delete_account(uid).await,
            Command::SetPreference { uid, axis, value } => {
                self.set_preference(uid, axis, value).await
            }
            Command::FetchSettings => self.fetch_settings().await,
            Command::SaveSettings(settings) => self.save_settings(settings).await,
            Command::ChangePassword {
                old_password,
                new_password,
            } => self.change_password(old_password, new_password).await,
            Command::FetchSchedulerStatus => self.fetch_scheduler_status().await,
            Command::RunSchedulerNow => self.run_scheduler_now().await,
            Command::CheckBacklog => self.check_backlog().await,
            Command::FetchLogs => self.fetch_logs().await,
            Command::ParseShare { url } => self.parse_share(url).await,
            Command::DownloadShare { url } => self.download_share(url).await,
            Command::DismissToast { generation } => {
                if self.notifier.dismiss(generation) {
                    self.emit(Event::ToastCleared);
                }
            }
            Command::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    /// One poll tick: fetch, diff, maybe reconcile. A failed fetch keeps
    /// the previous snapshot and the interval running; the next tick is
    /// the retry.
    async fn poll_once(&mut self) {
        if self.auth != AuthState::Authenticated {
            return;
        }
        match self.service.active_tasks().await {
            Ok(tasks) => {
                let outcome = self.poller.observe(&tasks);
                self.emit(Event::Tasks(tasks));
                if outcome == PollOutcome::Reconcile {
                    info!("active task set shrank; reloading accounts");
                    self.load_accounts().await;
                }
            }
            Err(err) => {
                warn!(error = %err, "task poll failed");
            }
        }
    }

    async fn login(&mut self, username: String, password: String) {
        match self.service.login(&username, &password).await {
            Ok(token) => {
                self.service.set_token(Some(token.clone()));
                if let Err(err) = self.session.store(token) {
                    warn!(error = %err, "failed to persist credential");
                }
                info!(user = %username, "logged in");
                self.enter_authenticated().await;
                self.show_toast("logged in", Severity::Success);
            }
            Err(err) => {
                warn!(error = %err, "login rejected");
                self.auth = AuthState::Unauthenticated;
                self.emit(Event::Auth(self.auth));
                self.show_toast("login failed, check username and password", Severity::Error);
            }
        }
    }

    /// Local-only teardown: drop the interval before anything else so no
    /// tick can fire mid-cleanup, then clear every piece of session
    /// state. The server-side token is left to expire.
    fn logout(&mut self) {
        self.poll_interval = None;
        self.poller.reset();
        self.registry.clear();
        self.service.set_token(None);
        if let Err(err) = self.session.clear() {
            warn!(error = %err, "failed to remove stored credential");
        }
        self.auth = AuthState::Unauthenticated;
        self.emit(Event::Auth(self.auth));
        self.emit(Event::Accounts(Vec::new()));
        self.emit(Event::Tasks(Vec::new()));
        info!("logged out");
        self.show_toast("logged out", Severity::Success);
    }

    async fn load_accounts(&mut self) {
        match self.service.list_accounts().await {
            Ok(accounts) => {
                self.registry.replace_all(accounts);
                self.emit(Event::Accounts(self.registry.accounts().to_vec()));
            }
            Err(err) => {
                warn!(error = %err, "account load failed");
                self.show_toast("failed to load accounts", Severity::Error);
            }
        }
    }

    /// No local placeholder for a new account: the server owns creation,
    /// we re-load the full list right away and accept the delay until
    /// the entry shows up.
    async fn add_account(&mut self, url: String) {
        match self.service.add_account(&url).await {
            Ok(()) => {
                self.show_toast("account queued for tracking", Severity::Success);
                self.load_accounts().await;
            }
            Err(err) => {
                warn!(error = %err, url = %url, "add account failed");
                self.show_toast("failed to queue account", Severity::Error);
            }
        }
    }

    async fn refresh_account(&mut self, uid: String) {
        let sec_user_id = self
            .registry
            .get(&uid)
            .map(|account| account.sec_user_id_or_empty().to_string())
            .unwrap_or_default();
        match self.service.refresh_account(&sec_user_id).await {
            Ok(()) => self.show_toast("incremental sync started", Severity::Success),
            Err(err) => {
                warn!(error = %err, uid = %uid, "refresh failed");
                self.show_toast("sync failed", Severity::Error);
            }
        }
    }

    async fn toggle_auto_update(&mut self, uid: String, enabled: bool) {
        match self.service.toggle_auto_update(&uid, enabled).await {
            Ok(()) => {
                self.registry.apply(&uid, |account| account.auto_update = enabled);
                self.emit(Event::Accounts(self.registry.accounts().to_vec()));
                let message = if enabled {
                    "auto sync enabled"
                } else {
                    "auto sync disabled"
                };
                self.show_toast(message, Severity::Success);
            }
            Err(err) => {
                warn!(error = %err, uid = %uid, "auto sync toggle failed");
                self.show_toast("failed to update auto sync", Severity::Error);
            }
        }
    }

    async fn delete_account(&mut self, uid: String) {
        match self.service.delete_account(&uid).await {
            Ok(()) => {
                self.registry.remove(&uid);
                self.emit(Event::Accounts(self.registry.accounts().to_vec()));
                self.show_toast("account and its data deleted", Severity::Success);
            }
            Err(err) => {
                warn!(error = %err, uid = %uid, "delete failed");
                self.show_toast("delete failed", Severity::Error);
            }
        }
    }

    async fn set_preference(
        &mut self,
        uid: String,
        axis: PreferenceAxis,
        value: PreferenceOverride,
    ) {
        let Some(account) = self.registry.get(&uid) else {
            warn!(uid = %uid, "preference change for unknown account");
            return;
        };
        let pair = PreferencePair::for_change(account, axis, value);
        match self.service.update_preference(&uid, pair).await {
            Ok(()) => {
                self.registry.apply(&uid, |account| pair.apply_to(account));
                self.emit(Event::Accounts(self.registry.accounts().to_vec()));
                self.show_toast("preferences updated", Severity::Success);
            }
            Err(err) => {
                warn!(error = %err, uid = %uid, "preference update failed");
                self.show_toast("failed to update preferences", Severity::Error);
            }
        }
    }

    async fn fetch_settings(&mut self) {
        match self.service.settings().await {
            Ok(settings) => self.emit(Event::Settings(settings)),
            Err(err) => {
                warn!(error = %err, "settings load failed");
                self.show_toast("failed to load settings", Severity::Error);
            }
        }
    }

    async fn save_settings(&mut self, settings: GlobalSettings) {
        match self.service.update_settings(&settings).await {
            Ok(()) => {
                self.emit(Event::Settings(settings));
                self.show_toast("settings saved", Severity::Success);
            }
            Err(err) => {
                warn!(error = %err, "settings save failed");
                self.show_toast("failed to save settings", Severity::Error);
            }
        }
    }

    async fn change_password(&mut self, old_password: String, new_password: String) {
        match self
            .service
            .change_password(&old_password, &new_password)
            .await
        {
            Ok(()) => self.show_toast("password changed", Severity::Success),
            Err(err) => {
                warn!(error = %err, "password change failed");
                self.show_toast("password change failed", Severity::Error);
            }
        }
    }

    async fn fetch_scheduler_status(&mut self) {
        match self.service.scheduler_status().await {
            Ok(status) => self.emit(Event::Scheduler(status)),
            // Read-only status poll; failures are transient, no toast.
            Err(err) => debug!(error = %err, "scheduler status fetch failed"),
        }
    }

    async fn run_scheduler_now(&mut self) {
        match self.service.run_scheduler_now().await {
            Ok(()) => self.show_toast("scheduler run started", Severity::Success),
            Err(err) => {
                warn!(error = %err, "scheduler trigger failed");
                self.show_toast("failed to start scheduler run", Severity::Error);
            }
        }
    }

    async fn check_backlog(&mut self) {
        match self.service.check_backlog().await {
            Ok(()) => self.show_toast("backlog scan started", Severity::Success),
            Err(err) => {
                warn!(error = %err, "backlog scan trigger failed");
                self.show_toast("failed to start backlog scan", Severity::Error);
            }
        }
    }

    async fn fetch_logs(&mut self) {
        match self.service.fetch_logs().await {
            Ok(lines) => self.emit(Event::Logs(lines)),
            Err(err) => debug!(error = %err, "log fetch failed"),
        }
    }

    async fn parse_share(&mut self, url: String) {
        match self.service.parse_video(&url).await {
            Ok(info) => self.emit(Event::ShareParsed(info)),
            Err(err) => {
                warn!(error = %err, "share link parse failed");
                self.show_toast("failed to parse share link", Severity::Error);
            }
        }
    }

    async fn download_share(&mut self, url: String) {
        match self.service.download_share_url(&url).await {
            Ok(result) => {
                self.emit(Event::ShareDownloaded(result));
                self.show_toast("download complete", Severity::Success);
            }
            Err(err) => {
                warn!(error = %err, "share download failed");
                self.show_toast("download failed", Severity::Error);
            }
        }
    }

    /// Publish a toast and arm its dismiss timer. The timer carries the
    /// toast's generation, so if another toast replaces this one first
    /// the dismissal becomes a no-op instead of hiding the newer one.
    fn show_toast(&mut self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        let generation = self.notifier.show(message.clone(), severity);
        self.emit(Event::Toast {
            message,
            severity,
            generation,
        });
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TOAST_DURATION).await;
            let _ = commands.send(Command::DismissToast { generation });
        });
    }

    fn emit(&self, event: Event) {
        // A dropped receiver means the UI is gone; the loop will stop
        // when the command channel closes.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, TaskStatus};
    use crate::service::ServiceFuture;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[derive(Default)]
    struct MockState {
        login_ok: bool,
        session_valid: bool,
        accounts: RefCell<Vec<Account>>,
        list_calls: Cell<usize>,
        task_calls: Cell<usize>,
        task_batches: RefCell<VecDeque<Result<Vec<Task>, ()>>>,
        preference: RefCell<Option<(String, PreferencePair)>>,
        token: RefCell<Option<String>>,
    }

    impl MockState {
        fn push_tasks(&self, batch: Result<Vec<Task>, ()>) {
            self.task_batches.borrow_mut().push_back(batch);
        }
    }

    #[derive(Clone)]
    struct MockService(Rc<MockState>);

    impl SyncService for MockService {
        fn login<'a>(&'a self, _: &'a str, _: &'a str) -> ServiceFuture<'a, String> {
            let ok = self.0.login_ok;
            Box::pin(async move {
                if ok {
                    Ok("issued-token".to_string())
                } else {
                    anyhow::bail!("401 unauthorized")
                }
            })
        }

        fn check_session<'a>(&'a self) -> ServiceFuture<'a, bool> {
            let valid = self.0.session_valid;
            Box::pin(async move { Ok(valid) })
        }

        fn change_password<'a>(&'a self, _: &'a str, _: &'a str) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn settings<'a>(&'a self) -> ServiceFuture<'a, GlobalSettings> {
            Box::pin(async {
                Ok(GlobalSettings {
                    download_video: true,
                    download_note: false,
                    auto_update_interval: 120,
                })
            })
        }

        fn update_settings<'a>(&'a self, _: &'a GlobalSettings) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn update_preference<'a>(
            &'a self,
            uid: &'a str,
            pair: PreferencePair,
        ) -> ServiceFuture<'a, ()> {
            Box::pin(async move {
                *self.0.preference.borrow_mut() = Some((uid.to_string(), pair));
                Ok(())
            })
        }

        fn list_accounts<'a>(&'a self) -> ServiceFuture<'a, Vec<Account>> {
            self.0.list_calls.set(self.0.list_calls.get() + 1);
            let accounts = self.0.accounts.borrow().clone();
            Box::pin(async move { Ok(accounts) })
        }

        fn add_account<'a>(&'a self, _: &'a str) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn refresh_account<'a>(&'a self, _: &'a str) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn toggle_auto_update<'a>(&'a self, _: &'a str, _: bool) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn delete_account<'a>(&'a self, _: &'a str) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn download_share_url<'a>(
            &'a self,
            _: &'a str,
        ) -> ServiceFuture<'a, ShareDownloadResult> {
            Box::pin(async {
                Ok(ShareDownloadResult {
                    filename: "clip.mp4".into(),
                    downloaded: true,
                })
            })
        }

        fn active_tasks<'a>(&'a self) -> ServiceFuture<'a, Vec<Task>> {
            self.0.task_calls.set(self.0.task_calls.get() + 1);
            let batch = self.0.task_batches.borrow_mut().pop_front();
            Box::pin(async move {
                match batch {
                    Some(Ok(tasks)) => Ok(tasks),
                    Some(Err(())) => anyhow::bail!("connection reset"),
                    None => Ok(Vec::new()),
                }
            })
        }

        fn scheduler_status<'a>(&'a self) -> ServiceFuture<'a, SchedulerStatus> {
            Box::pin(async {
                Ok(SchedulerStatus {
                    last_run: None,
                    next_run: None,
                    is_running: false,
                })
            })
        }

        fn run_scheduler_now<'a>(&'a self) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn check_backlog<'a>(&'a self) -> ServiceFuture<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn parse_video<'a>(&'a self, _: &'a str) -> ServiceFuture<'a, VideoParseInfo> {
            Box::pin(async {
                Ok(VideoParseInfo {
                    aweme_id: "a1".into(),
                    aweme_type: 0,
                    desc: None,
                    video_url: None,
                    cover_url: None,
                    author_name: None,
                    author_avatar: None,
                    platform: Platform::Douyin,
                })
            })
        }

        fn fetch_logs<'a>(&'a self) -> ServiceFuture<'a, Vec<String>> {
            Box::pin(async { Ok(vec!["line".to_string()]) })
        }

        fn set_token(&self, token: Option<String>) {
            *self.0.token.borrow_mut() = token;
        }
    }

    fn running_task(id: &str, target: &str) -> Task {
        Task {
            id: id.to_string(),
            target_id: target.to_string(),
            status: TaskStatus::Running,
            progress: 40,
            message: None,
            updated_at: 0,
        }
    }

    fn account(uid: &str) -> Account {
        Account {
            uid: uid.to_string(),
            sec_user_id: Some(format!("sec-{uid}")),
            nickname: Some("name".into()),
            avatar_url: None,
            signature: None,
            auto_update: false,
            download_video_override: None,
            download_note_override: Some(false),
            created_at: 0,
            updated_at: 0,
            platform: Platform::Douyin,
        }
    }

    struct Harness {
        commands: UnboundedSender<Command>,
        events: UnboundedReceiver<Event>,
        token_path: PathBuf,
        _tmp: TempDir,
    }

    fn start(state: Rc<MockState>, with_token: bool) -> Harness {
        let tmp = TempDir::new().unwrap();
        let token_path = tmp.path().join("token");
        let mut session = TokenStore::load(&token_path).unwrap();
        if with_token {
            session.store("persisted-token".into()).unwrap();
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (engine, commands, commands_rx) =
            Engine::new(MockService(state), session, events_tx);
        tokio::task::spawn_local(engine.run(commands_rx));
        Harness {
            commands,
            events: events_rx,
            token_path,
            _tmp: tmp,
        }
    }

    async fn next_event(harness: &mut Harness) -> Event {
        timeout(Duration::from_secs(60), harness.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Drain events until one matches, panicking if the well runs dry.
    async fn wait_for(harness: &mut Harness, mut pred: impl FnMut(&Event) -> bool) -> Event {
        for _ in 0..64 {
            let event = next_event(harness).await;
            if pred(&event) {
                return event;
            }
        }
        panic!("expected event never arrived");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_token_resolves_unauthenticated_without_polling() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    session_valid: true,
                    ..Default::default()
                });
                let mut harness = start(state.clone(), false);

                assert!(matches!(
                    next_event(&mut harness).await,
                    Event::Auth(AuthState::Unknown)
                ));
                assert!(matches!(
                    next_event(&mut harness).await,
                    Event::Auth(AuthState::Unauthenticated)
                ));

                tokio::time::sleep(Duration::from_secs(10)).await;
                assert_eq!(state.task_calls.get(), 0);
                assert_eq!(state.list_calls.get(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_session_check_fails_closed() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    session_valid: false,
                    ..Default::default()
                });
                let mut harness = start(state.clone(), true);

                wait_for(&mut harness, |event| {
                    matches!(event, Event::Auth(AuthState::Unauthenticated))
                })
                .await;
                tokio::time::sleep(Duration::from_secs(10)).await;
                assert_eq!(state.task_calls.get(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn shrinking_task_set_reloads_accounts_exactly_once() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    session_valid: true,
                    ..Default::default()
                });
                state.accounts.borrow_mut().push(account("u1"));
                state.push_tasks(Ok(vec![running_task("t1", "u1")]));
                state.push_tasks(Ok(vec![]));
                let mut harness = start(state.clone(), true);

                wait_for(&mut harness, |event| {
                    matches!(event, Event::Tasks(tasks) if tasks.len() == 1)
                })
                .await;
                assert_eq!(state.list_calls.get(), 1);

                wait_for(&mut harness, |event| {
                    matches!(event, Event::Tasks(tasks) if tasks.is_empty())
                })
                .await;
                // Exactly one reload between the two ticks.
                wait_for(&mut harness, |event| matches!(event, Event::Accounts(_))).await;
                assert_eq!(state.list_calls.get(), 2);

                // Subsequent empty snapshots stay quiet.
                tokio::time::sleep(Duration::from_secs(6)).await;
                assert_eq!(state.list_calls.get(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn equal_count_swap_is_not_detected() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    session_valid: true,
                    ..Default::default()
                });
                state.push_tasks(Ok(vec![running_task("t1", "u1")]));
                // t1 finished and t2 started within one tick: the count
                // heuristic cannot see it. Known fidelity gap.
                state.push_tasks(Ok(vec![running_task("t2", "u2")]));
                let mut harness = start(state.clone(), true);

                for _ in 0..2 {
                    wait_for(&mut harness, |event| matches!(event, Event::Tasks(_))).await;
                }
                assert_eq!(state.list_calls.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_previous_snapshot() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    session_valid: true,
                    ..Default::default()
                });
                state.push_tasks(Ok(vec![running_task("t1", "u1")]));
                state.push_tasks(Err(()));
                state.push_tasks(Ok(vec![]));
                let mut harness = start(state.clone(), true);

                // The error tick emits nothing and keeps the loop alive;
                // the empty snapshot after it still diffs against [t1].
                wait_for(&mut harness, |event| {
                    matches!(event, Event::Tasks(tasks) if tasks.is_empty())
                })
                .await;
                wait_for(&mut harness, |event| matches!(event, Event::Accounts(_))).await;
                assert_eq!(state.task_calls.get(), 3);
                assert_eq!(state.list_calls.get(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn logout_clears_everything_and_stops_ticks() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    session_valid: true,
                    ..Default::default()
                });
                state.accounts.borrow_mut().push(account("u1"));
                let mut harness = start(state.clone(), true);

                wait_for(&mut harness, |event| matches!(event, Event::Tasks(_))).await;
                let polls_before = state.task_calls.get();

                harness.commands.send(Command::Logout).unwrap();
                wait_for(&mut harness, |event| {
                    matches!(event, Event::Auth(AuthState::Unauthenticated))
                })
                .await;
                wait_for(&mut harness, |event| {
                    matches!(event, Event::Accounts(accounts) if accounts.is_empty())
                })
                .await;
                wait_for(&mut harness, |event| {
                    matches!(event, Event::Tasks(tasks) if tasks.is_empty())
                })
                .await;

                assert!(state.token.borrow().is_none());
                assert!(!harness.token_path.exists());

                // No poll tick may fire after teardown.
                tokio::time::sleep(Duration::from_secs(10)).await;
                assert_eq!(state.task_calls.get(), polls_before);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_login_persists_nothing() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState::default());
                let mut harness = start(state.clone(), false);

                wait_for(&mut harness, |event| {
                    matches!(event, Event::Auth(AuthState::Unauthenticated))
                })
                .await;

                harness
                    .commands
                    .send(Command::Login {
                        username: "admin".into(),
                        password: "wrong".into(),
                    })
                    .unwrap();

                let event = wait_for(&mut harness, |event| {
                    matches!(event, Event::Toast { .. })
                })
                .await;
                let Event::Toast { severity, .. } = event else {
                    unreachable!()
                };
                assert_eq!(severity, Severity::Error);
                assert!(!harness.token_path.exists());
                assert!(state.token.borrow().is_none());

                tokio::time::sleep(Duration::from_secs(10)).await;
                assert_eq!(state.task_calls.get(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn successful_login_persists_token_and_starts_polling() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    login_ok: true,
                    ..Default::default()
                });
                let mut harness = start(state.clone(), false);

                wait_for(&mut harness, |event| {
                    matches!(event, Event::Auth(AuthState::Unauthenticated))
                })
                .await;
                harness
                    .commands
                    .send(Command::Login {
                        username: "admin".into(),
                        password: "right".into(),
                    })
                    .unwrap();

                wait_for(&mut harness, |event| {
                    matches!(event, Event::Auth(AuthState::Authenticated))
                })
                .await;
                wait_for(&mut harness, |event| matches!(event, Event::Tasks(_))).await;
                assert_eq!(
                    std::fs::read_to_string(&harness.token_path).unwrap(),
                    "issued-token"
                );
                assert_eq!(state.token.borrow().as_deref(), Some("issued-token"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn preference_change_submits_the_complete_pair() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState {
                    session_valid: true,
                    ..Default::default()
                });
                // Current note override is false and must be re-sent.
                state.accounts.borrow_mut().push(account("u1"));
                let mut harness = start(state.clone(), true);

                wait_for(&mut harness, |event| matches!(event, Event::Accounts(_))).await;
                harness
                    .commands
                    .send(Command::SetPreference {
                        uid: "u1".into(),
                        axis: PreferenceAxis::Video,
                        value: PreferenceOverride::ForceOn,
                    })
                    .unwrap();

                let event = wait_for(&mut harness, |event| {
                    matches!(event, Event::Accounts(accounts) if !accounts.is_empty())
                })
                .await;
                let Event::Accounts(accounts) = event else {
                    unreachable!()
                };
                assert_eq!(accounts[0].download_video_override, Some(true));
                assert_eq!(accounts[0].download_note_override, Some(false));

                let submitted = state.preference.borrow().clone().unwrap();
                assert_eq!(submitted.0, "u1");
                assert_eq!(submitted.1.video, Some(true));
                assert_eq!(submitted.1.note, Some(false));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_toast_survives_the_old_dismiss_timer() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let state = Rc::new(MockState::default());
                let mut harness = start(state, false);

                wait_for(&mut harness, |event| {
                    matches!(event, Event::Auth(AuthState::Unauthenticated))
                })
                .await;

                // Two failing logins inside one dismiss window: toast B
                // replaces toast A, A's timer must not clear B.
                for _ in 0..2 {
                    harness
                        .commands
                        .send(Command::Login {
                            username: "admin".into(),
                            password: "wrong".into(),
                        })
                        .unwrap();
                    wait_for(&mut harness, |event| matches!(event, Event::Toast { .. }))
                        .await;
                }

                let mut cleared = 0;
                let deadline = tokio::time::sleep(Duration::from_secs(10));
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        event = harness.events.recv() => {
                            if let Some(Event::ToastCleared) = event {
                                cleared += 1;
                            }
                        }
                        _ = &mut deadline => break,
                    }
                }
                // A's timer was a no-op; only B's timer cleared the slot.
                assert_eq!(cleared, 1);
            })
            .await;
    }
}
