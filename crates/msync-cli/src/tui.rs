use crate::logging::LogBuffer;
use anyhow::Context as _;
use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use msync_api::ApiClient;
use msync_core::bootstrap::AuthState;
use msync_core::engine::{Command, Engine, Event};
use msync_core::model::{Account, GlobalSettings, SchedulerStatus, ShareDownloadResult, Task, VideoParseInfo};
use msync_core::notify::Severity;
use msync_core::prefs::{PreferenceAxis, PreferenceOverride};
use msync_core::registry::AccountRegistry;
use msync_core::session::{TokenStore, default_token_path};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};
use std::io::{self, Stdout};
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

const TICK_RATE: Duration = Duration::from_millis(200);
/// Refresh cadence for the scheduler and log views while they are open.
const PAGE_REFRESH: Duration = Duration::from_secs(5);
const LOG_PANEL_HEIGHT: u16 = 7;
const LOG_PANEL_BORDER_HEIGHT: u16 = 2;
const PROGRESS_CELLS: usize = 10;

pub fn run(base_url: &str, log_buffer: LogBuffer) -> anyhow::Result<()> {
    let service = ApiClient::new(base_url)?;
    let session = TokenStore::load(&default_token_path()?)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (engine, commands, commands_rx) = Engine::new(service, session, events_tx);

    // The engine runs on its own thread with a current-thread runtime;
    // the TUI thread only ever touches the channels.
    let worker = thread::Builder::new()
        .name("engine".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!(error = %err, "failed to start engine runtime");
                    return;
                }
            };
            runtime.block_on(engine.run(commands_rx));
        })
        .context("spawn engine thread")?;

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    info!("starting terminal ui");
    let app = App::new(commands.clone(), events_rx, log_buffer);
    let result = run_app(&mut terminal, app);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    let _ = commands.send(Command::Shutdown);
    let _ = worker.join();
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: App,
) -> anyhow::Result<()> {
    loop {
        app.drain_engine_events();
        app.refresh_mounted_view();
        terminal.draw(|frame| app.draw(frame))?;

        if event::poll(TICK_RATE)?
            && let TermEvent::Key(key) = event::read()?
            && app.handle_key(key)
        {
            return Ok(());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum View {
    Login,
    Accounts,
    AccountAdd,
    Tasks,
    Scheduler,
    Logs,
    Settings,
    Password,
    Share,
}

struct InputField {
    label: &'static str,
    value: String,
    mask: bool,
}

impl InputField {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            value: String::new(),
            mask: false,
        }
    }

    fn masked(label: &'static str) -> Self {
        Self {
            label,
            value: String::new(),
            mask: true,
        }
    }

    fn display_value(&self) -> String {
        if self.mask {
            "*".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }

    fn push(&mut self, character: char) {
        self.value.push(character);
    }

    fn pop(&mut self) {
        self.value.pop();
    }
}

struct App {
    view: View,
    commands: UnboundedSender<Command>,
    events: UnboundedReceiver<Event>,
    log_buffer: LogBuffer,
    auth: AuthState,
    registry: AccountRegistry,
    tasks: Vec<Task>,
    settings_draft: Option<GlobalSettings>,
    scheduler: Option<SchedulerStatus>,
    server_logs: Vec<String>,
    parsed: Option<VideoParseInfo>,
    downloaded: Option<ShareDownloadResult>,
    toast: Option<(String, Severity)>,
    selected: usize,
    search: String,
    searching: bool,
    log_filter: String,
    log_filtering: bool,
    input_fields: Vec<InputField>,
    input_index: usize,
    log_scroll: usize,
    last_page_refresh: Instant,
}

fn login_fields() -> Vec<InputField> {
    vec![InputField::new("Username"), InputField::masked("Password")]
}

impl App {
    fn new(
        commands: UnboundedSender<Command>,
        events: UnboundedReceiver<Event>,
        log_buffer: LogBuffer,
    ) -> Self {
        Self {
            view: View::Login,
            commands,
            events,
            log_buffer,
            auth: AuthState::Unknown,
            registry: AccountRegistry::new(),
            tasks: Vec::new(),
            settings_draft: None,
            scheduler: None,
            server_logs: Vec::new(),
            parsed: None,
            downloaded: None,
            toast: None,
            selected: 0,
            search: String::new(),
            searching: false,
            log_filter: String::new(),
            log_filtering: false,
            input_fields: login_fields(),
            input_index: 0,
            log_scroll: 0,
            last_page_refresh: Instant::now(),
        }
    }

    fn send(&self, command: Command) {
        let _ = self.commands.send(command);
    }

    fn drain_engine_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Auth(state) => {
                self.auth = state;
                match state {
                    AuthState::Authenticated => {
                        if self.view == View::Login {
                            self.view = View::Accounts;
                        }
                    }
                    AuthState::Unauthenticated => {
                        self.view = View::Login;
                        self.input_fields = login_fields();
                        self.input_index = 0;
                        self.searching = false;
                        self.search.clear();
                        self.selected = 0;
                    }
                    AuthState::Unknown => {}
                }
            }
            Event::Accounts(accounts) => {
                self.registry.replace_all(accounts);
                self.clamp_selection();
            }
            Event::Tasks(tasks) => self.tasks = tasks,
            Event::Toast {
                message, severity, ..
            } => self.toast = Some((message, severity)),
            Event::ToastCleared => self.toast = None,
            Event::Settings(settings) => self.settings_draft = Some(settings),
            Event::Scheduler(status) => self.scheduler = Some(status),
            Event::Logs(lines) => {
                self.server_logs = lines;
                self.log_scroll = 0;
            }
            Event::ShareParsed(info) => self.parsed = Some(info),
            Event::ShareDownloaded(result) => self.downloaded = Some(result),
        }
    }

    /// While the scheduler or log view is open, ask the engine for a
    /// fresh snapshot every few seconds. Nothing is fetched for views
    /// the user is not looking at.
    fn refresh_mounted_view(&mut self) {
        if self.last_page_refresh.elapsed() < PAGE_REFRESH {
            return;
        }
        self.last_page_refresh = Instant::now();
        match self.view {
            View::Tasks | View::Scheduler => self.send(Command::FetchSchedulerStatus),
            View::Logs => self.send(Command::FetchLogs),
            _ => {}
        }
    }

    fn filtered_logs(&self) -> Vec<&String> {
        if self.log_filter.is_empty() {
            return self.server_logs.iter().collect();
        }
        let needle = self.log_filter.to_lowercase();
        self.server_logs
            .iter()
            .filter(|line| line.to_lowercase().contains(&needle))
            .collect()
    }

    fn visible_accounts(&self) -> Vec<&Account> {
        self.registry.filter(&self.search)
    }

    fn clamp_selection(&mut self) {
        let visible = self.visible_accounts().len();
        if visible == 0 {
            self.selected = 0;
        } else if self.selected >= visible {
            self.selected = visible - 1;
        }
    }

    fn selected_account(&self) -> Option<Account> {
        self.visible_accounts().get(self.selected).cloned().cloned()
    }

    fn open_view(&mut self, view: View) {
        self.view = view;
        self.input_index = 0;
        match view {
            View::AccountAdd => self.input_fields = vec![InputField::new("Profile URL")],
            View::Share => {
                self.input_fields = vec![InputField::new("Share link")];
                self.parsed = None;
                self.downloaded = None;
            }
            View::Password => {
                self.input_fields = vec![
                    InputField::masked("Current password"),
                    InputField::masked("New password"),
                ];
            }
            View::Settings => self.send(Command::FetchSettings),
            View::Tasks | View::Scheduler => {
                self.send(Command::FetchSchedulerStatus);
                self.last_page_refresh = Instant::now();
            }
            View::Logs => {
                self.send(Command::FetchLogs);
                self.last_page_refresh = Instant::now();
            }
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(LOG_PANEL_HEIGHT),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let session = match self.auth {
            AuthState::Unknown => "checking session".to_string(),
            AuthState::Unauthenticated => "logged out".to_string(),
            AuthState::Authenticated => format!(
                "accounts: {} | active tasks: {}",
                self.registry.accounts().len(),
                self.tasks.len()
            ),
        };
        let header = Paragraph::new(format!("Media Sync — {session}"))
            .block(Block::default().borders(Borders::ALL).title("msync"));
        frame.render_widget(header, layout[0]);

        match self.view {
            View::Login => self.draw_form(frame, layout[1], "Sign In"),
            View::Accounts => self.draw_accounts(frame, layout[1]),
            View::AccountAdd => self.draw_form(frame, layout[1], "Track New Account"),
            View::Tasks => self.draw_tasks(frame, layout[1]),
            View::Scheduler => self.draw_scheduler(frame, layout[1]),
            View::Logs => self.draw_server_logs(frame, layout[1]),
            View::Settings => self.draw_settings(frame, layout[1]),
            View::Password => self.draw_form(frame, layout[1], "Change Password"),
            View::Share => self.draw_share(frame, layout[1]),
        }

        self.draw_log_panel(frame, layout[2]);
        self.draw_footer(frame, layout[3]);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame, area: Rect) {
        let widget = match &self.toast {
            Some((message, severity)) => {
                let color = match severity {
                    Severity::Success => Color::Green,
                    Severity::Error => Color::Red,
                };
                Paragraph::new(message.as_str())
                    .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
                    .block(Block::default().borders(Borders::ALL).title("Notice"))
            }
            None => Paragraph::new(self.footer_text())
                .block(Block::default().borders(Borders::ALL).title("Help")),
        };
        frame.render_widget(widget, area);
    }

    fn footer_text(&self) -> String {
        match self.view {
            View::Login => "Tab: next field | Enter: sign in | Esc: quit".to_string(),
            View::Accounts => {
                if self.searching {
                    "type to filter | Enter: keep filter | Esc: clear".to_string()
                } else {
                    "Up/Down | a: add | r: sync | t: auto | v/n: prefs | d: delete | /: search | 2-6: views | p: password | x: logout | q: quit"
                        .to_string()
                }
            }
            View::AccountAdd => "Enter: submit | Esc: back".to_string(),
            View::Tasks => "b: backlog scan | Esc: back | q: quit".to_string(),
            View::Scheduler => "r: run now | b: backlog scan | Esc: back".to_string(),
            View::Logs => {
                if self.log_filtering {
                    "type to filter | Enter: keep filter | Esc: clear".to_string()
                } else {
                    "Up/Down: scroll | /: filter | Esc: back".to_string()
                }
            }
            View::Settings => {
                "v: video | n: notes | +/-: interval | Enter: save | p: password | Esc: back"
                    .to_string()
            }
            View::Password => "Tab: next field | Enter: submit | Esc: back".to_string(),
            View::Share => "Enter: parse | Ctrl+D: download | Esc: back".to_string(),
        }
    }

    fn draw_form(&self, frame: &mut ratatui::Frame, area: Rect, title: &str) {
        let mut lines = Vec::new();
        for (idx, field) in self.input_fields.iter().enumerate() {
            let marker = if idx == self.input_index { "> " } else { "  " };
            let mut line = Line::from(Span::raw(format!(
                "{marker}{}: {}",
                field.label,
                field.display_value()
            )));
            if idx == self.input_index {
                line = line.style(Style::default().add_modifier(Modifier::BOLD));
            }
            lines.push(line);
        }
        let widget = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title.to_string()));
        frame.render_widget(widget, area);
    }

    fn draw_accounts(&self, frame: &mut ratatui::Frame, area: Rect) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let search_title = if self.searching { "Search (typing)" } else { "Search" };
        let search = Paragraph::new(self.search.as_str())
            .block(Block::default().borders(Borders::ALL).title(search_title));
        frame.render_widget(search, layout[0]);

        let visible = self.visible_accounts();
        let items: Vec<ListItem> = visible
            .iter()
            .enumerate()
            .map(|(idx, account)| {
                let busy = self
                    .tasks
                    .iter()
                    .any(|task| task.targets_account(account));
                let marker = if busy { "* " } else { "  " };
                let auto = if account.auto_update { "auto" } else { "manual" };
                let mut line = Line::from(Span::raw(format!(
                    "{marker}{} ({}) | {} | {} | video:{} notes:{}",
                    account.display_name(),
                    account.uid,
                    account.platform,
                    auto,
                    override_label(account.download_video_override),
                    override_label(account.download_note_override),
                )));
                if idx == self.selected {
                    line = line.style(Style::default().add_modifier(Modifier::BOLD));
                }
                ListItem::new(line)
            })
            .collect();
        let title = format!("Accounts ({}/{})", visible.len(), self.registry.accounts().len());
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(list, layout[1]);
    }

    fn draw_tasks(&self, frame: &mut ratatui::Frame, area: Rect) {
        let mut lines = Vec::new();
        if let Some(status) = &self.scheduler {
            lines.push(Line::from(Span::raw(format!(
                "scheduler: {} | next run: {}",
                if status.is_running { "running" } else { "idle" },
                status
                    .next_run
                    .map(format_unix_timestamp)
                    .unwrap_or_else(|| "not scheduled".to_string())
            ))));
            lines.push(Line::from(Span::raw("")));
        }
        if self.tasks.is_empty() {
            lines.push(Line::from(Span::raw("No active tasks.")));
        }
        for task in &self.tasks {
            let label = if task.is_global_scan() {
                "global scan".to_string()
            } else {
                self.registry
                    .accounts()
                    .iter()
                    .find(|account| task.targets_account(account))
                    .map(|account| account.display_name().to_string())
                    .unwrap_or_else(|| task.target_id.clone())
            };
            let message = task.message.as_deref().unwrap_or("");
            lines.push(Line::from(Span::raw(format!(
                "{} | {} {:>3}% | {:?} {}",
                label,
                progress_bar(task.progress),
                task.progress,
                task.status,
                message
            ))));
        }
        let widget = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Active Tasks"));
        frame.render_widget(widget, area);
    }

    fn draw_scheduler(&self, frame: &mut ratatui::Frame, area: Rect) {
        let lines = match &self.scheduler {
            Some(status) => vec![
                Line::from(Span::raw(format!(
                    "running: {}",
                    if status.is_running { "yes" } else { "no" }
                ))),
                Line::from(Span::raw(format!(
                    "last run: {}",
                    status
                        .last_run
                        .map(format_unix_timestamp)
                        .unwrap_or_else(|| "never".to_string())
                ))),
                Line::from(Span::raw(format!(
                    "next run: {}",
                    status
                        .next_run
                        .map(format_unix_timestamp)
                        .unwrap_or_else(|| "not scheduled".to_string())
                ))),
            ],
            None => vec![Line::from(Span::raw("Loading scheduler status..."))],
        };
        let widget = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Scheduler"));
        frame.render_widget(widget, area);
    }

    fn draw_server_logs(&self, frame: &mut ratatui::Frame, area: Rect) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let filter_title = if self.log_filtering {
            "Filter (typing)"
        } else {
            "Filter"
        };
        let filter = Paragraph::new(self.log_filter.as_str())
            .block(Block::default().borders(Borders::ALL).title(filter_title));
        frame.render_widget(filter, layout[0]);

        let matching = self.filtered_logs();
        let max_lines = layout[1].height.saturating_sub(LOG_PANEL_BORDER_HEIGHT) as usize;
        let end = matching.len().saturating_sub(self.log_scroll);
        let start = end.saturating_sub(max_lines);
        let lines: Vec<Line> = matching[start..end]
            .iter()
            .map(|line| Line::from(Span::raw(line.as_str())))
            .collect();
        let title = format!("Service Logs ({}/{})", matching.len(), self.server_logs.len());
        let widget = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(widget, layout[1]);
    }

    fn draw_settings(&self, frame: &mut ratatui::Frame, area: Rect) {
        let lines = match &self.settings_draft {
            Some(draft) => vec![
                Line::from(Span::raw(format!(
                    "download videos by default: {}",
                    if draft.download_video { "on" } else { "off" }
                ))),
                Line::from(Span::raw(format!(
                    "download notes by default: {}",
                    if draft.download_note { "on" } else { "off" }
                ))),
                Line::from(Span::raw(format!(
                    "auto sync interval: {} minutes",
                    draft.auto_update_interval
                ))),
                Line::from(Span::raw("")),
                Line::from(Span::raw(
                    "Per-account overrides win over these defaults.",
                )),
            ],
            None => vec![Line::from(Span::raw("Loading settings..."))],
        };
        let widget = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Settings"));
        frame.render_widget(widget, area);
    }

    fn draw_share(&self, frame: &mut ratatui::Frame, area: Rect) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let value = self
            .input_fields
            .first()
            .map(|field| field.display_value())
            .unwrap_or_default();
        let input = Paragraph::new(value)
            .block(Block::default().borders(Borders::ALL).title("Share link"));
        frame.render_widget(input, layout[0]);

        let mut lines = Vec::new();
        if let Some(info) = &self.parsed {
            lines.push(Line::from(Span::raw(format!(
                "parsed {} ({})",
                info.aweme_id, info.platform
            ))));
            if let Some(author) = &info.author_name {
                lines.push(Line::from(Span::raw(format!("author: {author}"))));
            }
            if let Some(desc) = &info.desc {
                lines.push(Line::from(Span::raw(format!("description: {desc}"))));
            }
            if let Some(url) = &info.video_url {
                lines.push(Line::from(Span::raw(format!("video: {url}"))));
            }
        }
        if let Some(result) = &self.downloaded {
            lines.push(Line::from(Span::raw(format!(
                "saved as {} ({})",
                result.filename,
                if result.downloaded { "new" } else { "already present" }
            ))));
        }
        if lines.is_empty() {
            lines.push(Line::from(Span::raw(
                "Paste a share link, then parse or download it.",
            )));
        }
        let widget = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Result"));
        frame.render_widget(widget, layout[1]);
    }

    fn draw_log_panel(&self, frame: &mut ratatui::Frame, area: Rect) {
        let max_lines = area.height.saturating_sub(LOG_PANEL_BORDER_HEIGHT) as usize;
        if max_lines == 0 {
            return;
        }
        let entries = self.log_buffer.entries();
        let mut lines = Vec::new();
        if entries.is_empty() {
            lines.push(Line::from(Span::raw("No log messages yet.")));
        } else {
            let start = entries.len().saturating_sub(max_lines);
            for entry in entries[start..].iter() {
                lines.push(Line::from(Span::raw(entry.format_compact())));
            }
        }
        let widget = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Client Log"));
        frame.render_widget(widget, area);
    }

    /// Returns true when the application should exit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match self.view {
            View::Login => self.handle_login(key),
            View::Accounts => self.handle_accounts(key),
            View::AccountAdd => self.handle_account_add(key),
            View::Tasks => self.handle_tasks(key),
            View::Scheduler => self.handle_scheduler(key),
            View::Logs => self.handle_logs(key),
            View::Settings => self.handle_settings(key),
            View::Password => self.handle_password(key),
            View::Share => self.handle_share(key),
        }
    }

    fn handle_login(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::Tab | KeyCode::Down => {
                self.input_index = (self.input_index + 1) % self.input_fields.len();
            }
            KeyCode::Up => {
                self.input_index =
                    (self.input_index + self.input_fields.len() - 1) % self.input_fields.len();
            }
            KeyCode::Enter => {
                let username = self.input_fields[0].value.clone();
                let password = self.input_fields[1].value.clone();
                if !username.is_empty() && !password.is_empty() {
                    self.input_fields[1].value.clear();
                    self.send(Command::Login { username, password });
                }
            }
            KeyCode::Backspace => self.input_fields[self.input_index].pop(),
            KeyCode::Char(character) => self.input_fields[self.input_index].push(character),
            _ => {}
        }
        false
    }

    fn handle_accounts(&mut self, key: KeyEvent) -> bool {
        if self.searching {
            match key.code {
                KeyCode::Esc => {
                    self.searching = false;
                    self.search.clear();
                    self.clamp_selection();
                }
                KeyCode::Enter => self.searching = false,
                KeyCode::Backspace => {
                    self.search.pop();
                    self.clamp_selection();
                }
                KeyCode::Char(character) => {
                    self.search.push(character);
                    self.selected = 0;
                }
                _ => {}
            }
            return false;
        }
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('/') => self.searching = true,
            KeyCode::Down => {
                let visible = self.visible_accounts().len();
                if visible > 0 {
                    self.selected = (self.selected + 1) % visible;
                }
            }
            KeyCode::Up => {
                let visible = self.visible_accounts().len();
                if visible > 0 {
                    self.selected = (self.selected + visible - 1) % visible;
                }
            }
            KeyCode::Char('a') => self.open_view(View::AccountAdd),
            KeyCode::Char('g') => self.send(Command::ReloadAccounts),
            KeyCode::Char('r') => {
                if let Some(account) = self.selected_account() {
                    self.send(Command::RefreshAccount { uid: account.uid });
                }
            }
            KeyCode::Char('t') => {
                if let Some(account) = self.selected_account() {
                    self.send(Command::ToggleAutoUpdate {
                        uid: account.uid,
                        enabled: !account.auto_update,
                    });
                }
            }
            KeyCode::Char('d') => {
                if let Some(account) = self.selected_account() {
                    self.send(Command::DeleteAccount { uid: account.uid });
                }
            }
            KeyCode::Char('v') => {
                if let Some(account) = self.selected_account() {
                    self.send(Command::SetPreference {
                        uid: account.uid,
                        axis: PreferenceAxis::Video,
                        value: next_override(account.download_video_override),
                    });
                }
            }
            KeyCode::Char('n') => {
                if let Some(account) = self.selected_account() {
                    self.send(Command::SetPreference {
                        uid: account.uid,
                        axis: PreferenceAxis::Note,
                        value: next_override(account.download_note_override),
                    });
                }
            }
            KeyCode::Char('2') => self.open_view(View::Tasks),
            KeyCode::Char('3') => self.open_view(View::Scheduler),
            KeyCode::Char('4') => self.open_view(View::Logs),
            KeyCode::Char('5') => self.open_view(View::Settings),
            KeyCode::Char('6') => self.open_view(View::Share),
            KeyCode::Char('p') => self.open_view(View::Password),
            KeyCode::Char('x') => self.send(Command::Logout),
            _ => {}
        }
        false
    }

    fn handle_account_add(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => self.view = View::Accounts,
            KeyCode::Enter => {
                let url = self.input_fields[0].value.clone();
                if !url.is_empty() {
                    self.send(Command::AddAccount { url });
                    self.view = View::Accounts;
                }
            }
            KeyCode::Backspace => self.input_fields[0].pop(),
            KeyCode::Char(character) => self.input_fields[0].push(character),
            _ => {}
        }
        false
    }

    fn handle_tasks(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Esc => self.view = View::Accounts,
            KeyCode::Char('b') => self.send(Command::CheckBacklog),
            _ => {}
        }
        false
    }

    fn handle_scheduler(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => self.view = View::Accounts,
            KeyCode::Char('r') => self.send(Command::RunSchedulerNow),
            KeyCode::Char('b') => self.send(Command::CheckBacklog),
            _ => {}
        }
        false
    }

    fn handle_logs(&mut self, key: KeyEvent) -> bool {
        if self.log_filtering {
            match key.code {
                KeyCode::Esc => {
                    self.log_filtering = false;
                    self.log_filter.clear();
                }
                KeyCode::Enter => self.log_filtering = false,
                KeyCode::Backspace => {
                    self.log_filter.pop();
                }
                KeyCode::Char(character) => {
                    self.log_filter.push(character);
                    self.log_scroll = 0;
                }
                _ => {}
            }
            return false;
        }
        match key.code {
            KeyCode::Esc => self.view = View::Accounts,
            KeyCode::Char('/') => self.log_filtering = true,
            KeyCode::Up => {
                if self.log_scroll < self.filtered_logs().len().saturating_sub(1) {
                    self.log_scroll += 1;
                }
            }
            KeyCode::Down => self.log_scroll = self.log_scroll.saturating_sub(1),
            _ => {}
        }
        false
    }

    fn handle_settings(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => self.view = View::Accounts,
            KeyCode::Char('p') => self.open_view(View::Password),
            KeyCode::Char('v') => {
                if let Some(draft) = self.settings_draft.as_mut() {
                    draft.download_video = !draft.download_video;
                }
            }
            KeyCode::Char('n') => {
                if let Some(draft) = self.settings_draft.as_mut() {
                    draft.download_note = !draft.download_note;
                }
            }
            KeyCode::Char('+') => {
                if let Some(draft) = self.settings_draft.as_mut() {
                    draft.auto_update_interval = draft.auto_update_interval.saturating_add(10);
                }
            }
            KeyCode::Char('-') => {
                if let Some(draft) = self.settings_draft.as_mut() {
                    draft.auto_update_interval =
                        draft.auto_update_interval.saturating_sub(10).max(10);
                }
            }
            KeyCode::Enter => {
                if let Some(draft) = self.settings_draft.clone() {
                    self.send(Command::SaveSettings(draft));
                }
            }
            _ => {}
        }
        false
    }

    fn handle_password(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => self.view = View::Accounts,
            KeyCode::Tab | KeyCode::Down => {
                self.input_index = (self.input_index + 1) % self.input_fields.len();
            }
            KeyCode::Enter => {
                let old_password = self.input_fields[0].value.clone();
                let new_password = self.input_fields[1].value.clone();
                if !old_password.is_empty() && !new_password.is_empty() {
                    self.send(Command::ChangePassword {
                        old_password,
                        new_password,
                    });
                    self.view = View::Accounts;
                }
            }
            KeyCode::Backspace => self.input_fields[self.input_index].pop(),
            KeyCode::Char(character) => self.input_fields[self.input_index].push(character),
            _ => {}
        }
        false
    }

    fn handle_share(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('d') {
            let url = self.input_fields[0].value.clone();
            if !url.is_empty() {
                self.send(Command::DownloadShare { url });
            }
            return false;
        }
        match key.code {
            KeyCode::Esc => self.view = View::Accounts,
            KeyCode::Enter => {
                let url = self.input_fields[0].value.clone();
                if !url.is_empty() {
                    self.send(Command::ParseShare { url });
                }
            }
            KeyCode::Backspace => self.input_fields[0].pop(),
            KeyCode::Char(character) => self.input_fields[0].push(character),
            _ => {}
        }
        false
    }
}

fn override_label(value: Option<bool>) -> &'static str {
    match PreferenceOverride::from_wire(value) {
        PreferenceOverride::Inherit => "inherit",
        PreferenceOverride::ForceOn => "on",
        PreferenceOverride::ForceOff => "off",
    }
}

/// Cycle order matches the tri-state: inherit, force on, force off.
fn next_override(value: Option<bool>) -> PreferenceOverride {
    match PreferenceOverride::from_wire(value) {
        PreferenceOverride::Inherit => PreferenceOverride::ForceOn,
        PreferenceOverride::ForceOn => PreferenceOverride::ForceOff,
        PreferenceOverride::ForceOff => PreferenceOverride::Inherit,
    }
}

fn progress_bar(progress: u8) -> String {
    let capped = progress.min(100) as usize;
    let filled = capped * PROGRESS_CELLS / 100;
    let mut bar = String::with_capacity(PROGRESS_CELLS + 2);
    bar.push('[');
    for cell in 0..PROGRESS_CELLS {
        bar.push(if cell < filled { '#' } else { '-' });
    }
    bar.push(']');
    bar
}

pub(crate) fn format_unix_timestamp(timestamp: i64) -> String {
    let format =
        time::format_description::parse("[year]-[month]-[day] [hour repr:24]:[minute]:[second]");
    match (OffsetDateTime::from_unix_timestamp(timestamp), format) {
        (Ok(moment), Ok(format)) => moment
            .format(&format)
            .unwrap_or_else(|_| timestamp.to_string()),
        _ => timestamp.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msync_core::model::Platform;

    fn app() -> App {
        let (commands, _commands_rx) = mpsc::unbounded_channel();
        let (_events_tx, events) = mpsc::unbounded_channel();
        App::new(commands, events, LogBuffer::new(8))
    }

    fn account(uid: &str, nickname: &str) -> Account {
        Account {
            uid: uid.to_string(),
            sec_user_id: None,
            nickname: Some(nickname.to_string()),
            avatar_url: None,
            signature: None,
            auto_update: false,
            download_video_override: None,
            download_note_override: None,
            created_at: 0,
            updated_at: 0,
            platform: Platform::Douyin,
        }
    }

    #[test]
    fn override_cycle_covers_all_three_states() {
        assert_eq!(next_override(None), PreferenceOverride::ForceOn);
        assert_eq!(next_override(Some(true)), PreferenceOverride::ForceOff);
        assert_eq!(next_override(Some(false)), PreferenceOverride::Inherit);
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0), "[----------]");
        assert_eq!(progress_bar(50), "[#####-----]");
        assert_eq!(progress_bar(100), "[##########]");
        // Out-of-range values are capped, not wrapped.
        assert_eq!(progress_bar(255), "[##########]");
    }

    #[test]
    fn format_unix_timestamp_renders_utc() {
        assert_eq!(format_unix_timestamp(0), "1970-01-01 00:00:00");
    }

    #[test]
    fn toast_events_set_and_clear_the_banner() {
        let mut app = app();
        app.apply(Event::Toast {
            message: "logged in".to_string(),
            severity: Severity::Success,
            generation: 1,
        });
        assert!(app.toast.is_some());
        app.apply(Event::ToastCleared);
        assert!(app.toast.is_none());
    }

    #[test]
    fn account_snapshot_clamps_the_selection() {
        let mut app = app();
        app.apply(Event::Accounts(vec![
            account("u1", "Alice"),
            account("u2", "Bob"),
            account("u3", "Cara"),
        ]));
        app.selected = 2;
        app.apply(Event::Accounts(vec![account("u1", "Alice")]));
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn logout_event_returns_to_the_login_view() {
        let mut app = app();
        app.apply(Event::Auth(AuthState::Authenticated));
        assert_eq!(app.view, View::Accounts);
        app.apply(Event::Auth(AuthState::Unauthenticated));
        assert_eq!(app.view, View::Login);
        assert_eq!(app.input_fields.len(), 2);
    }

    #[test]
    fn search_filters_the_visible_list() {
        let mut app = app();
        app.apply(Event::Accounts(vec![
            account("u1", "Alice"),
            account("u2", "Bob"),
        ]));
        app.search = "ali".to_string();
        let visible = app.visible_accounts();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].uid, "u1");
    }
}
