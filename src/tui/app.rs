use std::collections::BTreeMap;
use std::io;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};
use ratatui::Terminal;
use tokio::runtime::Handle;

use crate::core::{env, validate, EnvCenter};
use crate::models::{
    Environment, ExtractionResult, Group, Issue, PathSegment, ProjectConfig, Status, Variables,
};

/// 左侧分组面板
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPanel {
    All,
    Client,
    Server,
    Shared,
}

impl GroupPanel {
    const ALL: [GroupPanel; 4] = [
        GroupPanel::All,
        GroupPanel::Client,
        GroupPanel::Server,
        GroupPanel::Shared,
    ];

    fn label(self) -> &'static str {
        match self {
            GroupPanel::All => "All",
            GroupPanel::Client => "Client",
            GroupPanel::Server => "Server",
            GroupPanel::Shared => "Shared",
        }
    }

    fn matches(self, group: Group) -> bool {
        match self {
            GroupPanel::All => true,
            GroupPanel::Client => group == Group::Client,
            GroupPanel::Server => group == Group::Server,
            GroupPanel::Shared => group == Group::Shared,
        }
    }
}

/// 焦点区域：分组面板 or 变量列表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Menu,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// 浏览列表
    Normal,
    /// 编辑选中变量的值
    Editing,
    /// 输入搜索词
    Searching,
}

/// TUI 应用状态
pub struct App {
    center: EnvCenter,
    /// 提取与校验是异步的，界面线程通过它阻塞等待
    runtime: Handle,
    config: ProjectConfig,
    environment: Environment,
    status_filter: Status,
    selected_menu: usize,
    focus: Focus,
    input_mode: InputMode,
    status_message: String,
    running: bool,
    variables: Variables,
    /// 当前编辑中的值（写回时使用）
    values: BTreeMap<String, String>,
    issues: Vec<Issue>,
    extraction: ExtractionResult,
    search_query: String,
    edit_buffer: String,
    /// 当前可见的 key，顺序与列表一致
    content_keys: Vec<String>,
    content_selected: usize,
}

impl App {
    pub fn new(center: EnvCenter, runtime: Handle) -> Self {
        let config = center.project_config();
        let mut app = Self {
            center,
            runtime,
            config,
            environment: Environment::Development,
            status_filter: Status::All,
            selected_menu: 0,
            focus: Focus::Menu,
            input_mode: InputMode::Normal,
            status_message: "Ready".to_string(),
            running: true,
            variables: Variables::new(),
            values: BTreeMap::new(),
            issues: Vec::new(),
            extraction: ExtractionResult::not_found("Not loaded"),
            search_query: String::new(),
            edit_buffer: String::new(),
            content_keys: Vec::new(),
            content_selected: 0,
        };
        app.reload();
        app
    }

    pub fn selected_panel(&self) -> GroupPanel {
        GroupPanel::ALL[self.selected_menu]
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn status_filter(&self) -> Status {
        self.status_filter
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn content_keys(&self) -> &[String] {
        &self.content_keys
    }

    pub fn content_selected(&self) -> usize {
        self.content_selected
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn extraction(&self) -> &ExtractionResult {
        &self.extraction
    }

    /// 某个 key 的校验问题
    pub fn issues_for(&self, key: &str) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|issue| matches!(issue.path.first(), Some(PathSegment::Key(k)) if k == key))
            .collect()
    }

    fn is_valid(&self, key: &str) -> bool {
        self.issues_for(key).is_empty()
    }

    fn selected_key(&self) -> Option<&str> {
        self.content_keys.get(self.content_selected).map(String::as_str)
    }

    /// 重新读取配置、env 文件和 schema，丢弃未写入的修改
    pub fn reload(&mut self) {
        self.config = self.center.project_config();
        let loaded = self
            .runtime
            .block_on(self.center.load_variables(&self.config, self.environment));
        self.values = env::variable_values(&loaded.variables);
        self.variables = loaded.variables;
        self.extraction = loaded.extraction;
        self.issues = validate::validate_variables(self.extraction.schema(), &self.values);
        self.refresh_content();

        match self.extraction.failure_message() {
            Some(message) => self.set_status(message),
            None => self.set_status(format!(
                "Loaded {} variables ({})",
                self.variables.len(),
                self.environment.as_str()
            )),
        }
    }

    fn revalidate(&mut self) {
        self.issues = self
            .runtime
            .block_on(self.center.validate(&self.config, &self.values));
        self.refresh_content();
    }

    /// 按分组、搜索词和状态过滤刷新可见列表
    pub fn refresh_content(&mut self) {
        let panel = self.selected_panel();
        let query = self.search_query.to_lowercase();
        let mut keys = Vec::new();
        for group in Group::ALL {
            if !panel.matches(group) {
                continue;
            }
            for var in self.variables.values().filter(|v| v.group == group) {
                if !query.is_empty()
                    && !var.key.to_lowercase().contains(&query)
                    && !var.description.to_lowercase().contains(&query)
                {
                    continue;
                }
                let keep = match self.status_filter {
                    Status::All => true,
                    Status::Valid => self.is_valid(&var.key),
                    Status::Invalid => !self.is_valid(&var.key),
                };
                if keep {
                    keys.push(var.key.clone());
                }
            }
        }
        self.content_keys = keys;

        // 修正选中索引
        if self.content_keys.is_empty() {
            self.content_selected = 0;
        } else if self.content_selected >= self.content_keys.len() {
            self.content_selected = self.content_keys.len() - 1;
        }
    }

    /// 启动 TUI 事件循环
    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        while self.running {
            terminal.draw(|frame| self.render(frame))?;

            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                self.handle_key(key.code);
            }
        }
        Ok(())
    }

    /// 处理键盘输入
    fn handle_key(&mut self, code: KeyCode) {
        match self.input_mode {
            InputMode::Editing => {
                self.handle_edit_key(code);
                return;
            }
            InputMode::Searching => {
                self.handle_search_key(code);
                return;
            }
            InputMode::Normal => {}
        }

        match code {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Menu => Focus::Content,
                    Focus::Content => Focus::Menu,
                };
            }
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Searching;
                self.set_status("Search... Enter=done, Esc=clear");
            }
            KeyCode::Char('f') => {
                self.status_filter = self.status_filter.next();
                self.refresh_content();
                self.set_status(format!("Filter: {}", self.status_filter.label()));
            }
            KeyCode::Char('v') => {
                self.environment = self.environment.toggle();
                self.reload();
            }
            KeyCode::Char('r') => self.reload(),
            KeyCode::Char('w') => self.write(),
            _ if self.focus == Focus::Menu => self.handle_menu_key(code),
            _ if self.focus == Focus::Content => self.handle_content_key(code),
            _ => {}
        }
    }

    /// 分组面板按键处理
    fn handle_menu_key(&mut self, code: KeyCode) {
        let prev = self.selected_menu;
        match code {
            KeyCode::Up => {
                if self.selected_menu > 0 {
                    self.selected_menu -= 1;
                }
            }
            KeyCode::Down => {
                if self.selected_menu < GroupPanel::ALL.len() - 1 {
                    self.selected_menu += 1;
                }
            }
            KeyCode::Enter => self.focus = Focus::Content,
            _ => {}
        }
        if self.selected_menu != prev {
            self.content_selected = 0;
            self.refresh_content();
        }
    }

    /// 变量列表 Normal 模式按键处理
    fn handle_content_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up => {
                if self.content_selected > 0 {
                    self.content_selected -= 1;
                }
            }
            KeyCode::Down => {
                if !self.content_keys.is_empty()
                    && self.content_selected < self.content_keys.len() - 1
                {
                    self.content_selected += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char('e') => self.start_editing(),
            _ => {}
        }
    }

    fn start_editing(&mut self) {
        let Some(key) = self.selected_key().map(str::to_string) else {
            return;
        };
        self.edit_buffer = self.values.get(&key).cloned().unwrap_or_default();
        self.input_mode = InputMode::Editing;
        self.set_status(format!("Editing {}... Enter=confirm, Esc=cancel", key));
    }

    /// 编辑模式按键处理
    fn handle_edit_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.edit_buffer.clear();
                self.set_status("Cancelled");
            }
            KeyCode::Enter => self.confirm_edit(),
            KeyCode::Backspace => {
                self.edit_buffer.pop();
            }
            KeyCode::Char(c) => self.edit_buffer.push(c),
            _ => {}
        }
    }

    fn confirm_edit(&mut self) {
        self.input_mode = InputMode::Normal;
        let Some(key) = self.selected_key().map(str::to_string) else {
            return;
        };
        let value = std::mem::take(&mut self.edit_buffer);
        if let Some(var) = self.variables.get_mut(&key) {
            var.value = value.clone();
        }
        self.values.insert(key.clone(), value);
        self.revalidate();

        let issues = self.issues_for(&key);
        let status = match issues.first() {
            Some(issue) => format!("{}: {}", key, issue.message),
            None => format!("{} updated", key),
        };
        self.set_status(status);
    }

    /// 搜索模式按键处理
    fn handle_search_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => {
                self.search_query.clear();
                self.input_mode = InputMode::Normal;
                self.refresh_content();
                self.set_status("Search cleared");
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                self.set_status(format!("{} matches", self.content_keys.len()));
            }
            KeyCode::Backspace => {
                self.search_query.pop();
                self.refresh_content();
            }
            KeyCode::Char(c) => {
                self.search_query.push(c);
                self.refresh_content();
            }
            _ => {}
        }
    }

    /// 按配置写回目标 env 文件
    fn write(&mut self) {
        match self.center.write_variables(&self.config, &self.values) {
            Ok(path) => self.set_status(format!("Written to {}", path.display())),
            Err(e) => self.set_status(format!("Error: {}", e)),
        }
    }

    /// 渲染整个界面
    fn render(&self, frame: &mut ratatui::Frame) {
        let area = frame.area();

        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);

        self.render_title(frame, outer[0]);
        self.render_body(frame, outer[1]);
        self.render_status(frame, outer[2]);
    }

    fn render_title(&self, frame: &mut ratatui::Frame, area: Rect) {
        let title = Line::from(vec![
            Span::styled(
                "env-client",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("  {}", self.center.project_dir().display())),
            Span::styled(
                format!("  [{}]", self.environment.as_str()),
                Style::default().fg(Color::Yellow),
            ),
        ]);
        let bar = Paragraph::new(title).block(Block::default().borders(Borders::ALL));
        frame.render_widget(bar, area);
    }

    fn render_body(&self, frame: &mut ratatui::Frame, area: Rect) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(20), Constraint::Min(1)])
            .split(area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(7)])
            .split(cols[1]);

        self.render_menu(frame, cols[0]);
        self.render_content(frame, rows[0]);
        self.render_detail(frame, rows[1]);
    }

    fn render_menu(&self, frame: &mut ratatui::Frame, area: Rect) {
        let items: Vec<ListItem> = GroupPanel::ALL
            .iter()
            .enumerate()
            .map(|(i, panel)| {
                let count = self
                    .variables
                    .values()
                    .filter(|v| panel.matches(v.group))
                    .count();
                let style = if i == self.selected_menu {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                let prefix = if i == self.selected_menu { "> " } else { "  " };
                ListItem::new(format!("{}{} ({})", prefix, panel.label(), count)).style(style)
            })
            .collect();

        let menu = List::new(items).block(
            Block::default()
                .title(" Groups ")
                .borders(Borders::ALL)
                .border_style(self.border_style(Focus::Menu)),
        );
        frame.render_widget(menu, area);
    }

    fn render_content(&self, frame: &mut ratatui::Frame, area: Rect) {
        let mut title = format!(" Variables [{}] ", self.status_filter.label());
        if !self.search_query.is_empty() || self.input_mode == InputMode::Searching {
            title.push_str(&format!("/{} ", self.search_query));
        }
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(self.border_style(Focus::Content));

        if self.content_keys.is_empty() {
            let content = Paragraph::new("No variables match.").block(block);
            frame.render_widget(content, area);
            return;
        }

        let items: Vec<ListItem> = self
            .content_keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                let var = self.variables.get(key)?;
                let selected = i == self.content_selected;
                let editing = selected && self.input_mode == InputMode::Editing;
                let (marker, marker_style) = if self.is_valid(key) {
                    ("✓", Style::default().fg(Color::Green))
                } else {
                    ("✗", Style::default().fg(Color::Red))
                };
                let row_style = if selected {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                let value = if editing {
                    self.edit_buffer.as_str()
                } else {
                    self.values.get(key).map(String::as_str).unwrap_or("")
                };
                let mut spans = vec![
                    Span::raw(if selected { "> " } else { "  " }),
                    Span::styled(marker, marker_style),
                    Span::styled(
                        format!(" {:<7}", var.group.as_str()),
                        Style::default().fg(Color::DarkGray),
                    ),
                    Span::styled(format!("{} = ", key), row_style),
                    Span::styled(value.to_string(), Style::default().fg(Color::White)),
                ];
                if editing {
                    spans.push(Span::styled("█", Style::default().fg(Color::Cyan)));
                }
                if !var.required {
                    spans.push(Span::styled("  (extra)", Style::default().fg(Color::DarkGray)));
                }
                Some(ListItem::new(Line::from(spans)))
            })
            .collect();

        let list = List::new(items).block(block);
        frame.render_widget(list, area);
    }

    /// 选中变量的描述、问题，以及提取警告
    fn render_detail(&self, frame: &mut ratatui::Frame, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        if let Some(key) = self.selected_key() {
            if let Some(var) = self.variables.get(key) {
                if !var.description.is_empty() {
                    lines.push(Line::from(Span::styled(
                        var.description.clone(),
                        Style::default().fg(Color::Gray),
                    )));
                }
            }
            for issue in self.issues_for(key) {
                lines.push(Line::from(Span::styled(
                    issue.message.clone(),
                    Style::default().fg(Color::Red),
                )));
            }
        }
        if let ExtractionResult::ValidationFailure { issues, .. } = &self.extraction {
            for issue in issues {
                let path: Vec<String> = issue.path.iter().map(|p| p.to_string()).collect();
                lines.push(Line::from(Span::styled(
                    format!("{}: {} [{}]", path.join("."), issue.message, issue.code),
                    Style::default().fg(Color::Red),
                )));
            }
        }
        for warning in self.extraction.warnings() {
            lines.push(Line::from(Span::styled(
                warning.clone(),
                Style::default().fg(Color::Yellow),
            )));
        }

        let detail = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().title(" Details ").borders(Borders::ALL));
        frame.render_widget(detail, area);
    }

    fn render_status(&self, frame: &mut ratatui::Frame, area: Rect) {
        let status_style = if self.extraction.is_success() {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Red)
        };
        let status = Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::DarkGray)),
            Span::styled(&self.status_message, status_style),
            Span::raw(" | "),
            Span::styled(
                "q:Quit  Tab:Switch  ↑↓:Navigate  e:Edit  /:Search  f:Filter  v:Env  r:Reload  w:Write",
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        let bar = Paragraph::new(status).block(Block::default().borders(Borders::ALL));
        frame.render_widget(bar, area);
    }

    fn border_style(&self, area: Focus) -> Style {
        if self.focus == area {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::runtime::Runtime;

    const ENVS: &str = r#"import { createEnv } from "@t3-oss/env-nextjs";
import { z } from "zod";

export const envs = createEnv({
  client: { NEXT_PUBLIC_URL: z.string().url() },
  server: { SECRET: z.string().min(8).describe("signing secret") },
  runtimeEnv: process.env,
});
"#;

    fn setup(write_permission: bool, envs: &str) -> (TempDir, Runtime, App) {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("env-client.config.ts"),
            format!(
                "export default {{ envsPath: './env.ts', writePermission: {} }};",
                write_permission
            ),
        )
        .unwrap();
        fs::write(tmp.path().join("env.ts"), envs).unwrap();
        fs::write(tmp.path().join(".env"), "SECRET=short\nEXTRA=1\n").unwrap();
        fs::write(tmp.path().join(".env.production"), "EXTRA=prod\n").unwrap();

        let rt = Runtime::new().unwrap();
        let center = EnvCenter::new(tmp.path())
            .unwrap()
            .with_process_env(BTreeMap::new());
        let app = App::new(center, rt.handle().clone());
        (tmp, rt, app)
    }

    fn type_str(app: &mut App, s: &str) {
        for c in s.chars() {
            app.handle_key(KeyCode::Char(c));
        }
    }

    #[test]
    fn test_initial_state() {
        let (_tmp, _rt, app) = setup(false, ENVS);
        assert_eq!(app.selected_panel(), GroupPanel::All);
        assert_eq!(app.focus(), Focus::Menu);
        assert_eq!(app.input_mode(), InputMode::Normal);
        assert_eq!(app.environment(), Environment::Development);
        assert!(app.is_running());
        assert!(app.extraction().is_success());
        assert_eq!(app.status_message(), "Loaded 3 variables (development)");
        // client 在前，其余按 key 排序
        assert_eq!(app.content_keys(), ["NEXT_PUBLIC_URL", "EXTRA", "SECRET"]);
    }

    #[test]
    fn test_group_panels_filter_list() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_panel(), GroupPanel::Client);
        assert_eq!(app.content_keys(), ["NEXT_PUBLIC_URL"]);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_panel(), GroupPanel::Server);
        assert_eq!(app.content_keys(), ["EXTRA", "SECRET"]);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_panel(), GroupPanel::Shared);
        assert!(app.content_keys().is_empty());
        for _ in 0..5 {
            app.handle_key(KeyCode::Down);
        }
        assert_eq!(app.selected_panel(), GroupPanel::Shared);
    }

    #[test]
    fn test_tab_switches_focus() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.focus(), Focus::Content);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_panel(), GroupPanel::All);
        assert_eq!(app.content_selected(), 1);
        app.handle_key(KeyCode::Tab);
        assert_eq!(app.focus(), Focus::Menu);
    }

    #[test]
    fn test_status_filter_cycles() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Char('f'));
        assert_eq!(app.status_filter(), Status::Valid);
        assert!(app.content_keys().contains(&"EXTRA".to_string()));
        assert!(!app.content_keys().contains(&"SECRET".to_string()));

        app.handle_key(KeyCode::Char('f'));
        assert_eq!(app.status_filter(), Status::Invalid);
        assert!(app.content_keys().contains(&"SECRET".to_string()));
        assert!(!app.content_keys().contains(&"EXTRA".to_string()));

        app.handle_key(KeyCode::Char('f'));
        assert_eq!(app.status_filter(), Status::All);
        assert_eq!(app.content_keys().len(), 3);
    }

    #[test]
    fn test_search_matches_key_and_description() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Char('/'));
        assert_eq!(app.input_mode(), InputMode::Searching);
        type_str(&mut app, "signing");
        assert_eq!(app.content_keys(), ["SECRET"]);
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.input_mode(), InputMode::Normal);
        assert_eq!(app.search_query(), "signing");

        app.handle_key(KeyCode::Char('/'));
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.search_query(), "");
        assert_eq!(app.content_keys().len(), 3);
    }

    #[test]
    fn test_edit_revalidates() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        assert_eq!(app.issues_for("SECRET").len(), 1);

        app.handle_key(KeyCode::Tab);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Char('e'));
        assert_eq!(app.input_mode(), InputMode::Editing);
        type_str(&mut app, "-and-long");
        app.handle_key(KeyCode::Enter);

        assert_eq!(app.input_mode(), InputMode::Normal);
        assert_eq!(app.value("SECRET"), Some("short-and-long"));
        assert!(app.issues_for("SECRET").is_empty());
        assert_eq!(app.status_message(), "SECRET updated");
    }

    #[test]
    fn test_edit_cancel_keeps_value() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Tab);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Enter);
        type_str(&mut app, "changed");
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.value("EXTRA"), Some("1"));
        assert_eq!(app.status_message(), "Cancelled");
    }

    #[test]
    fn test_environment_toggle_reloads() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        assert_eq!(app.value("EXTRA"), Some("1"));
        app.handle_key(KeyCode::Char('v'));
        assert_eq!(app.environment(), Environment::Production);
        assert_eq!(app.value("EXTRA"), Some("prod"));
        assert_eq!(app.value("SECRET"), Some("short"));
    }

    #[test]
    fn test_reload_discards_edits() {
        let (tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Tab);
        app.handle_key(KeyCode::Down);
        app.handle_key(KeyCode::Char('e'));
        type_str(&mut app, "0");
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.value("EXTRA"), Some("10"));

        fs::write(tmp.path().join(".env.local"), "NEW=1\n").unwrap();
        app.handle_key(KeyCode::Char('r'));
        assert_eq!(app.value("EXTRA"), Some("1"));
        assert_eq!(app.value("NEW"), Some("1"));
    }

    #[test]
    fn test_write_without_permission() {
        let (tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Char('w'));
        assert_eq!(
            app.status_message(),
            "Error: Write permission is disabled in env-client.config.ts"
        );
        assert!(!tmp.path().join(".env.local").exists());
    }

    #[test]
    fn test_write_with_permission() {
        let (tmp, _rt, mut app) = setup(true, ENVS);
        app.handle_key(KeyCode::Char('w'));
        assert!(app.status_message().starts_with("Written to "));
        let written = fs::read_to_string(tmp.path().join(".env.local")).unwrap();
        assert!(written.starts_with("# Environment Variables\n"));
        assert!(written.contains("SECRET=short\n"));
        assert!(written.contains("EXTRA=1\n"));
    }

    #[test]
    fn test_failure_message_shown_verbatim() {
        let (_tmp, _rt, app) = setup(false, "throw new Error('bad schema');");
        assert!(!app.extraction().is_success());
        assert_eq!(app.status_message(), "Runtime error: bad schema");
        // 没有 schema 时仍列出文件里的值
        assert_eq!(app.content_keys(), ["EXTRA", "SECRET"]);
    }

    #[test]
    fn test_quit() {
        let (_tmp, _rt, mut app) = setup(false, ENVS);
        app.handle_key(KeyCode::Char('q'));
        assert!(!app.is_running());
    }
}
