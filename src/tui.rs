use crate::format::{format_currency, format_percent, format_quantity, format_with_commas};
use crate::portfolio::{Mutation, Portfolio, PriceStatus};
use crate::stake::StakeForm;
use crate::valuation::allocation;
use chrono::Utc;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        BarChart, Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Tabs, Wrap,
    },
    Frame, Terminal,
};
use std::io::{self, Stdout};
use std::time::Duration;
use tui_big_text::{BigText, PixelSize};

const FORM_LABELS: [&str; 12] = [
    "Platform",
    "Staked token",
    "Price asset id",
    "Quantity",
    "Derivative token",
    "Fee paid",
    "Yield rate (%)",
    "Yield kind (APR/APY)",
    "Lockup",
    "Withdrawal",
    "Wallet",
    "Notes",
];

fn form_field(form: &StakeForm, index: usize) -> &str {
    match index {
        0 => &form.platform,
        1 => &form.staked_token,
        2 => &form.price_asset_id,
        3 => &form.staked_quantity,
        4 => &form.derivative_token,
        5 => &form.fee_paid,
        6 => &form.yield_rate,
        7 => &form.yield_kind,
        8 => &form.lockup_status,
        9 => &form.withdrawal_terms,
        10 => &form.wallet_label,
        _ => &form.notes,
    }
}

fn form_field_mut(form: &mut StakeForm, index: usize) -> &mut String {
    match index {
        0 => &mut form.platform,
        1 => &mut form.staked_token,
        2 => &mut form.price_asset_id,
        3 => &mut form.staked_quantity,
        4 => &mut form.derivative_token,
        5 => &mut form.fee_paid,
        6 => &mut form.yield_rate,
        7 => &mut form.yield_kind,
        8 => &mut form.lockup_status,
        9 => &mut form.withdrawal_terms,
        10 => &mut form.wallet_label,
        _ => &mut form.notes,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Stakes,
    Summary,
}

impl Tab {
    fn title(self) -> &'static str {
        match self {
            Tab::Stakes => "Stakes",
            Tab::Summary => "Summary & Allocation",
        }
    }

    fn all() -> &'static [Tab] {
        &[Tab::Stakes, Tab::Summary]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Normal,
    Form,
    ConfirmDelete,
    ConfirmClear,
}

pub struct App {
    pub current_tab: Tab,
    pub portfolio: Portfolio,
    pub should_quit: bool,
    pub error_message: Option<String>,
    pub mode: AppMode,
    pub selected_position: usize,
    pub form: StakeForm,
    pub form_field: usize,
    pub form_error: Option<String>,
}

impl App {
    pub fn new(portfolio: Portfolio) -> App {
        App {
            current_tab: Tab::Stakes,
            portfolio,
            should_quit: false,
            error_message: None,
            mode: AppMode::Normal,
            selected_position: 0,
            form: StakeForm::default(),
            form_field: 0,
            form_error: None,
        }
    }

    pub fn next_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + 1) % tabs.len()];
    }

    pub fn previous_tab(&mut self) {
        let tabs = Tab::all();
        let current_index = tabs
            .iter()
            .position(|&t| t == self.current_tab)
            .unwrap_or(0);
        self.current_tab = tabs[(current_index + tabs.len() - 1) % tabs.len()];
    }

    pub fn select_next(&mut self) {
        if self.selected_position < self.portfolio.records.len().saturating_sub(1) {
            self.selected_position += 1;
        }
    }

    pub fn select_previous(&mut self) {
        self.selected_position = self.selected_position.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let last = self.portfolio.records.len().saturating_sub(1);
        self.selected_position = self.selected_position.min(last);
    }

    pub async fn refresh(&mut self) {
        self.portfolio.refresh().await;
        self.clamp_selection();
    }

    async fn apply(&mut self, mutation: Mutation) -> bool {
        let result = self.portfolio.apply(mutation).await;
        self.clamp_selection();
        match result {
            Ok(_) => true,
            Err(e) => {
                self.error_message = Some(e.to_string());
                false
            }
        }
    }

    pub fn open_form(&mut self) {
        self.form = StakeForm::default();
        self.form_field = 0;
        self.form_error = None;
        self.mode = AppMode::Form;
    }

    pub fn close_form(&mut self) {
        self.form = StakeForm::default();
        self.form_error = None;
        self.mode = AppMode::Normal;
    }

    pub async fn submit_form(&mut self) {
        match self.form.admit(self.portfolio.currency(), Utc::now()) {
            Ok(record) => {
                // on a storage error the form stays open with its input
                if self.apply(Mutation::Add(record)).await {
                    self.selected_position = self.portfolio.records.len().saturating_sub(1);
                    self.close_form();
                }
            }
            Err(e) => self.form_error = Some(e.to_string()),
        }
    }

    pub async fn handle_key(&mut self, code: KeyCode) {
        if self.error_message.is_some() {
            self.error_message = None;
            return;
        }

        match self.mode {
            AppMode::Normal => match code {
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                // Vim navigation - hjkl
                KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => self.previous_tab(),
                KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => self.next_tab(),
                KeyCode::Char('j') | KeyCode::Down => self.select_next(),
                KeyCode::Char('k') | KeyCode::Up => self.select_previous(),
                KeyCode::Char('1') => self.current_tab = Tab::Stakes,
                KeyCode::Char('2') => self.current_tab = Tab::Summary,
                KeyCode::Char('a') => self.open_form(),
                KeyCode::Char('d') => {
                    if !self.portfolio.records.is_empty() {
                        self.current_tab = Tab::Stakes;
                        self.mode = AppMode::ConfirmDelete;
                    }
                }
                KeyCode::Char('C') => self.mode = AppMode::ConfirmClear,
                KeyCode::Char('r') => self.refresh().await,
                _ => {}
            },
            AppMode::Form => match code {
                KeyCode::Esc => self.close_form(),
                KeyCode::Enter => self.submit_form().await,
                KeyCode::Tab | KeyCode::Down => {
                    self.form_field = (self.form_field + 1) % FORM_LABELS.len();
                }
                KeyCode::BackTab | KeyCode::Up => {
                    self.form_field = (self.form_field + FORM_LABELS.len() - 1) % FORM_LABELS.len();
                }
                KeyCode::Backspace => {
                    form_field_mut(&mut self.form, self.form_field).pop();
                }
                KeyCode::Char(c) => form_field_mut(&mut self.form, self.form_field).push(c),
                _ => {}
            },
            AppMode::ConfirmDelete => match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.mode = AppMode::Normal;
                    self.apply(Mutation::Remove(self.selected_position)).await;
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.mode = AppMode::Normal;
                }
                _ => {}
            },
            AppMode::ConfirmClear => match code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.mode = AppMode::Normal;
                    if self.apply(Mutation::Clear).await {
                        self.selected_position = 0;
                    }
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.mode = AppMode::Normal;
                }
                _ => {}
            },
        }
    }

    fn help_text(&self) -> &'static str {
        match self.mode {
            AppMode::Normal => concat!(
                "j/k (select) | a (add) | d (delete) | C (clear all) | ",
                "r (refresh) | h/l (tabs) | q (quit)"
            ),
            AppMode::Form => {
                "Tab/Down next field | Shift-Tab/Up previous | Enter (save) | Esc (cancel)"
            }
            AppMode::ConfirmDelete | AppMode::ConfirmClear => "y (confirm) | n/Esc (cancel)",
        }
    }
}

pub async fn run_tui(portfolio: Portfolio) -> eyre::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(portfolio);
    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    // one refresh at a time: each one is awaited before the next key is read
    app.refresh().await;

    loop {
        terminal.draw(|f| ui(f, app))?;

        if crossterm::event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code).await;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    let tab_titles: Vec<Line> = Tab::all()
        .iter()
        .map(|t| {
            let style = if *t == app.current_tab {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(Span::styled(t.title(), style))
        })
        .collect();

    let status_indicator = match app.portfolio.price_status {
        PriceStatus::Live => "🟢",
        PriceStatus::Partial => "🟡",
        PriceStatus::Unavailable => "🔴",
    };
    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Stake Tracker {} {}",
            status_indicator,
            app.portfolio.refresh_marker()
        )))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow))
        .select(
            Tab::all()
                .iter()
                .position(|&t| t == app.current_tab)
                .unwrap_or(0),
        );
    f.render_widget(tabs, chunks[0]);

    match app.current_tab {
        Tab::Stakes => render_stakes(f, chunks[1], app),
        Tab::Summary => render_summary(f, chunks[1], app),
    }

    let help = Paragraph::new(app.help_text())
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center);
    f.render_widget(help, chunks[2]);

    match app.mode {
        AppMode::Form => render_form(f, app),
        AppMode::ConfirmDelete => {
            if let Some(record) = app.portfolio.records.get(app.selected_position) {
                render_confirm(
                    f,
                    " Delete Stake ",
                    &format!(
                        "Delete the {} stake on {}?",
                        record.staked_token, record.platform
                    ),
                );
            }
        }
        AppMode::ConfirmClear => render_confirm(
            f,
            " Clear All ",
            &format!(
                "Delete ALL {} stakes? This cannot be undone.",
                app.portfolio.records.len()
            ),
        ),
        AppMode::Normal => {}
    }

    if let Some(error) = &app.error_message {
        render_error_popup(f, error);
    }
}

fn render_stakes(f: &mut Frame, area: Rect, app: &App) {
    let portfolio = &app.portfolio;
    let currency = portfolio.currency();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Stakes ({})", portfolio.records.len()));

    if portfolio.records.is_empty() {
        let placeholder = Paragraph::new("No stakes yet. Press 'a' to add one.")
            .block(block)
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, area);
        return;
    }

    let header_cells = [
        "Platform",
        "Staked",
        "Price",
        "Value",
        "Derivative",
        "Fee",
        "Yield",
        "Lockup",
        "Wallet",
    ]
    .iter()
    .map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let constraints = [
        Constraint::Percentage(14),
        Constraint::Percentage(16),
        Constraint::Percentage(10),
        Constraint::Percentage(12),
        Constraint::Percentage(9),
        Constraint::Percentage(7),
        Constraint::Percentage(10),
        Constraint::Percentage(12),
        Constraint::Percentage(10),
    ];

    let mut rows: Vec<Row> = portfolio
        .records
        .iter()
        .zip(&portfolio.valuation.rows)
        .enumerate()
        .map(|(i, (record, valuation))| {
            let row_style = if i == app.selected_position {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            // ● priced, ○ valued at 0
            let priced = portfolio.prices.contains_key(&record.price_key());
            let (marker, value_color) = if priced {
                ("●", Color::Green)
            } else {
                ("○", Color::Gray)
            };

            Row::new(vec![
                Cell::from(format!("{marker} {}", record.platform)),
                Cell::from(format!(
                    "{} {}",
                    format_quantity(record.staked_quantity),
                    record.staked_token
                )),
                Cell::from(format_with_commas(valuation.current_price)),
                Cell::from(format_currency(valuation.current_value, currency))
                    .style(Style::default().fg(value_color)),
                Cell::from(
                    record
                        .derivative_token
                        .clone()
                        .unwrap_or_else(|| "N/A".to_string()),
                ),
                Cell::from(format_with_commas(record.fee_paid)),
                Cell::from(format!(
                    "{} {}",
                    format_percent(record.yield_rate),
                    record.yield_kind
                )),
                Cell::from(record.lockup_display()),
                Cell::from(record.wallet_label.clone()),
            ])
            .height(1)
            .style(row_style)
        })
        .collect();

    let summary = &portfolio.valuation.summary;
    rows.push(Row::new(vec![
        Cell::from("TOTAL").style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Cell::from(""),
        Cell::from(""),
        Cell::from(format_currency(summary.total_value, currency)).style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Cell::from(""),
        Cell::from(format_with_commas(summary.total_fees)),
        Cell::from(format!("avg {}", format_percent(summary.average_yield))),
    ]));

    let table = Table::new(rows, constraints)
        .header(header)
        .block(block)
        .style(Style::default().fg(Color::White));

    f.render_widget(table, area);
}

fn render_summary(f: &mut Frame, area: Rect, app: &App) {
    let portfolio = &app.portfolio;
    let summary = &portfolio.valuation.summary;
    let currency = portfolio.currency();

    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(7), Constraint::Min(0)])
        .split(area);

    let big_text_value = format!(
        "{} {}",
        format_with_commas(summary.total_value),
        currency.to_uppercase()
    );
    let big_text = BigText::builder()
        .pixel_size(PixelSize::Quadrant)
        .style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .lines(vec![big_text_value.clone().into()])
        .build();

    let big_text_block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Total Staked Value ({})", currency.to_uppercase()))
        .title_alignment(Alignment::Center);
    f.render_widget(big_text_block, main_chunks[0]);

    // Center the big text within the widget
    let inner = main_chunks[0].inner(ratatui::layout::Margin {
        horizontal: 1,
        vertical: 1,
    });
    let big_text_width = big_text_value.len() as u16 * 4;
    let centered_area = if big_text_width < inner.width {
        let margin = (inner.width - big_text_width) / 2;
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(margin),
                Constraint::Min(0),
                Constraint::Length(margin),
            ])
            .split(inner)[1]
    } else {
        inner
    };
    f.render_widget(big_text, centered_area);

    let lower_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(main_chunks[1]);

    let net_color = if summary.net_value >= 0.0 {
        Color::Green
    } else {
        Color::Red
    };
    let line = |label: &str, value: String, color: Color| {
        ListItem::new(Line::from(vec![
            Span::styled(format!("{label:<22}"), Style::default().fg(Color::Cyan)),
            Span::styled(value, Style::default().fg(color)),
        ]))
    };
    let mut items = vec![
        line("Stakes", summary.count.to_string(), Color::White),
        line(
            "Total value",
            format!("{:.2}", summary.total_value),
            Color::White,
        ),
        line("Fees paid", format!("{:.2}", summary.total_fees), Color::White),
        line("Net value", format!("{:.2}", summary.net_value), net_color),
        line(
            "Average yield",
            format!("{:.2}%", summary.average_yield),
            Color::White,
        ),
        line(
            "Est. earnings / year",
            format!("{:.2}", summary.total_estimated_annual_earnings),
            Color::Green,
        ),
    ];
    if summary.foreign_fee_count > 0 {
        items.push(line(
            "Fees not counted",
            format!("{} (other currency)", summary.foreign_fee_count),
            Color::Yellow,
        ));
    }
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Summary"))
        .style(Style::default().fg(Color::White));
    f.render_widget(list, lower_chunks[0]);

    let allocation = allocation(&portfolio.records, &portfolio.valuation);
    if allocation.is_empty() {
        let placeholder = Paragraph::new("No valued stakes to allocate")
            .block(Block::default().borders(Borders::ALL).title("Allocation by Platform"))
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center);
        f.render_widget(placeholder, lower_chunks[1]);
        return;
    }

    let data: Vec<(&str, u64)> = allocation
        .iter()
        .map(|(platform, percentage)| (platform.as_str(), percentage.round() as u64))
        .collect();
    let barchart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Allocation by Platform (%)"),
        )
        .data(&data)
        .bar_width(9)
        .bar_style(Style::default().fg(Color::Yellow))
        .value_style(Style::default().fg(Color::Black).bg(Color::Yellow));
    f.render_widget(barchart, lower_chunks[1]);
}

fn render_form(f: &mut Frame, app: &App) {
    let popup_area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, popup_area);

    let mut lines: Vec<Line> = FORM_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let value = form_field(&app.form, i);
            if i == app.form_field {
                Line::from(vec![
                    Span::styled(
                        format!("> {label:<22}"),
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("{value}█"),
                        Style::default()
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    ),
                ])
            } else {
                Line::from(vec![
                    Span::styled(format!("  {label:<22}"), Style::default().fg(Color::Gray)),
                    Span::raw(value.to_string()),
                ])
            }
        })
        .collect();

    lines.push(Line::from(""));
    match &app.form_error {
        Some(error) => lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ))),
        None => lines.push(Line::from(Span::styled(
            format!(
                "Fee is in {}. Leave the price asset id empty to track without a price.",
                app.portfolio.currency().to_uppercase()
            ),
            Style::default().fg(Color::Cyan),
        ))),
    }

    let form = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Add Stake ")
                .title_alignment(Alignment::Center)
                .style(Style::default().bg(Color::Black)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(form, popup_area);
}

fn render_confirm(f: &mut Frame, title: &str, question: &str) {
    let popup_area = centered_rect(50, 20, f.area());
    f.render_widget(Clear, popup_area);

    let text = vec![
        Line::from(Span::styled(
            question.to_string(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "y: confirm | n/Esc: cancel",
            Style::default().fg(Color::Cyan),
        )),
    ];
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(title.to_string())
                .title_alignment(Alignment::Center)
                .style(Style::default().bg(Color::Black)),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, popup_area);
}

fn render_error_popup(f: &mut Frame, error: &str) {
    let popup_area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, popup_area);

    let error_paragraph = Paragraph::new(error)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Error")
                .style(Style::default().fg(Color::Red)),
        )
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(error_paragraph, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::tests::{stake, static_prices};
    use crate::store::RecordStore;
    use ratatui::backend::TestBackend;

    async fn app_with(records: &[crate::stake::StakeRecord]) -> (App, sled::Db) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = RecordStore::new(&db).unwrap();
        store.save(records).unwrap();
        let mut app = App::new(Portfolio::new(store, static_prices(), "eur"));
        app.refresh().await;
        (app, db)
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(KeyCode::Char(c)).await;
        }
    }

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(160, 40)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_tab_navigation() {
        let (mut app, _db) = app_with(&[]).await;
        assert_eq!(app.current_tab, Tab::Stakes);
        app.handle_key(KeyCode::Char('l')).await;
        assert_eq!(app.current_tab, Tab::Summary);
        app.handle_key(KeyCode::Char('l')).await;
        assert_eq!(app.current_tab, Tab::Stakes);
        app.handle_key(KeyCode::Char('h')).await;
        assert_eq!(app.current_tab, Tab::Summary);
        app.handle_key(KeyCode::Char('1')).await;
        assert_eq!(app.current_tab, Tab::Stakes);
    }

    #[tokio::test]
    async fn test_empty_list_renders_placeholder() {
        let (app, _db) = app_with(&[]).await;
        assert!(screen(&app).contains("No stakes yet. Press 'a' to add one."));
    }

    #[tokio::test]
    async fn test_add_stake_through_form() {
        let (mut app, db) = app_with(&[]).await;
        app.handle_key(KeyCode::Char('a')).await;
        assert_eq!(app.mode, AppMode::Form);

        type_text(&mut app, "Lido").await;
        app.handle_key(KeyCode::Tab).await;
        type_text(&mut app, "eth").await;
        app.handle_key(KeyCode::Tab).await;
        type_text(&mut app, "Ethereum").await;
        app.handle_key(KeyCode::Tab).await;
        type_text(&mut app, "1.5").await;
        // jump to the yield rate field
        for _ in 0..3 {
            app.handle_key(KeyCode::Down).await;
        }
        type_text(&mut app, "3.5").await;
        app.handle_key(KeyCode::Enter).await;

        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.portfolio.records.len(), 1);
        assert_eq!(app.portfolio.records[0].price_asset_id, "ethereum");
        assert_eq!(app.portfolio.valuation.summary.total_value, 3000.0);
        assert_eq!(RecordStore::new(&db).unwrap().load().len(), 1);
        assert!(screen(&app).contains("● Lido"));
    }

    #[tokio::test]
    async fn test_invalid_form_keeps_store_untouched() {
        let (mut app, db) = app_with(&[]).await;
        app.handle_key(KeyCode::Char('a')).await;
        type_text(&mut app, "Lido").await;
        app.handle_key(KeyCode::Tab).await;
        type_text(&mut app, "ETH").await;
        app.handle_key(KeyCode::Tab).await;
        app.handle_key(KeyCode::Tab).await;
        type_text(&mut app, "0").await;
        app.handle_key(KeyCode::Enter).await;

        assert_eq!(app.mode, AppMode::Form);
        assert_eq!(
            app.form_error.as_deref(),
            Some("Quantity must be positive, got 0")
        );
        assert!(app.portfolio.records.is_empty());
        assert!(RecordStore::new(&db).unwrap().load().is_empty());
        assert!(screen(&app).contains("Quantity must be positive"));

        app.handle_key(KeyCode::Esc).await;
        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.form, StakeForm::default());
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let first = stake("Lido", "ETH", "ethereum", "1.5");
        let second = stake("Aave V3", "USDC", "usd-coin", "1000");
        let (mut app, db) = app_with(&[first, second.clone()]).await;

        app.handle_key(KeyCode::Char('d')).await;
        assert_eq!(app.mode, AppMode::ConfirmDelete);
        assert!(screen(&app).contains("Delete the ETH stake on Lido?"));

        app.handle_key(KeyCode::Char('n')).await;
        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.portfolio.records.len(), 2);

        app.handle_key(KeyCode::Char('d')).await;
        app.handle_key(KeyCode::Char('y')).await;
        assert_eq!(app.portfolio.records, vec![second.clone()]);
        assert_eq!(RecordStore::new(&db).unwrap().load(), vec![second]);
    }

    #[tokio::test]
    async fn test_delete_last_row_moves_selection() {
        let (mut app, _db) = app_with(&[
            stake("Lido", "ETH", "ethereum", "1.5"),
            stake("Aave V3", "USDC", "usd-coin", "1000"),
        ])
        .await;
        app.handle_key(KeyCode::Char('j')).await;
        assert_eq!(app.selected_position, 1);

        app.handle_key(KeyCode::Char('d')).await;
        app.handle_key(KeyCode::Char('y')).await;
        assert_eq!(app.portfolio.records.len(), 1);
        assert_eq!(app.selected_position, 0);
    }

    #[tokio::test]
    async fn test_clear_all_requires_confirmation() {
        let (mut app, db) = app_with(&[
            stake("Lido", "ETH", "ethereum", "1.5"),
            stake("Aave V3", "USDC", "usd-coin", "1000"),
        ])
        .await;

        app.handle_key(KeyCode::Char('C')).await;
        assert_eq!(app.mode, AppMode::ConfirmClear);
        assert!(screen(&app).contains("This cannot be undone."));
        app.handle_key(KeyCode::Esc).await;
        assert_eq!(app.portfolio.records.len(), 2);

        app.handle_key(KeyCode::Char('C')).await;
        app.handle_key(KeyCode::Char('y')).await;
        assert!(app.portfolio.records.is_empty());
        assert!(RecordStore::new(&db).unwrap().load().is_empty());
        assert!(screen(&app).contains("No stakes yet."));
    }

    #[tokio::test]
    async fn test_clear_all_reaches_malformed_slot() {
        let (mut app, db) = app_with(&[]).await;
        let store = RecordStore::new(&db).unwrap();
        store.write_raw(b"{not json");
        app.refresh().await;
        assert!(app.portfolio.records.is_empty());

        app.handle_key(KeyCode::Char('C')).await;
        assert_eq!(app.mode, AppMode::ConfirmClear);
        app.handle_key(KeyCode::Char('y')).await;
        assert!(!store.has_slot());
    }

    #[tokio::test]
    async fn test_summary_tab_shows_figures() {
        let (mut app, _db) = app_with(&[stake("Lido", "ETH", "ethereum", "1.5")]).await;
        app.handle_key(KeyCode::Char('2')).await;
        let screen = screen(&app);
        assert!(screen.contains("3000.00"));
        assert!(screen.contains("3.50%"));
        assert!(screen.contains("105.00"));
    }
}
