use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::auth::AuthProvider;
use crate::board::{BoardFilter, BoardView, SortOrder};
use crate::cache::QueryKey;
use crate::drag::{DragController, DragEvent, DropDecision, DropLocation, REJECTION_REASONS};
use crate::export::export_filename;
use crate::models::{Application, ApplicationStatus, Note, KANBAN_COLUMNS};
use crate::store::RemoteStore;
use crate::tracker::Tracker;

enum Mode {
    Browse,
    Reason { category: usize, detail: String },
    ConfirmDelete { id: String, label: String },
}

struct AppState {
    filter: BoardFilter,
    board: BoardView,
    focus: usize,
    selected: [usize; 5],
    collapsed: [bool; 5],
    mode: Mode,
    dnd: DragController,
    notes: Vec<Note>,
    message: Option<String>,
}

impl AppState {
    fn new(board: BoardView) -> Self {
        Self {
            filter: BoardFilter::default(),
            board,
            focus: 0,
            selected: [0; 5],
            collapsed: [false; 5],
            mode: Mode::Browse,
            dnd: DragController::new(),
            notes: Vec::new(),
            message: None,
        }
    }

    fn current_card(&self) -> Option<&Application> {
        self.board.columns[self.focus]
            .applications
            .get(self.selected[self.focus])
    }

    /// Re-projects the board from the cache and reloads the focused card's notes.
    fn reload<S: RemoteStore, A: AuthProvider>(&mut self, tracker: &mut Tracker<S, A>) -> Result<()> {
        self.board = tracker.board(&self.filter)?;
        for (i, column) in self.board.columns.iter().enumerate() {
            self.selected[i] = self.selected[i].min(column.count().saturating_sub(1));
        }
        self.load_notes(tracker);
        Ok(())
    }

    fn load_notes<S: RemoteStore, A: AuthProvider>(&mut self, tracker: &mut Tracker<S, A>) {
        let Some(id) = self.current_card().map(|app| app.id.clone()) else {
            self.notes.clear();
            return;
        };
        self.notes = tracker.notes(&id).map(<[Note]>::to_vec).unwrap_or_default();
    }

    /// Puts focus on the card with `id`, wherever the projection placed it.
    fn select_card(&mut self, id: &str) -> bool {
        for (i, column) in self.board.columns.iter().enumerate() {
            if let Some(index) = column.applications.iter().position(|app| app.id == id) {
                self.focus = i;
                self.selected[i] = index;
                return true;
            }
        }
        false
    }

    fn next(&mut self) {
        let count = self.board.columns[self.focus].count();
        if count > 0 && self.selected[self.focus] < count - 1 {
            self.selected[self.focus] += 1;
        }
    }

    fn prev(&mut self) {
        self.selected[self.focus] = self.selected[self.focus].saturating_sub(1);
    }

    fn focus_left(&mut self) {
        self.focus = self.focus.saturating_sub(1);
    }

    fn focus_right(&mut self) {
        if self.focus < KANBAN_COLUMNS.len() - 1 {
            self.focus += 1;
        }
    }

    fn cycle_company(&mut self) {
        self.filter.company = cycle(&self.board.companies, &self.filter.company);
    }

    fn cycle_location(&mut self) {
        self.filter.location = cycle(&self.board.locations, &self.filter.location);
    }

    fn toggle_sort(&mut self) {
        self.filter.sort_order = match self.filter.sort_order {
            SortOrder::Newest => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Newest,
        };
    }
}

/// Steps through `"" -> options[0] -> ... -> ""`.
fn cycle(options: &[String], current: &str) -> String {
    if current.is_empty() {
        return options.first().cloned().unwrap_or_default();
    }
    match options.iter().position(|o| o == current) {
        Some(i) if i + 1 < options.len() => options[i + 1].clone(),
        _ => String::new(),
    }
}

pub fn run_board<S: RemoteStore, A: AuthProvider>(tracker: &mut Tracker<S, A>) -> Result<()> {
    let board = tracker.board(&BoardFilter::default())?;
    let mut state = AppState::new(board);
    let watcher = tracker.watch(QueryKey::Applications);
    state.load_notes(tracker);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, tracker);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    tracker.unwatch(watcher);

    result
}

fn run_loop<S: RemoteStore, A: AuthProvider>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    tracker: &mut Tracker<S, A>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let quit = match state.mode {
                Mode::Browse => handle_browse_key(key.code, state, tracker)?,
                Mode::Reason { .. } => {
                    handle_reason_key(key.code, state, tracker)?;
                    false
                }
                Mode::ConfirmDelete { .. } => {
                    handle_delete_key(key.code, state, tracker)?;
                    false
                }
            };
            if quit {
                break;
            }
        }
    }
    Ok(())
}

fn handle_browse_key<S: RemoteStore, A: AuthProvider>(
    code: KeyCode,
    state: &mut AppState,
    tracker: &mut Tracker<S, A>,
) -> Result<bool> {
    let prev = (state.focus, state.selected[state.focus]);
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
        KeyCode::Down | KeyCode::Char('j') => state.next(),
        KeyCode::Up | KeyCode::Char('k') => state.prev(),
        KeyCode::Left | KeyCode::Char('h') => state.focus_left(),
        KeyCode::Right | KeyCode::Char('l') => state.focus_right(),
        KeyCode::Char('H') | KeyCode::Char('<') => {
            if state.focus > 0 {
                let target = state.focus - 1;
                move_card(state, tracker, target)?;
            }
        }
        KeyCode::Char('L') | KeyCode::Char('>') => {
            if state.focus + 1 < KANBAN_COLUMNS.len() {
                let target = state.focus + 1;
                move_card(state, tracker, target)?;
            }
        }
        KeyCode::Char('x') => {
            move_card(state, tracker, ApplicationStatus::Rejected.column_index())?;
        }
        KeyCode::Char('d') => {
            if let Some(app) = state.current_card() {
                state.mode = Mode::ConfirmDelete {
                    id: app.id.clone(),
                    label: format!("{} - {}", app.company_name, app.job_title),
                };
            }
        }
        KeyCode::Char('z') => {
            state.collapsed[state.focus] = !state.collapsed[state.focus];
        }
        KeyCode::Char('c') => {
            state.cycle_company();
            state.reload(tracker)?;
        }
        KeyCode::Char('o') => {
            state.cycle_location();
            state.reload(tracker)?;
        }
        KeyCode::Char('s') => {
            state.toggle_sort();
            state.reload(tracker)?;
        }
        KeyCode::Char('C') => {
            state.filter.clear();
            state.reload(tracker)?;
        }
        KeyCode::Char('r') => {
            let refetched = tracker.refresh()?;
            state.reload(tracker)?;
            state.message = Some(format!("Refreshed {} quer{}", refetched, if refetched == 1 { "y" } else { "ies" }));
        }
        KeyCode::Char('e') => {
            let path = export_filename(chrono::Local::now().date_naive());
            let csv = tracker.export_csv(&state.filter, None)?;
            std::fs::write(&path, csv)?;
            state.message = Some(format!("Exported to {}", path));
        }
        _ => {}
    }
    if (state.focus, state.selected[state.focus]) != prev {
        state.load_notes(tracker);
    }
    Ok(false)
}

/// Keyboard stand-in for a drag: picks up the focused card and drops it at
/// the top of `target`.
fn move_card<S: RemoteStore, A: AuthProvider>(
    state: &mut AppState,
    tracker: &mut Tracker<S, A>,
    target: usize,
) -> Result<()> {
    let Some(app) = state.current_card() else {
        return Ok(());
    };
    let id = app.id.clone();
    let source = DropLocation {
        column: KANBAN_COLUMNS[state.focus].status,
        index: state.selected[state.focus],
    };
    let destination = DropLocation {
        column: KANBAN_COLUMNS[target].status,
        index: 0,
    };

    state.dnd.handle(DragEvent::Start { id: id.clone(), source });
    let drop = DragEvent::Drop {
        id,
        source,
        destination: Some(destination),
    };
    let moved = match tracker.handle_drag(&mut state.dnd, drop) {
        Ok(DropDecision::Mutate(change)) => {
            state.message = Some(format!("Moved to {}", change.status.column().title));
            Some(change.id)
        }
        Ok(DropDecision::AwaitReason { .. }) => {
            state.mode = Mode::Reason {
                category: 0,
                detail: String::new(),
            };
            None
        }
        Ok(DropDecision::Ignore) => None,
        Err(err) => {
            state.message = Some(format!("Move failed: {}", err));
            None
        }
    };
    state.reload(tracker)?;
    if let Some(id) = moved {
        if state.select_card(&id) {
            state.load_notes(tracker);
        }
    }
    Ok(())
}

fn handle_reason_key<S: RemoteStore, A: AuthProvider>(
    code: KeyCode,
    state: &mut AppState,
    tracker: &mut Tracker<S, A>,
) -> Result<()> {
    let Mode::Reason { category, detail } = &mut state.mode else {
        return Ok(());
    };
    match code {
        KeyCode::Up => *category = category.saturating_sub(1),
        KeyCode::Down => *category = (*category + 1).min(REJECTION_REASONS.len() - 1),
        KeyCode::Backspace => {
            detail.pop();
        }
        KeyCode::Char(c) => detail.push(c),
        KeyCode::Esc => {
            state.dnd.cancel_rejection();
            state.mode = Mode::Browse;
            state.message = Some("Rejection cancelled".to_string());
        }
        KeyCode::Enter => {
            let (category, detail) = (REJECTION_REASONS[*category], detail.clone());
            let pending = state.dnd.pending_rejection().map(str::to_string);
            let rejected = match tracker.confirm_rejection(&mut state.dnd, category, &detail) {
                Ok(()) => {
                    state.message = Some("Marked as rejected".to_string());
                    pending
                }
                Err(err) => {
                    state.dnd.cancel_rejection();
                    state.message = Some(format!("Rejection failed: {}", err));
                    None
                }
            };
            state.mode = Mode::Browse;
            state.reload(tracker)?;
            if let Some(id) = rejected {
                if state.select_card(&id) {
                    state.load_notes(tracker);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn handle_delete_key<S: RemoteStore, A: AuthProvider>(
    code: KeyCode,
    state: &mut AppState,
    tracker: &mut Tracker<S, A>,
) -> Result<()> {
    let Mode::ConfirmDelete { id, .. } = &state.mode else {
        return Ok(());
    };
    match code {
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            let id = id.clone();
            state.message = Some(match tracker.delete_application(&id) {
                Ok(()) => "Deleted".to_string(),
                Err(err) => format!("Delete failed: {}", err),
            });
            state.mode = Mode::Browse;
            state.reload(tracker)?;
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => state.mode = Mode::Browse,
        _ => {}
    }
    Ok(())
}

fn column_color(name: &str) -> Color {
    match name {
        "blue" => Color::Blue,
        "yellow" => Color::Yellow,
        "green" => Color::Green,
        "red" => Color::Red,
        _ => Color::Gray,
    }
}

fn draw(frame: &mut Frame, state: &AppState) {
    let rows = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(8),
        Constraint::Length(10),
        Constraint::Length(1),
    ])
    .split(frame.area());

    // Header: filters
    let filter_line = format!(
        " Company: {}  Location: {}  Sort: {}  {}",
        if state.filter.company.is_empty() { "All" } else { state.filter.company.as_str() },
        if state.filter.location.is_empty() { "All" } else { state.filter.location.as_str() },
        state.filter.sort_order,
        state.message.as_deref().unwrap_or(""),
    );
    frame.render_widget(
        Paragraph::new(filter_line).style(Style::default().add_modifier(Modifier::BOLD)),
        rows[0],
    );

    // Board columns
    let constraints: Vec<Constraint> = state
        .collapsed
        .iter()
        .map(|&collapsed| if collapsed { Constraint::Length(6) } else { Constraint::Fill(1) })
        .collect();
    let columns = Layout::horizontal(constraints).split(rows[1]);

    for (i, column) in state.board.columns.iter().enumerate() {
        let color = column_color(column.config.color);
        let focused = i == state.focus;
        let title = if state.collapsed[i] {
            format!(" {} ", column.count())
        } else {
            format!(" {} ({}) ", column.config.title, column.count())
        };
        let mut block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(color));
        if focused {
            block = block.border_style(Style::default().fg(color).add_modifier(Modifier::BOLD));
        }

        if state.collapsed[i] {
            frame.render_widget(block, columns[i]);
            continue;
        }

        let items: Vec<ListItem> = column
            .applications
            .iter()
            .map(|app| {
                ListItem::new(vec![
                    Line::from(Span::styled(
                        app.company_name.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    )),
                    Line::from(format!("  {}", app.job_title)),
                ])
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol("> ");
        let mut list_state = ListState::default();
        if focused && column.count() > 0 {
            list_state.select(Some(state.selected[i]));
        }
        frame.render_stateful_widget(list, columns[i], &mut list_state);
    }

    // Detail
    let detail = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, rows[2]);

    let help = Paragraph::new(
        " h/l:column j/k:card H/L:move x:reject d:delete c/o:filter s:sort C:clear z:collapse r:refresh e:export q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[3]);

    match &state.mode {
        Mode::Browse => {}
        Mode::Reason { category, detail } => draw_reason_prompt(frame, *category, detail),
        Mode::ConfirmDelete { label, .. } => {
            let area = centered(frame.area(), 50, 5);
            frame.render_widget(Clear, area);
            frame.render_widget(
                Paragraph::new(format!("Delete {}?\n\n y: delete   n: keep", label))
                    .block(Block::default().borders(Borders::ALL).title(" Confirm ")),
                area,
            );
        }
    }
}

fn draw_reason_prompt(frame: &mut Frame, category: usize, detail: &str) {
    let area = centered(frame.area(), 60, REJECTION_REASONS.len() as u16 + 6);
    frame.render_widget(Clear, area);

    let mut lines: Vec<Line> = REJECTION_REASONS
        .iter()
        .enumerate()
        .map(|(i, reason)| {
            if i == category {
                Line::from(Span::styled(
                    format!("> {}", reason),
                    Style::default().add_modifier(Modifier::BOLD),
                ))
            } else {
                Line::from(format!("  {}", reason))
            }
        })
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(format!("Details: {}_", detail)));
    lines.push(Line::from(Span::styled(
        "Up/Down: category  type: details  Enter: confirm  Esc: cancel",
        Style::default().fg(Color::DarkGray),
    )));

    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Mark as Rejected "),
        ),
        area,
    );
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn build_detail(state: &AppState) -> Text<'_> {
    let Some(app) = state.current_card() else {
        return Text::raw("No application selected");
    };

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(Span::styled(
        format!("{} at {}", app.job_title, app.company_name),
        Style::default().add_modifier(Modifier::BOLD),
    )));

    let mut facts = vec![format!("Status: {}", app.status.column().title)];
    if let Some(location) = &app.location {
        facts.push(format!("Location: {}", location));
    }
    if let Some(date) = app.applied_date {
        facts.push(format!("Applied: {}", date));
    }
    if let Some(slot) = app.interview_slot() {
        facts.push(format!("Interview: {}", slot));
    }
    lines.push(Line::from(facts.join("  |  ")));

    if let Some(url) = &app.job_url {
        lines.push(Line::from(format!("URL: {}", url)));
    }
    if !app.tags.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Tags: {}", app.tags.join(", ")),
            Style::default().fg(Color::Cyan),
        )));
    }
    if let Some(reason) = &app.rejection_reason {
        lines.push(Line::from(Span::styled(
            format!("Rejection: {}", reason),
            Style::default().fg(Color::Red),
        )));
    }

    if !state.notes.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Notes ({})", state.notes.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for note in &state.notes {
            for line in textwrap::fill(&note.content, 90).lines() {
                lines.push(Line::from(format!("  {}", line)));
            }
        }
    }

    Text::from(lines)
}
