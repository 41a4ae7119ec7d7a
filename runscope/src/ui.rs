//! UI rendering for the TUI.

use ratatui::{
    layout::{Constraint, Layout, Margin, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Table, Wrap,
    },
    Frame,
};
use runscope_core::format::{format_relative_text, format_seconds, format_timestamp, format_tokens};
use runscope_core::{Lane, LaneMark, MessageNode, Run, RunSession, ToolCallNode};

use crate::app::{App, ConnectionStatus, Focus};

/// Border color for the run info block
const BORDER_INFO: Color = Color::Rgb(0, 150, 150);
/// Border color for the messages block
const BORDER_MESSAGES: Color = Color::Rgb(100, 100, 180);
/// Dimmed border for panes without focus
const BORDER_IDLE: Color = Color::Rgb(70, 70, 70);
/// Tool call accent
const TOOL_COLOR: Color = Color::Rgb(220, 180, 0);

/// Section columns cycle through these.
const LANE_COLORS: [Color; 6] = [
    Color::Rgb(0, 180, 180),
    Color::Rgb(200, 120, 220),
    Color::Rgb(50, 205, 50),
    Color::Rgb(255, 127, 80),
    Color::Rgb(100, 149, 237),
    Color::Rgb(220, 180, 0),
];

const SIDEBAR_WIDTH: u16 = 44;
const RUN_INFO_MAX_HEIGHT: u16 = 12;

/// Main render function.
pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::vertical([
        Constraint::Length(2), // Header
        Constraint::Min(0),    // Body
        Constraint::Length(1), // Footer
    ])
    .split(frame.area());

    render_header(frame, app, chunks[0]);

    let body = if app.sidebar_open {
        let columns = Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
            .split(chunks[1]);
        render_runs(frame, app, columns[0]);
        columns[1]
    } else {
        chunks[1]
    };

    let info_height = run_info_height(app);
    let panes = Layout::vertical([Constraint::Length(info_height), Constraint::Min(3)]).split(body);
    render_run_info(frame, app, panes[0]);
    render_messages(frame, app, panes[1]);

    render_footer(frame, app, chunks[2]);
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let (dot, color) = match app.status {
        ConnectionStatus::Connected => ("●", Color::Green),
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting { .. } => ("◌", Color::Yellow),
        ConnectionStatus::Disconnected(_) | ConnectionStatus::GaveUp { .. } => ("✕", Color::Red),
    };

    let mut spans = vec![
        Span::styled(" runscope ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.location().to_string(), Style::default().fg(Color::White)),
        Span::raw("  "),
        Span::styled(format!("{dot} {}", app.status.label()), Style::default().fg(color)),
    ];
    if app.state.follow() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "⇢ follow",
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, area);
}

fn focus_border(app: &App, focus: Focus, active: Color) -> Style {
    if app.focus == focus {
        Style::default().fg(active)
    } else {
        Style::default().fg(BORDER_IDLE)
    }
}

/// Render the run list.
fn render_runs(frame: &mut Frame, app: &mut App, area: Rect) {
    let header_cells = ["ID", "Model", "State", "Started"]
        .into_iter()
        .map(|h| Cell::from(h).style(Style::default().fg(Color::Yellow).bold()));
    let header = Row::new(header_cells).height(1);

    let current = app.state.registry().current_run_id();
    let pending = app.state.registry().pending_run_id();

    let rows: Vec<Row> = app
        .state
        .registry()
        .runs_newest_first()
        .into_iter()
        .map(|run| {
            let marker = if Some(run.id) == current {
                Span::styled("●", Style::default().fg(Color::Green))
            } else if Some(run.id) == pending {
                Span::styled("…", Style::default().fg(Color::Yellow))
            } else {
                Span::raw(" ")
            };
            let state_style = if run.is_stopped() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Green)
            };

            Row::new([
                Cell::from(Line::from(vec![marker, Span::raw(format!("{}", run.id))])),
                Cell::from(run.model.clone()),
                Cell::from(run.state.clone()).style(state_style),
                Cell::from(format_relative_text(run.started_at.as_deref()))
                    .style(Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(6),  // ID
        Constraint::Fill(1),    // Model
        Constraint::Length(11), // State
        Constraint::Length(8),  // Started
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(focus_border(app, Focus::Runs, Color::Cyan))
                .title(" Runs "),
        )
        .row_highlight_style(
            Style::default()
                .add_modifier(Modifier::REVERSED)
                .fg(Color::Cyan),
        )
        .highlight_symbol("▶ ");

    let index = app.highlighted_index();
    app.table_state.select(index);
    frame.render_stateful_widget(table, area, &mut app.table_state);
}

fn run_info_lines(app: &App) -> Vec<Line<'static>> {
    let Some(session) = app.state.session() else {
        return vec![Line::styled(
            "No run selected. Pick one with j/k, or wait for a deep-linked run.",
            Style::default().fg(Color::DarkGray),
        )];
    };
    match app.state.registry().get(session.run_id) {
        Some(run) => describe_run(run),
        None => vec![Line::styled(
            format!("Waiting for metadata of run {}", session.run_id),
            Style::default().fg(Color::DarkGray),
        )],
    }
}

fn describe_run(run: &Run) -> Vec<Line<'static>> {
    let label = Style::default().fg(Color::DarkGray);
    let started = run.started_at.as_deref().map(format_timestamp);
    let stopped = run.stopped_at.as_deref().map(format_timestamp);

    let mut lines = vec![Line::from(vec![
        Span::styled(run.model.clone(), Style::default().fg(Color::Cyan).bold()),
        Span::raw("  "),
        Span::styled(run.state.clone(), Style::default().fg(Color::Green)),
        Span::styled(
            if run.tag.is_empty() {
                String::new()
            } else {
                format!("  #{}", run.tag)
            },
            Style::default().fg(Color::Magenta),
        ),
    ])];
    lines.push(Line::from(vec![
        Span::styled("started ", label),
        Span::raw(started.unwrap_or_else(|| "-".to_string())),
        Span::styled("  stopped ", label),
        Span::raw(stopped.unwrap_or_else(|| "-".to_string())),
    ]));
    for line in run.configuration_display().lines() {
        lines.push(Line::styled(line.to_string(), Style::default().fg(Color::Gray)));
    }
    lines
}

fn run_info_height(app: &App) -> u16 {
    let lines = run_info_lines(app).len() as u16;
    (lines + 2).min(RUN_INFO_MAX_HEIGHT)
}

fn render_run_info(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.state.session() {
        Some(session) => format!(" Run {} ", session.run_id),
        None => " Run ".to_string(),
    };
    let info = Paragraph::new(run_info_lines(app)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(BORDER_INFO))
            .title(title)
            .title_style(Style::default().fg(BORDER_INFO).bold()),
    );
    frame.render_widget(info, area);
}

fn lane_color(column: usize) -> Color {
    LANE_COLORS[column % LANE_COLORS.len()]
}

/// Gutter spans for one line of a message. The header line shows where
/// sections start and end; continuation lines only carry open sections on.
fn gutter(lanes: &[Lane<'_>], header: bool) -> Vec<Span<'static>> {
    let mut spans: Vec<Span> = lanes
        .iter()
        .enumerate()
        .map(|(column, lane)| {
            let symbol = match (lane.mark, header) {
                (LaneMark::Empty, _) => " ",
                (LaneMark::Start, true) => "┌",
                (LaneMark::Inside, _) | (LaneMark::Start, false) => "│",
                (LaneMark::End, true) => "└",
                (LaneMark::Only, true) => "╶",
                (LaneMark::End | LaneMark::Only, false) => " ",
            };
            Span::styled(symbol, Style::default().fg(lane_color(column)))
        })
        .collect();
    if !spans.is_empty() {
        spans.push(Span::raw(" "));
    }
    spans
}

fn with_gutter(lanes: &[Lane<'_>], body: Vec<Span<'static>>) -> Line<'static> {
    let mut spans = gutter(lanes, false);
    spans.extend(body);
    Line::from(spans)
}

/// Display lines for one message, with its section gutter.
fn message_lines(session: &RunSession, message: &MessageNode) -> Vec<Line<'static>> {
    let lanes = session.lanes(message.id);
    let mut lines = Vec::new();

    let (role, role_style) = match message.role.as_deref() {
        Some("user") => ("user".to_string(), Style::default().fg(Color::Cyan).bold()),
        Some("system") => ("system".to_string(), Style::default().fg(Color::Magenta)),
        Some(role) => (role.to_string(), Style::default().fg(Color::Green).bold()),
        None => ("…".to_string(), Style::default().fg(Color::DarkGray)),
    };

    let mut header = gutter(&lanes, true);
    header.push(Span::styled(
        format!("#{} ", message.id),
        Style::default().fg(Color::DarkGray),
    ));
    header.push(Span::styled(role, role_style));
    if let Some(duration) = message.duration {
        header.push(Span::styled(
            format!("  {}", format_seconds(duration)),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if let (Some(query), Some(response)) = (message.tokens_query, message.tokens_response) {
        header.push(Span::styled(
            format!("  {}", format_tokens(query, response)),
            Style::default().fg(Color::DarkGray),
        ));
    }
    for (column, lane) in lanes.iter().enumerate() {
        if let (LaneMark::Start | LaneMark::Only, Some(section)) = (lane.mark, lane.section) {
            header.push(Span::styled(
                format!("  {}", section.name),
                Style::default().fg(lane_color(column)).italic(),
            ));
        }
    }
    lines.push(Line::from(header));

    for text in message.content.lines() {
        lines.push(with_gutter(&lanes, vec![Span::raw(format!("  {text}"))]));
    }
    for call in &message.tool_calls {
        lines.extend(tool_call_lines(&lanes, call));
    }
    lines.push(with_gutter(&lanes, Vec::new()));
    lines
}

fn tool_call_lines(lanes: &[Lane<'_>], call: &ToolCallNode) -> Vec<Line<'static>> {
    let name = if call.function_name.is_empty() {
        call.id.clone()
    } else {
        call.function_name.clone()
    };
    let mut title = vec![
        Span::styled("  ⚙ ", Style::default().fg(TOOL_COLOR)),
        Span::styled(name, Style::default().fg(TOOL_COLOR).bold()),
    ];
    if !call.state.is_empty() {
        title.push(Span::styled(
            format!(" [{}]", call.state),
            Style::default().fg(Color::DarkGray),
        ));
    }
    if let Some(duration) = call.duration {
        title.push(Span::styled(
            format!(" {}", format_seconds(duration)),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let mut lines = vec![with_gutter(lanes, title)];
    if !call.arguments.is_empty() {
        lines.push(with_gutter(
            lanes,
            vec![Span::styled(
                format!("    $ {}", call.arguments),
                Style::default().fg(Color::White),
            )],
        ));
    }
    for text in call.result_text.lines() {
        lines.push(with_gutter(
            lanes,
            vec![Span::styled(
                format!("    │ {text}"),
                Style::default().fg(Color::Gray),
            )],
        ));
    }
    lines
}

fn render_messages(frame: &mut Frame, app: &mut App, area: Rect) {
    let lines: Vec<Line> = match app.state.session() {
        Some(session) if !session.trace.is_empty() => session
            .trace
            .messages()
            .flat_map(|message| message_lines(session, message))
            .collect(),
        Some(_) => vec![Line::styled(
            "Waiting for messages…",
            Style::default().fg(Color::DarkGray),
        )],
        None => Vec::new(),
    };

    // Clamp scroll offset against wrapped rows; auto-scroll pins to the bottom
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    let total_rows = paragraph.line_count(area.width.saturating_sub(2));
    let visible = area.height.saturating_sub(2) as usize;
    let max_scroll = total_rows.saturating_sub(visible);
    if app.auto_scroll || app.scroll_offset > max_scroll {
        app.scroll_offset = max_scroll;
    }

    let title = if app.auto_scroll {
        " Messages "
    } else {
        " Messages (paused) "
    };
    let paragraph = paragraph
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(focus_border(app, Focus::Messages, BORDER_MESSAGES))
                .title(title)
                .title_style(Style::default().fg(BORDER_MESSAGES).bold()),
        )
        .scroll((scroll_rows(app.scroll_offset), 0));

    frame.render_widget(paragraph, area);

    let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
        .begin_symbol(Some("↑"))
        .end_symbol(Some("↓"));
    let mut scrollbar_state = ScrollbarState::new(total_rows).position(app.scroll_offset);

    frame.render_stateful_widget(
        scrollbar,
        area.inner(Margin {
            vertical: 1,
            horizontal: 0,
        }),
        &mut scrollbar_state,
    );
}

/// Paragraph scroll is in `u16` rows; offsets past that stick at the end.
fn scroll_rows(offset: usize) -> u16 {
    u16::try_from(offset).unwrap_or(u16::MAX)
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let key = Style::default().fg(Color::Yellow);
    let mut spans = vec![
        Span::styled(" j/k", key),
        Span::raw(" navigate  "),
        Span::styled("Enter", key),
        Span::raw(" open  "),
        Span::styled("Tab", key),
        Span::raw(" focus  "),
        Span::styled("s", key),
        Span::raw(" sidebar  "),
        Span::styled("f", key),
        Span::raw(" follow  "),
        Span::styled("space", key),
        Span::raw(" auto-scroll  "),
        Span::styled("q", key),
        Span::raw(" quit  "),
        Span::raw("│ "),
        Span::styled(
            format!("{} runs", app.state.registry().len()),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(error) = &app.last_error {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(error.clone(), Style::default().fg(Color::Red)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
