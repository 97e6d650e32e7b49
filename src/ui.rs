use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::config::API_KEY_VAR;

/// Visible lines of the question box.
const INPUT_ROWS: u16 = 5;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, response, token usage, input, footer
    let [header_area, response_area, usage_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(5),
        Constraint::Length(INPUT_ROWS + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_response(app, frame, response_area);
    render_usage(app, frame, usage_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" Clinical Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!(" {} ", app.model), Style::default().fg(Color::White)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ];

    if !app.has_credential {
        spans.push(Span::styled(
            format!("  {API_KEY_VAR} not set, requests will fail "),
            Style::default().fg(Color::Yellow).bold(),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_response(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store inner dimensions for scroll calculations
    app.response_height = area.height.saturating_sub(2);
    app.response_width = area.width.saturating_sub(2);

    let border_color = if app.view.failed { Color::Red } else { Color::Cyan };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Assistant's Response ");

    let text = if app.view.busy {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        Text::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else if app.view.response.is_empty() {
        Text::from(Span::styled(
            "Ask a clinical question below...",
            Style::default().fg(Color::DarkGray),
        ))
    } else if app.view.failed {
        Text::styled(app.view.response.as_str(), Style::default().fg(Color::Red))
    } else {
        // Shown exactly as returned, no markdown rendering
        Text::raw(app.view.response.as_str())
    };

    let response = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.response_scroll, 0));

    frame.render_widget(response, area);
}

fn render_usage(app: &App, frame: &mut Frame, area: Rect) {
    let usage = app.view.usage;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Token Usage ");

    let lines = vec![
        Line::from(format!("Prompt tokens: {}", usage.prompt_tokens)),
        Line::from(format!("Completion tokens: {}", usage.completion_tokens)),
        Line::from(format!("Total tokens: {}", usage.total_tokens)),
    ];

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.view.busy { Color::DarkGray } else { Color::Yellow };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Your Question (Alt+Enter for a new line) ");

    // Inner size = total size - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;
    if inner_width == 0 || inner_height == 0 {
        frame.render_widget(block, area);
        return;
    }

    let (rows, (cursor_row, cursor_col)) = wrap_input(&app.view.input, app.cursor, inner_width);

    // Scroll vertically to keep the cursor row visible
    let scroll_offset = cursor_row.saturating_sub(inner_height - 1);

    let lines: Vec<Line> = rows.into_iter().map(Line::from).collect();
    let input = Paragraph::new(lines)
        .style(Style::default().fg(Color::Cyan))
        .block(block)
        .scroll((scroll_offset as u16, 0));

    frame.render_widget(input, area);

    frame.set_cursor_position((
        area.x + 1 + cursor_col as u16,
        area.y + 1 + (cursor_row - scroll_offset) as u16,
    ));
}

/// Hard-wrap the question at `width` chars, keeping its line breaks, and
/// locate `cursor` (a char index) as a (row, column) in the wrapped rows.
fn wrap_input(input: &str, cursor: usize, width: usize) -> (Vec<String>, (usize, usize)) {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut cursor_at = (0, 0);
    let mut line_start = 0;

    for line in input.split('\n') {
        let chars: Vec<char> = line.chars().collect();
        let first_row = rows.len();

        if chars.is_empty() {
            rows.push(String::new());
        } else {
            rows.extend(chars.chunks(width).map(|chunk| chunk.iter().collect::<String>()));
        }

        let len = chars.len();
        if (line_start..=line_start + len).contains(&cursor) {
            let offset = cursor - line_start;
            // Cursor after a full last row gets a fresh row of its own
            if len > 0 && offset == len && len % width == 0 {
                rows.push(String::new());
            }
            cursor_at = (first_row + offset / width, offset % width);
        }

        line_start += len + 1;
    }

    (rows, cursor_at)
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let disabled_style = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let (send_key, send_label) = if app.view.busy {
        (disabled_style, disabled_style)
    } else {
        (key_style, label_style)
    };

    let mut hints = Vec::new();
    if app.view.busy {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        hints.push(Span::styled(
            format!(" Waiting for response{dots:<3} "),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }

    hints.extend([
        Span::styled(" Enter ", send_key),
        Span::styled(" send ", send_label),
        Span::styled(" Alt+Enter ", key_style),
        Span::styled(" newline ", label_style),
        Span::styled(" ^L ", key_style),
        Span::styled(" clear ", label_style),
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}
