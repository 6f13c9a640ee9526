use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table};
use ratatui::Frame;

use super::app::{App, Focus};
use crate::utils::format_file_size;

pub fn draw(frame: &mut Frame, app: &App) {
    let [form, current, overall, table, log, help] = Layout::vertical([
        Constraint::Length(5),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(6),
        Constraint::Length(8),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_form(frame, app, form);
    draw_current(frame, app, current);
    draw_overall(frame, app, overall);
    draw_table(frame, app, table);
    draw_log(frame, app, log);

    let hint = if app.running {
        "Downloading...  Ctrl-C cancel"
    } else {
        "Enter download  Tab/Shift-Tab move  Space toggle  Esc quit"
    };
    frame.render_widget(Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)), help);
}

fn field_style(app: &App, focus: Focus, enabled: bool) -> Style {
    if !enabled || app.running {
        Style::default().fg(Color::DarkGray)
    } else if app.focus == focus {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn text_field<'a>(app: &App, label: &'a str, value: &'a str, focus: Focus, enabled: bool) -> Vec<Span<'a>> {
    let cursor = if app.focus == focus && enabled && !app.running { "_" } else { "" };
    vec![
        Span::raw(format!("{}: ", label)),
        Span::styled(format!("{}{}", value, cursor), field_style(app, focus, enabled)),
        Span::raw("  "),
    ]
}

fn checkbox<'a>(app: &App, label: &'a str, checked: bool, focus: Focus) -> Span<'a> {
    let mark = if checked { "[x]" } else { "[ ]" };
    Span::styled(format!("{} {}", mark, label), field_style(app, focus, true))
}

fn draw_form(frame: &mut Frame, app: &App, area: Rect) {
    let url = Line::from(text_field(app, "URL", &app.url, Focus::Url, true));

    let mut manual = vec![checkbox(app, "Manual tags", app.manual, Focus::Manual), Span::raw("  ")];
    manual.extend(text_field(app, "Artist", &app.artist, Focus::Artist, app.manual));
    manual.extend(text_field(app, "Album", &app.album, Focus::Album, app.manual));
    manual.extend(text_field(app, "Year", &app.year, Focus::Year, app.manual));

    let share = Line::from(checkbox(
        app,
        "Share playlist thumbnail",
        app.share_thumbnail,
        Focus::ShareThumbnail,
    ));

    let block = Block::default().borders(Borders::ALL).title(" ytmd ");
    frame.render_widget(Paragraph::new(vec![url, Line::from(manual), share]).block(block), area);
}

fn draw_current(frame: &mut Frame, app: &App, area: Rect) {
    let (title, ratio, label) = match &app.current {
        Some(current) if current.total > 0 => (
            current.label.clone(),
            (current.downloaded as f64 / current.total as f64).clamp(0.0, 1.0),
            format!(
                "{} / {}",
                format_file_size(current.downloaded),
                format_file_size(current.total)
            ),
        ),
        _ => ("Current".to_string(), 0.0, String::new()),
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, area);
}

fn draw_overall(frame: &mut Frame, app: &App, area: Rect) {
    let (ratio, label) = match app.overall {
        Some((completed, total)) if total > 0 => (
            (completed as f64 / total as f64).clamp(0.0, 1.0),
            format!("{}/{}", completed, total),
        ),
        _ => (0.0, String::new()),
    };
    let title = app.job_title.as_deref().unwrap_or("Overall");

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)))
        .gauge_style(Style::default().fg(Color::Yellow))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, area);
}

fn draw_table(frame: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(["#", "Title", "Artist", "Album", "Year", "Track"])
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    let cell = |value: &Option<String>| Cell::from(value.clone().unwrap_or_default());
    let rows = app.rows.iter().map(|(index, tags)| {
        Row::new(vec![
            Cell::from(index.to_string()),
            cell(&tags.title),
            cell(&tags.artist),
            cell(&tags.album),
            cell(&tags.year),
            cell(&tags.track),
        ])
    });

    let widths = [
        Constraint::Length(4),
        Constraint::Percentage(35),
        Constraint::Percentage(20),
        Constraint::Percentage(25),
        Constraint::Length(6),
        Constraint::Length(6),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(" Tags "));
    frame.render_widget(table, area);
}

fn draw_log(frame: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.log.len().saturating_sub(visible);
    let items: Vec<ListItem> = app.log[start..]
        .iter()
        .map(|line| ListItem::new(line.as_str()))
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Log "));
    frame.render_widget(list, area);
}
