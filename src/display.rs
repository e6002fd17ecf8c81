//! Terminal UI display using ratatui.

use crate::sampler::Snapshot;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
    Frame,
};

/// Format a kilobyte figure to a human readable string
pub fn format_kb(kb: u64) -> String {
    const MB: u64 = 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if kb >= TB {
        format!("{:.2} TB", kb as f64 / TB as f64)
    } else if kb >= GB {
        format!("{:.2} GB", kb as f64 / GB as f64)
    } else if kb >= MB {
        format!("{:.2} MB", kb as f64 / MB as f64)
    } else {
        format!("{} KB", kb)
    }
}

/// Format axis tick boundaries for a chart title
fn format_ticks(ticks: &[u64]) -> String {
    ticks
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Get color based on percentage value
fn percentage_color(value: u64, warn_threshold: u64, crit_threshold: u64) -> Color {
    if value >= crit_threshold {
        Color::Red
    } else if value >= warn_threshold {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// Render the CPU chart with its live readout and axis ticks
pub fn render_cpu(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let block = Block::default()
        .title(" CPU ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(3)])
        .split(inner);

    let color = percentage_color(snapshot.cpu_percent, 70, 90);
    let readout = Line::from(vec![
        Span::raw("Usage: "),
        Span::styled(
            format!("{}%", snapshot.cpu_percent),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  Ticks: "),
        Span::styled(
            format_ticks(&snapshot.cpu_ticks),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(readout), chunks[0]);

    let data: Vec<u64> = snapshot.cpu_series.iter().map(|s| s.value).collect();
    let max = snapshot.cpu_ticks.last().copied().unwrap_or(100).max(1);
    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .data(&data)
        .max(max)
        .style(Style::default().fg(color));
    f.render_widget(sparkline, chunks[1]);
}

/// Render the virtual and resident memory charts
pub fn render_memory(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let block = Block::default()
        .title(" Memory ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(50),
            Constraint::Percentage(50),
        ])
        .split(inner);

    let ratio_color = percentage_color(snapshot.memory_ratio_percent, 70, 90);
    let readout = Line::from(vec![
        Span::raw("Virt: "),
        Span::styled(
            format_kb(snapshot.virt_memory_kb),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  Res: "),
        Span::styled(
            format_kb(snapshot.res_memory_kb),
            Style::default().fg(Color::Magenta),
        ),
        Span::raw("  Ratio: "),
        Span::styled(
            format!("{}%", snapshot.memory_ratio_percent),
            Style::default().fg(ratio_color).add_modifier(Modifier::BOLD),
        ),
    ]);
    f.render_widget(Paragraph::new(readout), chunks[0]);

    let virt_data: Vec<u64> = snapshot.virt_memory_series.iter().map(|s| s.value).collect();
    let virt_sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Virtual % "),
        )
        .data(&virt_data)
        .max(100)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(virt_sparkline, chunks[1]);

    let res_data: Vec<u64> = snapshot.res_memory_series.iter().map(|s| s.value).collect();
    let res_sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Resident % "),
        )
        .data(&res_data)
        .max(100)
        .style(Style::default().fg(Color::Magenta));
    f.render_widget(res_sparkline, chunks[2]);
}

/// Render the connection chart
pub fn render_connections(f: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let block = Block::default()
        .title(" Connections ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(3)])
        .split(inner);

    let readout = Line::from(vec![
        Span::raw("Established: "),
        Span::styled(
            snapshot.current_connections.to_string(),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  Ticks: "),
        Span::styled(
            format_ticks(&snapshot.conn_ticks),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(readout), chunks[0]);

    let data: Vec<u64> = snapshot.connection_series.iter().map(|s| s.value).collect();
    let max = snapshot.conn_ticks.last().copied().unwrap_or(1000).max(1);
    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .data(&data)
        .max(max)
        .style(Style::default().fg(Color::Green));
    f.render_widget(sparkline, chunks[1]);
}

/// Render the bottom help bar
pub fn render_help_bar(f: &mut Frame, area: Rect, instance: &str, sequence: u32) {
    let help = Line::from(vec![
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(":quit  "),
        Span::styled(
            format!("instance: {}  sample #{}", instance, sequence),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(help), area);
}
