//! Common UI components.
//!
//! This module contains the header bar, instance tabs, status bar, and help
//! overlay.

use chrono::Utc;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};

use crate::app::App;
use crate::data::format::relative_duration;
use crate::data::ServiceStatus;
use crate::poll::InstanceReport;

/// Render the header bar with the health of the whole cycle.
///
/// Displays: status indicator, service counts by status, instance counts.
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let Some(ref report) = app.report else {
        let line = Line::from(vec![
            Span::styled(" MONIT ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("| Fetching data..."),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    };

    let totals = report.totals();
    let ready = report.summaries().count();
    let failed_instances = report.failures().count();

    let overall = if totals.failed > 0 || failed_instances > 0 || app.cycle_error.is_some() {
        ServiceStatus::Failed
    } else if totals.unmonitored > 0 {
        ServiceStatus::Unmonitored
    } else {
        ServiceStatus::Ok
    };

    let count = |n: usize, status: ServiceStatus| {
        if n > 0 {
            Span::styled(n.to_string(), app.theme.status_style(status))
        } else {
            Span::styled("0", Style::default().add_modifier(Modifier::DIM))
        }
    };

    let line = Line::from(vec![
        Span::styled(" ● ", app.theme.status_style(overall)),
        Span::styled("MONIT ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        count(totals.healthy, ServiceStatus::Ok),
        Span::raw(" ok "),
        count(totals.unmonitored, ServiceStatus::Unmonitored),
        Span::raw(" unmonitored "),
        count(totals.failed, ServiceStatus::Failed),
        Span::raw(" failed │ "),
        Span::styled(
            totals.total.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" services │ "),
        Span::raw(format!("{}/{} instances up", ready, ready + failed_instances)),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Render one tab per instance of the current cycle.
///
/// Highlights the selected instance.
pub fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = app
        .instances()
        .iter()
        .map(|report| {
            let status = match report {
                InstanceReport::Ready(summary) => summary.status,
                InstanceReport::Failed { .. } => ServiceStatus::Failed,
            };
            Line::from(vec![
                Span::styled(format!(" {}", status.symbol()), app.theme.status_style(status)),
                Span::raw(format!(" {} ", report.id())),
            ])
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.selected_instance)
        .style(app.theme.tab_inactive)
        .highlight_style(app.theme.tab_active)
        .divider("|");

    frame.render_widget(tabs, area);
}

/// Render the status bar at the bottom.
///
/// Shows: data source, time since the last cycle, available controls.
/// Also displays temporary status messages and errors.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    // Check for temporary status message first
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    let status = if let Some(ref report) = app.report {
        let updated = relative_duration(report.completed_at.timestamp(), Utc::now());
        format!(
            " {} | Updated {} ago | ↑↓:select Tab:instance Enter:details a:all r:refresh ?:help q:quit",
            app.source_description(),
            updated,
        )
    } else if let Some(ref err) = app.load_error {
        format!(" Error: {} | q:quit r:retry", err)
    } else if app.cycle_error.is_some() {
        format!(" {} | q:quit r:retry", app.source_description())
    } else {
        " Fetching data... | q:quit".to_string()
    };

    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));

    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
///
/// Displayed as a centered modal on top of the panel.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        Line::from(vec![Span::styled(
            " Navigation",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  ←/→ Tab     Switch instance"),
        Line::from("  ↑/↓ j/k     Select service"),
        Line::from("  PgUp/PgDn   Jump 10 services"),
        Line::from("  Home/End    Jump to first/last"),
        Line::from("  Enter       Toggle details"),
        Line::from(""),
        Line::from(vec![Span::styled(
            " General",
            Style::default().add_modifier(Modifier::BOLD),
        )]),
        Line::from("  a         Show all services"),
        Line::from("  r         Refresh now"),
        Line::from("  e         Export to JSON"),
        Line::from("  q         Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);

    // Center the help overlay - responsive to terminal size
    let help_width = 40u16.min(area.width.saturating_sub(4));
    let help_height = 20u16.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(help_width)) / 2;
    let y = area.y + (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(x, y, help_width, help_height);

    // Clear the area behind the help
    frame.render_widget(ratatui::widgets::Clear, help_area);
    frame.render_widget(paragraph, help_area);
}
