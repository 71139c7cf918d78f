//! Instance panel rendering.
//!
//! Shows the selected instance: daemon and host metadata, the table of
//! listed services, and the details of the selected service.

use chrono::{DateTime, Local, Offset, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use crate::app::App;
use crate::data::format::{format_bytes, format_bytes_with, format_latency, updated_label};
use crate::data::{
    CheckStatus, InstanceSummary, ServiceChecks, ServiceExtra, ServiceStatus, ServiceViewRecord,
};
use crate::poll::InstanceReport;

/// Height of the details pane, borders included.
const DETAILS_HEIGHT: u16 = 8;

/// Render the panel for the selected instance.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(ref err) = app.cycle_error {
        render_error(frame, app, area, " Error ", err, None);
        return;
    }

    match app.current_instance() {
        None => {
            let message = match app.load_error {
                Some(ref err) => format!("Error: {}", err),
                None => "Fetching data...".to_string(),
            };
            let paragraph = Paragraph::new(message)
                .alignment(Alignment::Center)
                .style(Style::default().add_modifier(Modifier::DIM));
            frame.render_widget(paragraph, area);
        }
        Some(InstanceReport::Failed {
            id,
            error,
            last_fetched,
        }) => {
            let title = format!(" {} ", id);
            render_error(frame, app, area, &title, &error.to_string(), *last_fetched);
        }
        Some(InstanceReport::Ready(summary)) => render_instance(frame, app, summary, area),
    }
}

/// Fetch time in the local offset.
fn updated(at: DateTime<Utc>) -> String {
    updated_label(at, Utc::now(), &Local::now().offset().fix())
}

/// Persistent error block with the retry hint.
fn render_error(
    frame: &mut Frame,
    app: &App,
    area: Rect,
    title: &str,
    message: &str,
    last_fetched: Option<DateTime<Utc>>,
) {
    let dim = Style::default().add_modifier(Modifier::DIM);
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            message.to_string(),
            app.theme.status_style(ServiceStatus::Failed),
        )),
        Line::from(""),
    ];
    if let Some(at) = last_fetched {
        lines.push(Line::from(Span::styled(format!("Last {}", updated(at)), dim)));
    }
    lines.push(Line::from(Span::styled("Press r to retry", dim)));
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.failed));
    let paragraph = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_instance(frame: &mut Frame, app: &App, summary: &InstanceSummary, area: Rect) {
    let chunks = Layout::vertical([
        Constraint::Length(2),              // Instance info
        Constraint::Min(5),                 // Services
        Constraint::Length(DETAILS_HEIGHT), // Details of the selection
    ])
    .split(area);

    render_info(frame, app, summary, chunks[0]);
    render_services(frame, app, summary, chunks[1]);
    render_details(frame, app, summary, chunks[2]);
}

fn render_info(frame: &mut Frame, app: &App, summary: &InstanceSummary, area: Rect) {
    let server = &summary.server;
    let platform = &summary.platform;

    let mut first = vec![
        Span::styled(format!(" {} ", summary.url), Style::default().fg(app.theme.highlight)),
        Span::raw(format!("│ Monit {} │ up {}", server.version, server.uptime_relative)),
    ];
    if !server.localhostname.is_empty() {
        first.push(Span::raw(format!(" │ {}", server.localhostname)));
    }
    first.push(Span::styled(
        format!(" │ {}", updated(summary.fetched_at)),
        Style::default().add_modifier(Modifier::DIM),
    ));

    let mut second = vec![Span::raw(format!(
        " {} {} {} │ {} cores │ {} RAM",
        platform.name,
        platform.release,
        platform.machine,
        platform.cores,
        format_bytes_with(platform.memory_kb, 1)
    ))];
    let hidden = app.hidden_count();
    if hidden > 0 {
        second.push(Span::styled(
            format!(" │ {} healthy hidden (a: show all)", hidden),
            Style::default().add_modifier(Modifier::DIM),
        ));
    }
    if !summary.service_errors.is_empty() {
        second.push(Span::styled(
            format!(" │ {} malformed", summary.service_errors.len()),
            Style::default().fg(app.theme.unmonitored),
        ));
    }

    frame.render_widget(Paragraph::new(vec![Line::from(first), Line::from(second)]), area);
}

fn render_services(frame: &mut Frame, app: &App, summary: &InstanceSummary, area: Rect) {
    let services = app.visible_services();

    let header = Row::new(vec!["", "Service", "Type", "Checks", "Info"])
        .height(1)
        .style(app.theme.header);

    let rows: Vec<Row> = services
        .iter()
        .map(|s| {
            let mut name = s.name.clone();
            if app.history.is_changed(&summary.id, &s.name) {
                name.push_str(" ↺");
            }
            let row = Row::new(vec![
                Cell::from(s.status.symbol()).style(app.theme.status_style(s.status)),
                Cell::from(name),
                Cell::from(s.kind.label()),
                Cell::from(check_summary(&s.checks)),
                Cell::from(extra_summary(s)),
            ]);
            if s.essential {
                row
            } else {
                row.style(app.theme.noncritical)
            }
        })
        .collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Fill(2),
        Constraint::Length(12),
        Constraint::Fill(2),
        Constraint::Fill(3),
    ];

    let t = &summary.totals;
    let title = format!(
        " Services ({}/{}) {} ok {} unmonitored {} failed ",
        services.len(),
        t.total,
        t.healthy,
        t.unmonitored,
        t.failed
    );

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(app.theme.border_type)
                .border_style(Style::default().fg(app.theme.border)),
        )
        .row_highlight_style(app.theme.selected)
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    if !services.is_empty() {
        state.select(Some(app.selected_service.min(services.len() - 1)));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

fn render_details(frame: &mut Frame, app: &App, summary: &InstanceSummary, area: Rect) {
    let block = Block::default()
        .title(" Details ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.border));

    let Some(record) = app.selected_record() else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };

    let lines: Vec<Line> = if app.is_expanded(&summary.id, record) {
        detail_lines(record)
    } else {
        vec![Line::from(Span::styled(
            "Press Enter to show details",
            Style::default().add_modifier(Modifier::DIM),
        ))]
    };

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn detail_lines(record: &ServiceViewRecord) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = record
        .details
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Line::from(l.to_string()))
        .collect();

    match &record.extra {
        ServiceExtra::System(metrics) => lines.push(Line::from(format!(
            "{} cores ({}) │ {} memory │ {} swap",
            metrics.cpu.cores,
            metrics.cpu.family,
            format_bytes(metrics.memory.total),
            format_bytes(metrics.swap.total)
        ))),
        ServiceExtra::Program(program) => {
            lines.push(Line::from(format!("Output: {}", program.excerpt())))
        }
        ServiceExtra::None => {}
    }
    lines
}

/// One-line summary of the check results.
pub fn check_summary(checks: &ServiceChecks) -> String {
    let mut parts = Vec::new();

    if let Some(icmp) = &checks.icmp {
        parts.push(format!("ping {}", latency(icmp.response_time, icmp.status)));
    }
    for (port, check) in &checks.ports {
        parts.push(format!(
            "{}/{} {}",
            port,
            check.protocol,
            latency(check.response_time, check.status)
        ));
    }
    if let Some(disk) = &checks.disk {
        parts.push(format!("disk {}%", disk.percent));
    }

    parts.join("  ")
}

fn latency(response_time: Option<f64>, status: CheckStatus) -> String {
    match (status, response_time) {
        (CheckStatus::Slow, _) => "no answer".to_string(),
        (CheckStatus::Ok, Some(t)) => format_latency(t),
        (CheckStatus::Ok, None) => "-".to_string(),
    }
}

fn extra_summary(record: &ServiceViewRecord) -> String {
    match &record.extra {
        ServiceExtra::System(m) => format!(
            "load {:.2} │ cpu {:.1}% │ mem {:.1}%",
            m.load.avg01,
            m.cpu.user + m.cpu.system,
            m.memory.percent
        ),
        ServiceExtra::Program(p) => p.excerpt(),
        ServiceExtra::None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CheckResult, DiskCheck, PortCheck};

    #[test]
    fn test_check_summary() {
        let mut checks = ServiceChecks {
            icmp: Some(CheckResult::from_time(Some(0.02))),
            ..Default::default()
        };
        checks.ports.insert(
            443,
            PortCheck {
                response_time: Some(-1.0),
                protocol: "HTTP".to_string(),
                port_type: "TCP".to_string(),
                hostname: "web".to_string(),
                status: CheckStatus::Slow,
            },
        );
        checks.disk = Some(DiskCheck {
            percent: 48.2,
            status: ServiceStatus::Ok,
        });

        assert_eq!(
            check_summary(&checks),
            "ping 20 ms  443/HTTP no answer  disk 48.2%"
        );
        assert_eq!(check_summary(&ServiceChecks::default()), "");
    }
}
