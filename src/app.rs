//! Application state and navigation logic.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::VisibilityPolicy;
use crate::data::{ServiceStatus, ServiceViewRecord, StatusHistory};
use crate::poll::{CycleReport, InstanceReport};
use crate::source::PanelSource;
use crate::ui::Theme;

/// How long a status message stays in the status bar.
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(3);

/// Main application state.
pub struct App {
    pub running: bool,
    pub show_help: bool,
    /// Show healthy services the visibility policy would hide.
    pub show_all: bool,

    // Data source
    source: Box<dyn PanelSource>,
    pub report: Option<CycleReport>,
    /// Message of the last failed cycle, cleared by the next good one.
    pub cycle_error: Option<String>,
    /// Error reading the source itself.
    pub load_error: Option<String>,
    pub history: StatusHistory,
    pub visibility: VisibilityPolicy,

    // Navigation state
    pub selected_instance: usize,
    pub selected_service: usize,
    /// Services whose detail state was flipped by the user, keyed by
    /// (instance id, service name).
    toggled: HashSet<(String, String)>,

    // UI
    pub theme: Theme,

    // Status message (temporary feedback)
    pub status_message: Option<(String, Instant)>,
}

impl App {
    /// Create a new App, detecting the terminal theme.
    pub fn new(source: Box<dyn PanelSource>, visibility: VisibilityPolicy) -> Self {
        Self::with_theme(source, visibility, Theme::auto_detect())
    }

    pub fn with_theme(
        source: Box<dyn PanelSource>,
        visibility: VisibilityPolicy,
        theme: Theme,
    ) -> Self {
        Self {
            running: true,
            show_help: false,
            show_all: false,
            source,
            report: None,
            cycle_error: None,
            load_error: None,
            history: StatusHistory::new(),
            visibility,
            selected_instance: 0,
            selected_service: 0,
            toggled: HashSet::new(),
            theme,
            status_message: None,
        }
    }

    /// Returns a description of the current data source.
    pub fn source_description(&self) -> &str {
        self.source.description()
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Get the current status message if it hasn't expired.
    pub fn get_status_message(&self) -> Option<&str> {
        match &self.status_message {
            Some((msg, time)) if time.elapsed() < STATUS_MESSAGE_TTL => Some(msg),
            _ => None,
        }
    }

    /// Poll the source for a new cycle.
    ///
    /// Returns true if a cycle outcome was received.
    pub fn reload_data(&mut self) -> bool {
        self.load_error = self.source.error().map(str::to_string);

        let Some(outcome) = self.source.poll() else {
            return false;
        };

        match outcome {
            Ok(report) => {
                self.history.record(report.summaries());
                self.report = Some(report);
                self.cycle_error = None;
                self.load_error = None;
                self.clamp_selection();
            }
            Err(e) => {
                warn!(error = %e, "Cycle failed");
                self.cycle_error = Some(e.to_string());
            }
        }
        true
    }

    /// Ask the source for a new cycle right away.
    pub fn refresh(&mut self) {
        self.source.refresh();
        self.set_status_message("Refreshing...".to_string());
    }

    /// Instance reports of the current cycle.
    pub fn instances(&self) -> &[InstanceReport] {
        self.report
            .as_ref()
            .map(|r| r.instances.as_slice())
            .unwrap_or_default()
    }

    pub fn current_instance(&self) -> Option<&InstanceReport> {
        self.instances().get(self.selected_instance)
    }

    /// Services of the selected instance that should be listed.
    pub fn visible_services(&self) -> Vec<&ServiceViewRecord> {
        match self.current_instance() {
            Some(InstanceReport::Ready(summary)) => summary
                .services
                .iter()
                .filter(|s| self.is_listed(&summary.id, s))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// A service is listed unless the policy hides it; a service that just
    /// recovered stays listed for one more cycle.
    fn is_listed(&self, instance: &str, service: &ServiceViewRecord) -> bool {
        self.show_all
            || !self.visibility.hides(service)
            || self.history.recovered(instance, &service.name)
    }

    /// Number of services hidden by the visibility policy.
    pub fn hidden_count(&self) -> usize {
        match self.current_instance() {
            Some(InstanceReport::Ready(summary)) => {
                summary.services.len() - self.visible_services().len()
            }
            _ => 0,
        }
    }

    pub fn selected_record(&self) -> Option<&ServiceViewRecord> {
        self.visible_services().get(self.selected_service).copied()
    }

    /// Whether the details of `service` are expanded.
    ///
    /// Failed services are always expanded; otherwise the default from the
    /// record is flipped each time the user toggles it.
    pub fn is_expanded(&self, instance: &str, service: &ServiceViewRecord) -> bool {
        if service.status == ServiceStatus::Failed {
            return true;
        }
        let flipped = self
            .toggled
            .contains(&(instance.to_string(), service.name.clone()));
        service.show_stats != flipped
    }

    /// Toggle the details of the selected service.
    pub fn toggle_details(&mut self) {
        let Some(InstanceReport::Ready(summary)) = self.current_instance() else {
            return;
        };
        let Some(record) = self.selected_record() else {
            return;
        };
        let key = (summary.id.clone(), record.name.clone());
        if !self.toggled.remove(&key) {
            self.toggled.insert(key);
        }
    }

    pub fn toggle_show_all(&mut self) {
        self.show_all = !self.show_all;
        self.clamp_selection();
        let label = if self.show_all { "all" } else { "only notable" };
        self.set_status_message(format!("Showing {} services", label));
    }

    /// Select the next instance (wraps).
    pub fn next_instance(&mut self) {
        let count = self.instances().len();
        if count > 0 {
            self.selected_instance = (self.selected_instance + 1) % count;
            self.selected_service = 0;
        }
    }

    /// Select the previous instance (wraps).
    pub fn prev_instance(&mut self) {
        let count = self.instances().len();
        if count > 0 {
            self.selected_instance = (self.selected_instance + count - 1) % count;
            self.selected_service = 0;
        }
    }

    /// Move selection down by n services.
    pub fn select_next_n(&mut self, n: usize) {
        let max = self.visible_services().len().saturating_sub(1);
        self.selected_service = (self.selected_service + n).min(max);
    }

    /// Move selection up by n services.
    pub fn select_prev_n(&mut self, n: usize) {
        self.selected_service = self.selected_service.saturating_sub(n);
    }

    pub fn select_next(&mut self) {
        self.select_next_n(1);
    }

    pub fn select_prev(&mut self) {
        self.select_prev_n(1);
    }

    pub fn select_first(&mut self) {
        self.selected_service = 0;
    }

    pub fn select_last(&mut self) {
        self.selected_service = self.visible_services().len().saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let instances = self.instances().len();
        if self.selected_instance >= instances {
            self.selected_instance = instances.saturating_sub(1);
        }
        let services = self.visible_services().len();
        if self.selected_service >= services {
            self.selected_service = services.saturating_sub(1);
        }
    }

    /// Toggle the help overlay.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Signal the application to quit.
    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Export the current cycle to a file.
    pub fn export_state(&self, path: &Path) -> Result<()> {
        let Some(ref report) = self.report else {
            bail!("No data to export");
        };
        export_report(report, path)
    }
}

/// Write a cycle report as pretty-printed JSON.
pub fn export_report(report: &CycleReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{aggregate, AggregateOptions, InstanceIdentity};
    use crate::error::Error;
    use crate::poll::CycleOutcome;
    use std::collections::VecDeque;

    /// Hands out queued outcomes one poll at a time.
    #[derive(Debug, Default)]
    struct QueueSource {
        outcomes: VecDeque<CycleOutcome>,
    }

    impl PanelSource for QueueSource {
        fn poll(&mut self) -> Option<CycleOutcome> {
            self.outcomes.pop_front()
        }

        fn description(&self) -> &str {
            "queue"
        }

        fn error(&self) -> Option<&str> {
            None
        }
    }

    fn ready(id: &str, services: &[(&str, u8, u32, u32)]) -> InstanceReport {
        let body: String = services
            .iter()
            .map(|(name, kind, status, monitor)| {
                format!(
                    "<service type=\"{}\"><name>{}</name><status>{}</status><monitor>{}</monitor></service>",
                    kind, name, status, monitor
                )
            })
            .collect();
        let summary = aggregate(
            &format!("<monit>{}</monit>", body),
            &InstanceIdentity::new(id, "http://x/"),
            &AggregateOptions::default(),
        )
        .unwrap();
        InstanceReport::Ready(summary)
    }

    fn app_with(outcomes: Vec<CycleOutcome>, visibility: VisibilityPolicy) -> App {
        let source = QueueSource {
            outcomes: outcomes.into(),
        };
        App::with_theme(Box::new(source), visibility, Theme::dark())
    }

    fn cycle(instances: Vec<InstanceReport>) -> CycleOutcome {
        Ok(CycleReport::new(0, instances))
    }

    #[test]
    fn test_reload_keeps_partial_failures() {
        let failed = InstanceReport::Failed {
            id: "b".to_string(),
            error: Error::InstanceFetchFailed {
                id: "b".to_string(),
                reason: "timeout".to_string(),
            },
            last_fetched: None,
        };
        let mut app = app_with(
            vec![cycle(vec![ready("a", &[("nginx", 3, 0, 1)]), failed])],
            VisibilityPolicy::default(),
        );

        assert!(app.reload_data());
        assert_eq!(app.instances().len(), 2);
        assert!(app.cycle_error.is_none());
        assert!(!app.reload_data());
    }

    #[test]
    fn test_cycle_error_is_persistent_until_next_cycle() {
        let mut app = app_with(
            vec![
                Err(Error::AllInstancesFailed),
                cycle(vec![ready("a", &[("nginx", 3, 0, 1)])]),
            ],
            VisibilityPolicy::default(),
        );

        app.reload_data();
        assert_eq!(
            app.cycle_error.as_deref(),
            Some("Failed to fetch data for all of the instances!")
        );
        app.reload_data();
        assert!(app.cycle_error.is_none());
        assert!(app.report.is_some());

        let mut stuck = app_with(vec![Err(Error::AllInstancesFailed)], VisibilityPolicy::default());
        stuck.reload_data();
        // No new outcome: the error stays
        assert!(!stuck.reload_data());
        assert!(stuck.cycle_error.is_some());
    }

    #[test]
    fn test_visibility_and_show_all() {
        let mut app = app_with(
            vec![cycle(vec![ready(
                "a",
                &[("host", 5, 0, 1), ("nginx", 3, 0, 1), ("cron", 3, 1, 1)],
            )])],
            VisibilityPolicy::default(),
        );
        app.reload_data();

        let names: Vec<&str> = app.visible_services().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["host", "cron"]);
        assert_eq!(app.hidden_count(), 1);

        app.toggle_show_all();
        assert_eq!(app.visible_services().len(), 3);
        assert_eq!(app.hidden_count(), 0);
    }

    #[test]
    fn test_recovered_service_stays_listed_for_one_cycle() {
        let mut app = app_with(
            vec![
                cycle(vec![ready("a", &[("nginx", 3, 1, 1)])]),
                cycle(vec![ready("a", &[("nginx", 3, 0, 1)])]),
                cycle(vec![ready("a", &[("nginx", 3, 0, 1)])]),
            ],
            VisibilityPolicy::default(),
        );

        app.reload_data();
        assert_eq!(app.visible_services().len(), 1);
        app.reload_data();
        assert_eq!(app.visible_services().len(), 1);
        app.reload_data();
        assert!(app.visible_services().is_empty());
    }

    #[test]
    fn test_toggle_details() {
        let mut app = app_with(
            vec![cycle(vec![ready("a", &[("nginx", 3, 0, 1), ("cron", 3, 1, 1)])])],
            VisibilityPolicy {
                show_ok: true,
                show_ok_for: Vec::new(),
            },
        );
        app.reload_data();

        let nginx = app.visible_services()[0].clone();
        assert!(!app.is_expanded("a", &nginx));
        app.toggle_details();
        assert!(app.is_expanded("a", &nginx));
        app.toggle_details();
        assert!(!app.is_expanded("a", &nginx));

        // Failed services cannot be collapsed
        app.select_next();
        let cron = app.selected_record().unwrap().clone();
        app.toggle_details();
        assert!(app.is_expanded("a", &cron));
    }

    #[test]
    fn test_instance_navigation_wraps() {
        let mut app = app_with(
            vec![cycle(vec![
                ready("a", &[("x", 5, 0, 1)]),
                ready("b", &[("y", 5, 0, 1)]),
                ready("c", &[("z", 5, 0, 1)]),
            ])],
            VisibilityPolicy::default(),
        );
        app.reload_data();

        app.prev_instance();
        assert_eq!(app.current_instance().unwrap().id(), "c");
        app.next_instance();
        assert_eq!(app.current_instance().unwrap().id(), "a");
    }

    #[test]
    fn test_selection_is_clamped() {
        let mut app = app_with(
            vec![cycle(vec![ready("a", &[("x", 5, 0, 1), ("y", 3, 1, 1)])])],
            VisibilityPolicy::default(),
        );
        app.reload_data();
        app.select_next_n(10);
        assert_eq!(app.selected_service, 1);
        app.select_prev_n(10);
        assert_eq!(app.selected_service, 0);
    }

    #[test]
    fn test_export_state() {
        let mut app = app_with(
            vec![cycle(vec![ready("a", &[("nginx", 3, 0, 1)])])],
            VisibilityPolicy::default(),
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");

        assert!(app.export_state(&path).is_err());

        app.reload_data();
        app.export_state(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["instances"][0]["state"], "ready");
        assert_eq!(json["instances"][0]["id"], "a");
        assert_eq!(json["instances"][0]["services"][0]["name"], "nginx");
    }
}
