//! Status change tracking across polling cycles.

use std::collections::{HashMap, HashSet};

use super::instance::InstanceSummary;
use super::service::ServiceStatus;

/// Key of one service: instance id and service name.
type ServiceKey = (String, String);

/// Remembers the previous status of every service.
///
/// After each cycle the services whose status differs from the cycle
/// before are marked as changed. A service seen for the first time is not
/// a change.
#[derive(Debug, Clone, Default)]
pub struct StatusHistory {
    previous: HashMap<ServiceKey, ServiceStatus>,
    changed: HashMap<ServiceKey, ServiceStatus>,
}

impl StatusHistory {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the instances of a finished cycle.
    ///
    /// Instances absent from this cycle (another group was polled, or the
    /// fetch failed) keep their previous statuses.
    pub fn record<'a, I>(&mut self, instances: I)
    where
        I: IntoIterator<Item = &'a InstanceSummary>,
    {
        let instances: Vec<&InstanceSummary> = instances.into_iter().collect();
        self.changed.clear();

        let mut seen: HashSet<ServiceKey> = HashSet::new();
        for instance in &instances {
            for service in &instance.services {
                let key = (instance.id.clone(), service.name.clone());
                if let Some(before) = self.previous.insert(key.clone(), service.status) {
                    if before != service.status {
                        self.changed.insert(key.clone(), before);
                    }
                }
                seen.insert(key);
            }
        }

        // Services that vanished from a reporting instance are forgotten.
        let reported: HashSet<&str> = instances.iter().map(|i| i.id.as_str()).collect();
        self.previous
            .retain(|key, _| !reported.contains(key.0.as_str()) || seen.contains(key));
    }

    /// Whether the service changed status in the last recorded cycle.
    pub fn is_changed(&self, instance: &str, service: &str) -> bool {
        self.changed
            .contains_key(&(instance.to_string(), service.to_string()))
    }

    /// Status the service had before its last change.
    pub fn previous_status(&self, instance: &str, service: &str) -> Option<ServiceStatus> {
        self.changed
            .get(&(instance.to_string(), service.to_string()))
            .copied()
    }

    /// Whether the service just came back to OK.
    pub fn recovered(&self, instance: &str, service: &str) -> bool {
        matches!(
            self.previous_status(instance, service),
            Some(ServiceStatus::Failed) | Some(ServiceStatus::Unmonitored)
        ) && self.current(instance, service) == Some(ServiceStatus::Ok)
    }

    /// Last known status of the service.
    pub fn current(&self, instance: &str, service: &str) -> Option<ServiceStatus> {
        self.previous
            .get(&(instance.to_string(), service.to_string()))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::instance::{aggregate, AggregateOptions, InstanceIdentity};

    fn instance(id: &str, services: &[(&str, u32)]) -> InstanceSummary {
        let body: String = services
            .iter()
            .map(|(name, status)| {
                format!(
                    "<service type=\"3\"><name>{}</name><status>{}</status><monitor>1</monitor></service>",
                    name, status
                )
            })
            .collect();
        let xml = format!("<monit>{}</monit>", body);
        aggregate(&xml, &InstanceIdentity::new(id, "http://x/"), &AggregateOptions::default())
            .unwrap()
    }

    #[test]
    fn test_first_cycle_has_no_changes() {
        let mut history = StatusHistory::new();
        history.record(&[instance("a", &[("nginx", 0)])]);
        assert!(!history.is_changed("a", "nginx"));
        assert_eq!(history.current("a", "nginx"), Some(ServiceStatus::Ok));
    }

    #[test]
    fn test_detects_failure_and_recovery() {
        let mut history = StatusHistory::new();
        history.record(&[instance("a", &[("nginx", 0), ("db", 0)])]);

        history.record(&[instance("a", &[("nginx", 1), ("db", 0)])]);
        assert!(history.is_changed("a", "nginx"));
        assert!(!history.is_changed("a", "db"));
        assert_eq!(history.previous_status("a", "nginx"), Some(ServiceStatus::Ok));
        assert!(!history.recovered("a", "nginx"));

        history.record(&[instance("a", &[("nginx", 0), ("db", 0)])]);
        assert!(history.recovered("a", "nginx"));

        history.record(&[instance("a", &[("nginx", 0), ("db", 0)])]);
        assert!(!history.recovered("a", "nginx"));
        assert!(!history.is_changed("a", "nginx"));
    }

    #[test]
    fn test_absent_instances_are_kept() {
        let mut history = StatusHistory::new();
        history.record(&[instance("a", &[("nginx", 0)]), instance("b", &[("db", 0)])]);
        history.record(&[instance("a", &[("nginx", 0)])]);
        assert_eq!(history.current("b", "db"), Some(ServiceStatus::Ok));
    }

    #[test]
    fn test_removed_services_are_forgotten() {
        let mut history = StatusHistory::new();
        history.record(&[instance("a", &[("nginx", 0), ("old", 0)])]);
        history.record(&[instance("a", &[("nginx", 0)])]);
        assert_eq!(history.current("a", "old"), None);
    }
}
