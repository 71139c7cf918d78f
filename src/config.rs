//! Panel configuration.
//!
//! Settings are read from a TOML file and overlaid with environment
//! variables prefixed `MONIT_DOCTOR__` (for example
//! `MONIT_DOCTOR__REFRESH=1m`).
//!
//! ```toml
//! refresh = "5m"
//! group = false
//! show_unmonitored_details = "essential"
//! show_ok = false
//! show_ok_for = ["process", "backup"]
//!
//! [priorities]
//! system = 0
//! process = 1
//!
//! [[instances]]
//! id = "web 1"
//! url = "https://web-1:2812/_status?format=xml"
//! user = "admin"
//! password = "monit"
//! noncritical = ["backup"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{FixedOffset, Local, Offset};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::duration::parse_duration;
use crate::data::{AggregateOptions, ServiceStatus, ServiceViewRecord, UnmonitoredDetails};
use crate::source::ServiceKind;

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "monit-doctor.toml";

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "MONIT_DOCTOR";

/// Connection parameters and display flags of one daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    pub id: String,
    /// Status endpoint, usually ending in `_status?format=xml`.
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Services whose failure is not critical.
    #[serde(default)]
    pub noncritical: Vec<String>,
    /// Expand system metrics by default.
    #[serde(default)]
    pub show_stats: bool,
    /// Group polled together when grouping is on.
    #[serde(default)]
    pub group: Option<String>,
}

impl InstanceConfig {
    /// Credentials to send, if a password is set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match self.password.as_deref() {
            Some(password) if !password.is_empty() => {
                Some((self.user.as_deref().unwrap_or_default(), password))
            }
            _ => None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interval between polling cycles.
    pub refresh: String,
    /// Start delay between consecutive fetches of a cycle.
    pub stagger: String,
    /// Per-request timeout.
    pub timeout: String,
    /// Poll one instance group per cycle instead of every instance.
    pub group: bool,
    pub instances: Vec<InstanceConfig>,
    /// Sort services by kind priority.
    pub ordered: bool,
    /// Kind slug to display weight.
    pub priorities: BTreeMap<String, i32>,
    pub show_unmonitored_details: UnmonitoredDetails,
    /// Show every healthy service.
    pub show_ok: bool,
    /// Kind slugs, kind tags or service names shown even when healthy.
    pub show_ok_for: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh: "5m".to_string(),
            stagger: "200ms".to_string(),
            timeout: "10s".to_string(),
            group: false,
            instances: Vec::new(),
            ordered: true,
            priorities: BTreeMap::new(),
            show_unmonitored_details: UnmonitoredDetails::default(),
            show_ok: false,
            show_ok_for: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or [`DEFAULT_CONFIG_FILE`] if present)
    /// and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check intervals, instance entries and priority keys.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval()?.is_zero() {
            bail!("refresh interval must be greater than zero");
        }
        self.stagger_delay()?;
        self.request_timeout()?;

        let mut ids = std::collections::HashSet::new();
        for instance in &self.instances {
            if instance.url.trim().is_empty() {
                bail!("instance {:?} has no url", instance.id);
            }
            if !ids.insert(instance.id.as_str()) {
                bail!("duplicate instance id {:?}", instance.id);
            }
        }

        for key in self.priorities.keys() {
            if !ServiceKind::ALL.iter().any(|k| k.slug() == key) {
                bail!("unknown service kind {:?} in priorities", key);
            }
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Result<Duration> {
        parse_duration(&self.refresh).with_context(|| format!("Invalid refresh {:?}", self.refresh))
    }

    pub fn stagger_delay(&self) -> Result<Duration> {
        parse_duration(&self.stagger).with_context(|| format!("Invalid stagger {:?}", self.stagger))
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.timeout).with_context(|| format!("Invalid timeout {:?}", self.timeout))
    }

    /// Enabled instances split into polling groups.
    ///
    /// Without grouping there is a single group. With grouping, ungrouped
    /// instances form the first group and named groups follow in the order
    /// they first appear. Empty groups are dropped.
    pub fn groups(&self) -> Vec<Vec<InstanceConfig>> {
        let enabled = self.instances.iter().filter(|i| i.enabled).cloned();

        if !self.group {
            let all: Vec<InstanceConfig> = enabled.collect();
            return if all.is_empty() { Vec::new() } else { vec![all] };
        }

        let mut ungrouped = Vec::new();
        let mut named: Vec<(String, Vec<InstanceConfig>)> = Vec::new();
        for instance in enabled {
            match instance.group.clone() {
                None => ungrouped.push(instance),
                Some(name) => match named.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, members)) => members.push(instance),
                    None => named.push((name, vec![instance])),
                },
            }
        }

        std::iter::once(ungrouped)
            .chain(named.into_iter().map(|(_, members)| members))
            .filter(|g| !g.is_empty())
            .collect()
    }

    /// Aggregation options, printing timestamps in the local offset.
    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            ordered: self.ordered,
            priorities: self.priorities.clone(),
            unmonitored_details: self.show_unmonitored_details,
            offset: local_offset(),
        }
    }

    pub fn visibility(&self) -> VisibilityPolicy {
        VisibilityPolicy {
            show_ok: self.show_ok,
            show_ok_for: self.show_ok_for.clone(),
        }
    }
}

fn local_offset() -> FixedOffset {
    Local::now().offset().fix()
}

/// Which healthy services are hidden from the panel.
#[derive(Debug, Clone, Default)]
pub struct VisibilityPolicy {
    pub show_ok: bool,
    pub show_ok_for: Vec<String>,
}

impl VisibilityPolicy {
    /// Only healthy services are ever hidden, and never the System service.
    pub fn hides(&self, record: &ServiceViewRecord) -> bool {
        if record.status != ServiceStatus::Ok || record.kind == ServiceKind::System {
            return false;
        }
        if self.show_ok {
            return false;
        }
        let tag = record.kind.tag().to_string();
        !self
            .show_ok_for
            .iter()
            .any(|entry| *entry == record.name || entry == record.kind.slug() || *entry == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{aggregate, InstanceIdentity};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.refresh_interval().unwrap(), Duration::from_secs(300));
        assert_eq!(settings.stagger_delay().unwrap(), Duration::from_millis(200));
        assert_eq!(settings.request_timeout().unwrap(), Duration::from_secs(10));
        assert!(settings.ordered);
        assert!(settings.groups().is_empty());
    }

    #[test]
    fn test_load_file() {
        let file = write_config(
            r#"
refresh = "1m"
show_unmonitored_details = "essential"
show_ok_for = ["process"]

[priorities]
file = 0

[[instances]]
id = "web 1"
url = "https://web-1:2812/_status?format=xml"
user = "admin"
password = "secret"
noncritical = ["backup"]

[[instances]]
id = "db"
url = "http://db:2812/_status?format=xml"
enabled = false
"#,
        );

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.refresh_interval().unwrap(), Duration::from_secs(60));
        assert_eq!(settings.show_unmonitored_details, UnmonitoredDetails::Essential);
        assert_eq!(settings.instances.len(), 2);
        assert_eq!(settings.instances[0].credentials(), Some(("admin", "secret")));
        assert_eq!(settings.instances[0].noncritical, vec!["backup".to_string()]);
        assert!(!settings.instances[1].enabled);
        assert_eq!(settings.aggregate_options().priorities["file"], 0);

        let groups = settings.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0][0].id, "web 1");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(Settings::load(Some(Path::new("/nonexistent/monit-doctor.toml"))).is_err());
    }

    #[test]
    fn test_validation() {
        let file = write_config("refresh = \"soon\"\n");
        assert!(Settings::load(Some(file.path())).is_err());

        let file = write_config("[priorities]\nspaceship = 1\n");
        assert!(Settings::load(Some(file.path())).is_err());

        let file = write_config(
            "[[instances]]\nid = \"a\"\nurl = \"http://a/\"\n[[instances]]\nid = \"a\"\nurl = \"http://b/\"\n",
        );
        assert!(Settings::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_empty_password_sends_no_credentials() {
        let instance = InstanceConfig {
            id: "a".to_string(),
            url: "http://a/".to_string(),
            user: Some("admin".to_string()),
            password: Some(String::new()),
            insecure: false,
            enabled: true,
            noncritical: Vec::new(),
            show_stats: false,
            group: None,
        };
        assert_eq!(instance.credentials(), None);
    }

    #[test]
    fn test_groups() {
        let file = write_config(
            r#"
group = true

[[instances]]
id = "a"
url = "http://a/"
group = "east"

[[instances]]
id = "b"
url = "http://b/"

[[instances]]
id = "c"
url = "http://c/"
group = "west"

[[instances]]
id = "d"
url = "http://d/"
group = "east"
"#,
        );
        let settings = Settings::load(Some(file.path())).unwrap();
        let ids: Vec<Vec<String>> = settings
            .groups()
            .iter()
            .map(|g| g.iter().map(|i| i.id.clone()).collect())
            .collect();
        assert_eq!(
            ids,
            vec![
                vec!["b".to_string()],
                vec!["a".to_string(), "d".to_string()],
                vec!["c".to_string()],
            ]
        );
    }

    #[test]
    fn test_visibility_policy() {
        let xml = r#"<monit>
            <service type="5"><name>host</name><status>0</status><monitor>1</monitor></service>
            <service type="3"><name>nginx</name><status>0</status><monitor>1</monitor></service>
            <service type="2"><name>backup</name><status>0</status><monitor>1</monitor></service>
            <service type="2"><name>conf</name><status>0</status><monitor>1</monitor></service>
            <service type="2"><name>broken</name><status>1</status><monitor>1</monitor></service>
        </monit>"#;
        let summary = aggregate(
            xml,
            &InstanceIdentity::new("a", "http://a/"),
            &AggregateOptions::default(),
        )
        .unwrap();

        let policy = VisibilityPolicy {
            show_ok: false,
            show_ok_for: vec!["process".to_string(), "backup".to_string()],
        };
        let hidden: Vec<&str> = summary
            .services
            .iter()
            .filter(|s| policy.hides(s))
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(hidden, vec!["conf"]);

        let by_tag = VisibilityPolicy {
            show_ok: false,
            show_ok_for: vec!["2".to_string()],
        };
        assert!(by_tag.hides(summary.service("nginx").unwrap()));
        assert!(!by_tag.hides(summary.service("conf").unwrap()));

        let all = VisibilityPolicy {
            show_ok: true,
            show_ok_for: Vec::new(),
        };
        assert!(summary.services.iter().all(|s| !all.hides(s)));
    }
}
