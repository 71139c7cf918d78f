//! Instance aggregation.
//!
//! Runs the service normalizer over one status document and folds the
//! records into an [`InstanceSummary`] with health totals and a global
//! status.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Serialize, Serializer};
use tracing::warn;

use super::format::{relative_seconds, to_float, to_int};
use super::service::{
    normalize_service, ServiceContext, ServiceStatus, ServiceViewRecord, UnmonitoredDetails,
};
use crate::error::Error;
use crate::source::{parse_document, RawPlatform, RawServer, RawStatusDocument, ServiceKind};

/// Suffix of the status endpoint, stripped from display URLs.
const STATUS_ENDPOINT: &str = "_status?format=xml";

/// Who an instance is and how its services are judged.
#[derive(Debug, Clone)]
pub struct InstanceIdentity {
    pub id: String,
    /// Base URL with the status endpoint stripped.
    pub url: String,
    pub noncritical: Vec<String>,
    pub show_stats: bool,
    pub fetched_at: DateTime<Utc>,
}

impl InstanceIdentity {
    /// Create an identity, normalizing the id and the URL.
    ///
    /// The first whitespace run of the id becomes a dash ("web server 1" is
    /// "web-server 1").
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: normalize_id(id),
            url: url.replace(STATUS_ENDPOINT, ""),
            noncritical: Vec::new(),
            show_stats: false,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_noncritical(mut self, names: Vec<String>) -> Self {
        self.noncritical = names;
        self
    }

    pub fn with_show_stats(mut self, show: bool) -> Self {
        self.show_stats = show;
        self
    }

    pub fn with_fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = at;
        self
    }
}

fn normalize_id(id: &str) -> String {
    let Some(start) = id.find(char::is_whitespace) else {
        return id.to_string();
    };
    let rest = &id[start..];
    let end = rest
        .find(|c: char| !c.is_whitespace())
        .map(|i| start + i)
        .unwrap_or(id.len());
    format!("{}-{}", &id[..start], &id[end..])
}

/// Display ordering of a service kind when no weight is configured.
pub fn default_priority(kind: ServiceKind) -> i32 {
    match kind {
        ServiceKind::System => 0,
        ServiceKind::Process => 1,
        ServiceKind::Program => 2,
        ServiceKind::Filesystem => 3,
        ServiceKind::RemoteHost => 4,
        ServiceKind::Network => 5,
        ServiceKind::Directory => 6,
        ServiceKind::File => 7,
        ServiceKind::Fifo => 8,
    }
}

/// Options shared by every instance of a cycle.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Sort services by kind priority.
    pub ordered: bool,
    /// Kind slug to weight; lower weights come first.
    pub priorities: BTreeMap<String, i32>,
    pub unmonitored_details: UnmonitoredDetails,
    /// Offset used to print timestamps.
    pub offset: FixedOffset,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            ordered: true,
            priorities: BTreeMap::new(),
            unmonitored_details: UnmonitoredDetails::default(),
            offset: Utc.fix(),
        }
    }
}

impl AggregateOptions {
    pub fn priority(&self, kind: ServiceKind) -> i32 {
        self.priorities
            .get(kind.slug())
            .copied()
            .unwrap_or_else(|| default_priority(kind))
    }
}

/// Service counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthTotals {
    pub total: usize,
    pub healthy: usize,
    pub unmonitored: usize,
    pub failed: usize,
}

impl HealthTotals {
    pub fn count(records: &[ServiceViewRecord]) -> Self {
        let mut totals = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.status {
                ServiceStatus::Unmonitored => totals.unmonitored += 1,
                ServiceStatus::Ok => totals.healthy += 1,
                ServiceStatus::Failed => totals.failed += 1,
            }
        }
        totals
    }
}

/// Worst status over a set of records.
///
/// Folds unclamped levels: once a level of 2 is seen it sticks, otherwise
/// the last non-healthy level wins.
pub fn global_status(records: &[ServiceViewRecord]) -> ServiceStatus {
    let level = records.iter().fold(1, |global, record| {
        if record.level != 1 && global != 2 {
            record.level
        } else {
            global
        }
    });
    ServiceStatus::from_level(level)
}

/// Host metadata of an instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlatformInfo {
    pub name: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub cores: i64,
    pub memory_kb: f64,
    pub swap_kb: f64,
}

impl From<&RawPlatform> for PlatformInfo {
    fn from(raw: &RawPlatform) -> Self {
        Self {
            name: raw.name.clone().unwrap_or_default(),
            release: raw.release.clone().unwrap_or_default(),
            version: raw.version.clone().unwrap_or_default(),
            machine: raw.machine.clone().unwrap_or_default(),
            cores: to_int(raw.cpu.as_deref()),
            memory_kb: to_float(raw.memory.as_deref()),
            swap_kb: to_float(raw.swap.as_deref()),
        }
    }
}

/// Daemon metadata of an instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerInfo {
    pub id: String,
    pub version: String,
    pub uptime_secs: i64,
    /// Uptime as a phrase, e.g. "3 days".
    pub uptime_relative: String,
    pub poll_secs: i64,
    pub localhostname: String,
}

impl From<&RawServer> for ServerInfo {
    fn from(raw: &RawServer) -> Self {
        let uptime_secs = to_int(raw.uptime.as_deref());
        Self {
            id: raw.id.clone().unwrap_or_default(),
            version: raw.version.clone().unwrap_or_default(),
            uptime_secs,
            uptime_relative: relative_seconds(uptime_secs),
            poll_secs: to_int(raw.poll.as_deref()),
            localhostname: raw.localhostname.clone().unwrap_or_default(),
        }
    }
}

/// Everything known about one instance after a successful fetch.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub url: String,
    pub platform: PlatformInfo,
    pub server: ServerInfo,
    pub services: Vec<ServiceViewRecord>,
    /// One marker per service entry that failed validation.
    #[serde(serialize_with = "serialize_errors")]
    pub service_errors: Vec<Error>,
    pub totals: HealthTotals,
    pub status: ServiceStatus,
    pub fetched_at: DateTime<Utc>,
}

fn serialize_errors<S: Serializer>(errors: &[Error], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(|e| e.to_string()))
}

impl InstanceSummary {
    /// Build a summary from a parsed document.
    pub fn from_document(
        doc: &RawStatusDocument,
        identity: &InstanceIdentity,
        options: &AggregateOptions,
    ) -> Self {
        let ctx = ServiceContext {
            noncritical: &identity.noncritical,
            show_stats: identity.show_stats,
            unmonitored_details: options.unmonitored_details,
            platform: &doc.platform,
            offset: options.offset,
        };

        let mut services = Vec::with_capacity(doc.services.len());
        let mut service_errors = Vec::new();
        for result in doc.services() {
            match result {
                Ok(service) => services.push(normalize_service(service, &ctx)),
                Err(e) => {
                    warn!(instance = %identity.id, error = %e, "Skipping malformed service");
                    service_errors.push(e);
                }
            }
        }

        if options.ordered {
            // sort_by_key is stable: equal weights keep document order
            services.sort_by_key(|s| options.priority(s.kind));
        }

        let totals = HealthTotals::count(&services);
        let status = global_status(&services);

        Self {
            id: identity.id.clone(),
            url: identity.url.clone(),
            platform: PlatformInfo::from(&doc.platform),
            server: ServerInfo::from(&doc.server),
            services,
            service_errors,
            totals,
            status,
            fetched_at: identity.fetched_at,
        }
    }

    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceViewRecord> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Parse and aggregate the raw text of one instance.
///
/// A document without a recognizable root is reported as a failed fetch of
/// that instance.
pub fn aggregate(
    text: &str,
    identity: &InstanceIdentity,
    options: &AggregateOptions,
) -> Result<InstanceSummary, Error> {
    let doc = parse_document(text).map_err(|e| Error::InstanceFetchFailed {
        id: identity.id.clone(),
        reason: e.to_string(),
    })?;
    Ok(InstanceSummary::from_document(&doc, identity, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn identity() -> InstanceIdentity {
        InstanceIdentity::new("web 1", "https://web-1:2812/_status?format=xml")
            .with_fetched_at(Utc.timestamp_opt(1_620_056_400, 0).unwrap())
    }

    fn service_xml(kind: u8, name: &str, status: u32, monitor: u32) -> String {
        format!(
            "<service type=\"{}\"><name>{}</name><status>{}</status><monitor>{}</monitor>\
             <collected_sec>1620052800</collected_sec></service>",
            kind, name, status, monitor
        )
    }

    fn document(services: &[String]) -> String {
        format!(
            "<monit><server><version>5.27.2</version><uptime>93600</uptime>\
             <localhostname>web-1</localhostname></server>\
             <platform><name>Linux</name><cpu>4</cpu></platform>{}</monit>",
            services.concat()
        )
    }

    fn summarize(xml: &str, options: &AggregateOptions) -> InstanceSummary {
        aggregate(xml, &identity(), options).unwrap()
    }

    #[test]
    fn test_identity_normalization() {
        let id = InstanceIdentity::new("my  web server", "http://host:2812/_status?format=xml");
        assert_eq!(id.id, "my-web server");
        assert_eq!(id.url, "http://host:2812/");

        let plain = InstanceIdentity::new("db", "http://db:2812/");
        assert_eq!(plain.id, "db");
        assert_eq!(plain.url, "http://db:2812/");
    }

    #[test]
    fn test_totals_add_up() {
        let xml = document(&[
            service_xml(3, "a", 0, 1),
            service_xml(3, "b", 0, 0),
            service_xml(3, "c", 512, 1),
            service_xml(2, "d", 0, 1),
            service_xml(2, "e", 0, 2),
        ]);
        let summary = summarize(&xml, &AggregateOptions::default());
        let t = summary.totals;
        assert_eq!(t.total, 5);
        assert_eq!(t.healthy + t.unmonitored + t.failed, t.total);
        assert_eq!(t.total, summary.services.len());
        assert_eq!(t.healthy, 3);
        assert_eq!(t.unmonitored, 1);
        assert_eq!(t.failed, 1);
    }

    #[test]
    fn test_global_status_unmonitored() {
        let xml = document(&[
            service_xml(3, "a", 0, 1),
            service_xml(3, "b", 0, 0),
            service_xml(3, "c", 0, 1),
        ]);
        assert_eq!(
            summarize(&xml, &AggregateOptions::default()).status,
            ServiceStatus::Unmonitored
        );
    }

    #[test]
    fn test_global_status_failed_is_sticky() {
        let xml = document(&[
            service_xml(3, "a", 0, 1),
            service_xml(3, "b", 1, 1),
            service_xml(3, "c", 0, 0),
        ]);
        assert_eq!(
            summarize(&xml, &AggregateOptions::default()).status,
            ServiceStatus::Failed
        );
    }

    #[test]
    fn test_global_status_ok() {
        let xml = document(&[service_xml(3, "a", 0, 1), service_xml(5, "host", 0, 1)]);
        let summary = summarize(&xml, &AggregateOptions::default());
        assert_eq!(summary.status, ServiceStatus::Ok);
        assert_eq!(global_status(&[]), ServiceStatus::Ok);
    }

    #[test]
    fn test_malformed_service_yields_marker() {
        let xml = document(&[
            service_xml(3, "a", 0, 1),
            service_xml(3, "b", 0, 1),
            "<service><name>untyped</name></service>".to_string(),
            service_xml(2, "c", 0, 1),
            service_xml(0, "d", 0, 1),
        ]);
        let summary = summarize(&xml, &AggregateOptions::default());
        assert_eq!(summary.services.len(), 4);
        assert_eq!(summary.totals.total, 4);
        assert_eq!(summary.service_errors.len(), 1);
        assert!(matches!(
            summary.service_errors[0],
            Error::MalformedService { index: 2, .. }
        ));
    }

    #[test]
    fn test_ordering_is_stable() {
        let xml = document(&[
            service_xml(2, "file-a", 0, 1),
            service_xml(3, "proc-a", 0, 1),
            service_xml(2, "file-b", 0, 1),
            service_xml(5, "host", 0, 1),
            service_xml(3, "proc-b", 0, 1),
        ]);
        let names = |summary: &InstanceSummary| {
            summary.services.iter().map(|s| s.name.clone()).collect::<Vec<_>>()
        };

        let ordered = summarize(&xml, &AggregateOptions::default());
        assert_eq!(names(&ordered), ["host", "proc-a", "proc-b", "file-a", "file-b"]);

        let mut options = AggregateOptions::default();
        options.priorities.insert("file".to_string(), -1);
        let custom = summarize(&xml, &options);
        assert_eq!(names(&custom), ["file-a", "file-b", "host", "proc-a", "proc-b"]);

        options.ordered = false;
        let unordered = summarize(&xml, &options);
        assert_eq!(names(&unordered), ["file-a", "proc-a", "file-b", "host", "proc-b"]);
    }

    #[test]
    fn test_metadata_passthrough() {
        let summary = summarize(&document(&[]), &AggregateOptions::default());
        assert_eq!(summary.id, "web-1");
        assert_eq!(summary.url, "https://web-1:2812/");
        assert_eq!(summary.server.version, "5.27.2");
        assert_eq!(summary.server.uptime_secs, 93600);
        assert_eq!(summary.server.uptime_relative, "1 day");
        assert_eq!(summary.server.localhostname, "web-1");
        assert_eq!(summary.platform.cores, 4);
        assert_eq!(summary.totals, HealthTotals::default());
    }

    #[test]
    fn test_noncritical_services() {
        let xml = document(&[service_xml(3, "a", 0, 1), service_xml(3, "b", 0, 1)]);
        let identity = identity().with_noncritical(vec!["b".to_string()]);
        let summary = aggregate(&xml, &identity, &AggregateOptions::default()).unwrap();
        assert!(summary.service("a").unwrap().essential);
        assert!(!summary.service("b").unwrap().essential);
    }

    #[test]
    fn test_unrecognized_root_fails_instance() {
        let options = AggregateOptions::default();
        let err = aggregate("<html>502 Bad Gateway</html>", &identity(), &options).unwrap_err();
        match err {
            Error::InstanceFetchFailed { id, .. } => assert_eq!(id, "web-1"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_summary_serializes() {
        let xml = document(&[service_xml(3, "a", 0, 1), "<service/>".to_string()]);
        let summary = summarize(&xml, &AggregateOptions::default());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totals"]["total"], 1);
        assert_eq!(json["status"], "Ok");
        assert!(json["service_errors"][0].as_str().unwrap().starts_with("Malformed service #1"));
    }
}
