//! Service normalization.
//!
//! Turns one validated [`RawService`] into a [`ServiceViewRecord`]: status
//! classification, essential flag, check results, kind-specific payload and
//! the human-readable detail text shown when a service is expanded.

use std::collections::BTreeMap;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::format::{
    format_bytes, format_datetime_short, format_datetime_short_gb, parse_float, relative_seconds,
    title_case, to_float, to_int,
};
use crate::source::{
    RawCheck, RawPlatform, RawPort, RawProcessCpu, RawProcessMemory, RawProgram, RawService,
    RawSystem, ServiceDetail, ServiceKind,
};

/// Program output shown before the daemon has run the program once.
const PROGRAM_PENDING_OUTPUT: &str = "Initializing";
const PROGRAM_PENDING_STATUS: &str = "-1";

/// Program output longer than this is cut in the panel.
const PROGRAM_EXCERPT_LEN: usize = 60;

/// Health classification of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ServiceStatus {
    Unmonitored,
    Ok,
    Failed,
}

impl ServiceStatus {
    /// Classify a raw level, clamping it to `0..=2`.
    pub fn from_level(level: i64) -> Self {
        match level.clamp(0, 2) {
            0 => ServiceStatus::Unmonitored,
            1 => ServiceStatus::Ok,
            _ => ServiceStatus::Failed,
        }
    }

    /// Clamped numeric level (0, 1 or 2).
    pub fn level(self) -> i64 {
        match self {
            ServiceStatus::Unmonitored => 0,
            ServiceStatus::Ok => 1,
            ServiceStatus::Failed => 2,
        }
    }

    /// Label used in detail text.
    pub fn label(self) -> &'static str {
        match self {
            ServiceStatus::Unmonitored => "Not Monitored",
            ServiceStatus::Ok => "OK",
            ServiceStatus::Failed => "Failed",
        }
    }

    /// Returns a short symbol for display.
    pub fn symbol(self) -> &'static str {
        match self {
            ServiceStatus::Unmonitored => "⭘",
            ServiceStatus::Ok => "✔",
            ServiceStatus::Failed => "✗",
        }
    }
}

/// Unclamped status level: `min(1, status) + min(1, monitor)`.
///
/// 0 means not monitored, 1 healthy, 2 failed. The instance-level fold
/// compares these raw levels; records display the clamped [`ServiceStatus`].
pub fn status_level(status: i64, monitor: i64) -> i64 {
    status.min(1) + monitor.min(1)
}

/// Whether extended details of a not-monitored service start expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmonitoredDetails {
    Always,
    #[default]
    Never,
    /// Only for services not listed as non-critical.
    Essential,
}

impl UnmonitoredDetails {
    pub fn shows(self, essential: bool) -> bool {
        match self {
            UnmonitoredDetails::Always => true,
            UnmonitoredDetails::Never => false,
            UnmonitoredDetails::Essential => essential,
        }
    }
}

/// How the daemon schedules checks for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorMode {
    Active,
    Passive,
    Manual,
}

impl MonitorMode {
    fn from_raw(raw: i64) -> Self {
        match raw {
            1 => MonitorMode::Passive,
            2 => MonitorMode::Manual,
            _ => MonitorMode::Active,
        }
    }
}

/// Outcome of a single sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    /// Negative response time: the check did not answer.
    Slow,
    Ok,
}

/// Response time and status of a (possibly repeated) measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    /// Seconds; the mean when the check was measured several times.
    pub response_time: Option<f64>,
    pub status: CheckStatus,
}

impl CheckResult {
    /// Merge repeated measurements into one result.
    ///
    /// The response time is the mean over every measurement that carries
    /// one; the status is derived from that mean.
    pub fn merged<I>(times: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let present: Vec<f64> = times.into_iter().flatten().collect();
        let response_time = if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        };
        Self::from_time(response_time)
    }

    pub fn from_time(response_time: Option<f64>) -> Self {
        let status = match response_time {
            Some(t) if t < 0.0 => CheckStatus::Slow,
            _ => CheckStatus::Ok,
        };
        Self {
            response_time,
            status,
        }
    }
}

/// Result of one port connection check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortCheck {
    pub response_time: Option<f64>,
    pub protocol: String,
    pub port_type: String,
    pub hostname: String,
    pub status: CheckStatus,
}

/// Disk usage of a filesystem service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskCheck {
    pub percent: f64,
    pub status: ServiceStatus,
}

/// Check results of a service, keyed by check type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceChecks {
    pub icmp: Option<CheckResult>,
    /// Port checks keyed by port number.
    pub ports: BTreeMap<u16, PortCheck>,
    pub disk: Option<DiskCheck>,
}

impl ServiceChecks {
    pub fn is_empty(&self) -> bool {
        self.icmp.is_none() && self.ports.is_empty() && self.disk.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadAverage {
    pub avg01: f64,
    pub avg05: f64,
    pub avg15: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuUsage {
    pub user: f64,
    pub system: f64,
    pub nice: f64,
    pub wait: f64,
    /// Core count from the platform block (0 when unknown).
    pub cores: i64,
    /// Machine architecture from the platform block.
    pub family: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub percent: f64,
    pub kilobyte: f64,
    /// Platform total in kilobytes (0 when unknown).
    pub total: f64,
}

/// Host metrics attached to the System service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub load: LoadAverage,
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub swap: MemoryUsage,
}

/// Last output of a Program service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramOutput {
    pub output: String,
    pub status: String,
}

impl ProgramOutput {
    /// Output cut to a panel-friendly length.
    pub fn excerpt(&self) -> String {
        if self.output.chars().count() > PROGRAM_EXCERPT_LEN {
            let head: String = self.output.chars().take(PROGRAM_EXCERPT_LEN).collect();
            format!("{}...", head)
        } else {
            self.output.clone()
        }
    }
}

/// Kind-specific payload of a view record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ServiceExtra {
    None,
    System(SystemMetrics),
    Program(ProgramOutput),
}

/// Normalized view of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceViewRecord {
    pub kind: ServiceKind,
    pub name: String,
    pub status: ServiceStatus,
    /// Unclamped status level, see [`status_level`].
    pub level: i64,
    /// False when the service is listed as non-critical for its instance.
    pub essential: bool,
    pub monitor_mode: MonitorMode,
    /// Human-readable detail text.
    pub details: String,
    pub checks: ServiceChecks,
    pub extra: ServiceExtra,
    /// Whether extended details start expanded.
    pub show_stats: bool,
    /// When the daemon last collected data (epoch seconds).
    pub collected_at: i64,
}

impl ServiceViewRecord {
    /// Failed services always show their details.
    pub fn details_visible(&self) -> bool {
        self.status == ServiceStatus::Failed || self.show_stats
    }
}

/// Instance-level context needed to normalize a service.
#[derive(Debug, Clone)]
pub struct ServiceContext<'a> {
    /// Names of services whose failure is not critical.
    pub noncritical: &'a [String],
    /// Expand system metrics by default.
    pub show_stats: bool,
    pub unmonitored_details: UnmonitoredDetails,
    pub platform: &'a RawPlatform,
    /// Offset used to print timestamps.
    pub offset: FixedOffset,
}

/// Normalize one service.
pub fn normalize_service(service: RawService, ctx: &ServiceContext<'_>) -> ServiceViewRecord {
    let RawService {
        name,
        kind,
        status: raw_status,
        monitor,
        onreboot,
        monitor_mode,
        collected_sec,
        detail,
        icmp,
        ports,
    } = service;

    let level = status_level(raw_status, monitor);
    let status = ServiceStatus::from_level(level);
    let essential = !ctx.noncritical.iter().any(|n| *n == name);

    let mut checks = ServiceChecks::default();
    let mut extra = ServiceExtra::None;
    let mut show_stats = false;

    let body = match detail {
        ServiceDetail::System(system) => {
            let body = system_details(&system);
            extra = ServiceExtra::System(system_metrics(&system, ctx.platform));
            show_stats = ctx.show_stats;
            body
        }
        ServiceDetail::Filesystem { fstype, block } => {
            checks.disk = Some(DiskCheck {
                percent: to_float(block.percent.as_deref()),
                status,
            });
            format!(
                "\n{}% ({} of {}) [{}]",
                text(&block.percent),
                format_bytes(to_float(block.usage.as_deref()) * 1024.0),
                format_bytes(to_float(block.total.as_deref()) * 1024.0),
                fstype.to_uppercase()
            )
        }
        ServiceDetail::Directory {
            uid,
            gid,
            mode,
            modified,
        } => format!(
            "(uid/gid {}:{} mode 0{})\nLast modified on {}.",
            uid,
            gid,
            mode,
            format_datetime_short_gb(modified, &ctx.offset)
        ),
        ServiceDetail::Process {
            uptime,
            cpu: Some(cpu),
            memory,
        } if status == ServiceStatus::Ok => process_details(uptime, &cpu, &memory),
        ServiceDetail::Program(program) => {
            let program = program_output(program);
            let body = format!("(status {})", program.status);
            extra = ServiceExtra::Program(program);
            body
        }
        ServiceDetail::Process { .. } | ServiceDetail::Plain => {
            format!("\n{}", last_checked(status, collected_sec, &ctx.offset))
        }
    };

    let details = format!(
        "{} {} {}\n[ Type: {} | On Reboot: {} | Status: {} ]",
        title_case(&name),
        kind.label(),
        body,
        kind.tag(),
        reboot_label(onreboot),
        status.label()
    );

    if !icmp.is_empty() {
        checks.icmp = Some(icmp_result(&icmp));
    }
    for port in &ports {
        let (number, check) = port_check(port);
        checks.ports.insert(number, check);
    }

    if status == ServiceStatus::Unmonitored {
        show_stats = ctx.unmonitored_details.shows(essential);
    }

    ServiceViewRecord {
        kind,
        name,
        status,
        level,
        essential,
        monitor_mode: MonitorMode::from_raw(monitor_mode),
        details,
        checks,
        extra,
        show_stats,
        collected_at: collected_sec,
    }
}

/// Raw text of a numeric field, "0" when absent.
fn text(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or("0")
}

fn reboot_label(onreboot: i64) -> &'static str {
    match onreboot {
        0 => "On",
        1 => "Off",
        2 => "Last State",
        _ => "Unknown",
    }
}

fn last_checked(status: ServiceStatus, collected_sec: i64, offset: &FixedOffset) -> String {
    let prefix = if status == ServiceStatus::Unmonitored {
        "Not monitored since"
    } else {
        "Last check on"
    };
    format!("{} {}", prefix, format_datetime_short(collected_sec, offset))
}

/// CPU percentages in user, sys, nice, wait order. A field is shown as
/// sent whenever its text is present, so "0.0" still appears.
fn cpu_summary(system: &RawSystem) -> String {
    let cpu = &system.cpu;
    [
        (&cpu.user, "user"),
        (&cpu.system, "sys"),
        (&cpu.nice, "nice"),
        (&cpu.wait, "wait"),
    ]
    .iter()
    .filter_map(|(value, label)| {
        let raw = value.as_deref()?.trim();
        (!raw.is_empty()).then(|| format!("{}% {}", raw, label))
    })
    .collect::<Vec<_>>()
    .join(" ")
}

fn system_details(system: &RawSystem) -> String {
    format!(
        "\nLoad {} / {} / {}\n{}\n{}% of memory ({}), {}% of swap",
        text(&system.load.avg01),
        text(&system.load.avg05),
        text(&system.load.avg15),
        cpu_summary(system),
        text(&system.memory.percent),
        format_bytes(to_float(system.memory.kilobyte.as_deref())),
        text(&system.swap.percent)
    )
}

fn system_metrics(system: &RawSystem, platform: &RawPlatform) -> SystemMetrics {
    SystemMetrics {
        load: LoadAverage {
            avg01: to_float(system.load.avg01.as_deref()),
            avg05: to_float(system.load.avg05.as_deref()),
            avg15: to_float(system.load.avg15.as_deref()),
        },
        cpu: CpuUsage {
            user: to_float(system.cpu.user.as_deref()),
            system: to_float(system.cpu.system.as_deref()),
            nice: to_float(system.cpu.nice.as_deref()),
            wait: to_float(system.cpu.wait.as_deref()),
            cores: to_int(platform.cpu.as_deref()),
            family: platform.machine.clone().unwrap_or_else(|| "unknown".to_string()),
        },
        memory: MemoryUsage {
            percent: to_float(system.memory.percent.as_deref()),
            kilobyte: to_float(system.memory.kilobyte.as_deref()),
            total: to_float(platform.memory.as_deref()),
        },
        swap: MemoryUsage {
            percent: to_float(system.swap.percent.as_deref()),
            kilobyte: to_float(system.swap.kilobyte.as_deref()),
            total: to_float(platform.swap.as_deref()),
        },
    }
}

fn process_details(uptime: i64, cpu: &RawProcessCpu, memory: &RawProcessMemory) -> String {
    format!(
        "(uptime {})\nCPU {}% MEMORY {}% ({}).",
        relative_seconds(uptime),
        text(&cpu.percent),
        text(&memory.percent),
        format_bytes(to_float(memory.kilobytetotal.as_deref()))
    )
}

fn program_output(program: Option<RawProgram>) -> ProgramOutput {
    match program {
        Some(p) => ProgramOutput {
            output: p
                .output
                .unwrap_or_else(|| PROGRAM_PENDING_OUTPUT.to_string()),
            status: p.status.unwrap_or_else(|| PROGRAM_PENDING_STATUS.to_string()),
        },
        None => ProgramOutput {
            output: PROGRAM_PENDING_OUTPUT.to_string(),
            status: PROGRAM_PENDING_STATUS.to_string(),
        },
    }
}

fn icmp_result(measurements: &[RawCheck]) -> CheckResult {
    CheckResult::merged(
        measurements
            .iter()
            .map(|m| m.responsetime.as_deref().and_then(parse_float)),
    )
}

fn port_check(port: &RawPort) -> (u16, PortCheck) {
    let number = u16::try_from(to_int(port.portnumber.as_deref())).unwrap_or(0);
    let result = CheckResult::from_time(port.responsetime.as_deref().and_then(parse_float));
    (
        number,
        PortCheck {
            response_time: result.response_time,
            protocol: port.protocol.clone().unwrap_or_default(),
            port_type: port.port_type.clone().unwrap_or_default(),
            hostname: port.hostname.clone().unwrap_or_default(),
            status: result.status,
        },
    )
}
