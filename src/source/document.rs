//! Status document types and parsing.
//!
//! These types match the XML served by a Monit daemon on
//! `/_status?format=xml`. Every leaf is kept as text because the daemon
//! encodes numbers as strings and omits fields freely; coercion happens in
//! [`crate::data::format`].
//!
//! Repeatable elements (`service`, `icmp`, `port`) are declared as `Vec`s:
//! the daemon drops the list wrapper when there is exactly one element, and
//! a `Vec` field collects one element and many elements alike.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::data::format::to_int;
use crate::error::Error;

/// Name of the root element of a status document.
const ROOT_ELEMENT: &str = "monit";

/// Category of a monitored service, as tagged by the `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Filesystem,
    Directory,
    File,
    Process,
    RemoteHost,
    System,
    Fifo,
    Program,
    Network,
}

impl ServiceKind {
    /// All kinds in tag order.
    pub const ALL: [ServiceKind; 9] = [
        ServiceKind::Filesystem,
        ServiceKind::Directory,
        ServiceKind::File,
        ServiceKind::Process,
        ServiceKind::RemoteHost,
        ServiceKind::System,
        ServiceKind::Fifo,
        ServiceKind::Program,
        ServiceKind::Network,
    ];

    /// Look up a kind by its integer tag (0-8).
    pub fn from_tag(tag: i64) -> Option<Self> {
        usize::try_from(tag).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// The integer tag used on the wire.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Human-readable label used in detail text.
    pub fn label(self) -> &'static str {
        match self {
            ServiceKind::Filesystem => "Filesystem",
            ServiceKind::Directory => "Directory",
            ServiceKind::File => "File",
            ServiceKind::Process => "Process",
            ServiceKind::RemoteHost => "Remote Host",
            ServiceKind::System => "System",
            ServiceKind::Fifo => "Fifo",
            ServiceKind::Program => "Program",
            ServiceKind::Network => "Network",
        }
    }

    /// Lowercase key used in configuration files.
    pub fn slug(self) -> &'static str {
        match self {
            ServiceKind::Filesystem => "filesystem",
            ServiceKind::Directory => "directory",
            ServiceKind::File => "file",
            ServiceKind::Process => "process",
            ServiceKind::RemoteHost => "remote_host",
            ServiceKind::System => "system",
            ServiceKind::Fifo => "fifo",
            ServiceKind::Program => "program",
            ServiceKind::Network => "network",
        }
    }
}

/// A complete status document from one instance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStatusDocument {
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub platform: RawPlatform,
    #[serde(default, rename = "service")]
    pub services: Vec<RawServiceEntry>,
}

/// The `<server>` block: daemon metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServer {
    pub id: Option<String>,
    pub version: Option<String>,
    /// Seconds since the daemon started.
    pub uptime: Option<String>,
    /// Polling interval in seconds.
    pub poll: Option<String>,
    pub localhostname: Option<String>,
}

/// The `<platform>` block: host metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlatform {
    pub name: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub machine: Option<String>,
    /// Number of CPU cores.
    pub cpu: Option<String>,
    /// Total memory in kilobytes.
    pub memory: Option<String>,
    /// Total swap in kilobytes.
    pub swap: Option<String>,
}

/// One `<service>` element exactly as served, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawServiceEntry {
    #[serde(rename = "@type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub collected_sec: Option<String>,
    pub status: Option<String>,
    pub monitor: Option<String>,
    pub monitormode: Option<String>,
    pub onreboot: Option<String>,

    // Filesystem
    pub fstype: Option<String>,
    pub block: Option<RawBlock>,

    // Directory / file
    pub mode: Option<String>,
    pub uid: Option<String>,
    pub gid: Option<String>,
    pub timestamps: Option<RawTimestamps>,
    pub timestamp: Option<String>,

    // Process
    pub uptime: Option<String>,
    pub cpu: Option<RawProcessCpu>,
    pub memory: Option<RawProcessMemory>,

    // System
    pub system: Option<RawSystem>,

    // Program
    pub program: Option<RawProgram>,

    #[serde(default)]
    pub icmp: Vec<RawCheck>,
    #[serde(default)]
    pub port: Vec<RawPort>,
}

/// Filesystem block usage (`usage`/`total` in megabytes).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBlock {
    pub percent: Option<String>,
    pub usage: Option<String>,
    pub total: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTimestamps {
    pub access: Option<String>,
    pub change: Option<String>,
    pub modify: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProcessCpu {
    pub percent: Option<String>,
    pub percenttotal: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProcessMemory {
    pub percent: Option<String>,
    pub percenttotal: Option<String>,
    pub kilobyte: Option<String>,
    pub kilobytetotal: Option<String>,
}

/// The `<system>` block of a System service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSystem {
    #[serde(default)]
    pub load: RawLoad,
    #[serde(default)]
    pub cpu: RawSystemCpu,
    #[serde(default)]
    pub memory: RawUsage,
    #[serde(default)]
    pub swap: RawUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLoad {
    pub avg01: Option<String>,
    pub avg05: Option<String>,
    pub avg15: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSystemCpu {
    pub user: Option<String>,
    pub system: Option<String>,
    pub nice: Option<String>,
    pub wait: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUsage {
    pub percent: Option<String>,
    pub kilobyte: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProgram {
    pub started: Option<String>,
    pub status: Option<String>,
    pub output: Option<String>,
}

/// One measurement of a check (an `<icmp>` element).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCheck {
    #[serde(rename = "type")]
    pub check_type: Option<String>,
    pub responsetime: Option<String>,
}

/// One `<port>` connection check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPort {
    pub hostname: Option<String>,
    pub portnumber: Option<String>,
    pub request: Option<String>,
    pub protocol: Option<String>,
    #[serde(rename = "type")]
    pub port_type: Option<String>,
    pub responsetime: Option<String>,
}

/// A service entry that passed validation.
///
/// The kind-specific fields live in [`ServiceDetail`] so downstream code
/// only sees the fields its kind actually carries.
#[derive(Debug, Clone)]
pub struct RawService {
    pub name: String,
    pub kind: ServiceKind,
    pub status: i64,
    pub monitor: i64,
    pub onreboot: i64,
    pub monitor_mode: i64,
    pub collected_sec: i64,
    pub detail: ServiceDetail,
    pub icmp: Vec<RawCheck>,
    pub ports: Vec<RawPort>,
}

/// Kind-specific payload of a validated service.
#[derive(Debug, Clone)]
pub enum ServiceDetail {
    Filesystem {
        fstype: String,
        block: RawBlock,
    },
    Directory {
        uid: String,
        gid: String,
        mode: String,
        modified: i64,
    },
    Process {
        uptime: i64,
        cpu: Option<RawProcessCpu>,
        memory: RawProcessMemory,
    },
    System(RawSystem),
    /// `None` while the daemon has not run the program yet.
    Program(Option<RawProgram>),
    /// File, remote host, fifo and network services carry nothing extra.
    Plain,
}

impl RawStatusDocument {
    /// Validate every service entry, in document order.
    ///
    /// One result per entry: a malformed entry yields an
    /// [`Error::MalformedService`] in its slot and does not affect the others.
    pub fn services(&self) -> Vec<Result<RawService, Error>> {
        self.services
            .iter()
            .enumerate()
            .map(|(index, entry)| RawService::from_entry(index, entry.clone()))
            .collect()
    }
}

impl RawService {
    /// Validate one raw entry into a typed service.
    pub fn from_entry(index: usize, entry: RawServiceEntry) -> Result<Self, Error> {
        let malformed = |reason: String| Error::MalformedService { index, reason };

        let tag = entry
            .kind
            .as_deref()
            .ok_or_else(|| malformed("missing type attribute".to_string()))?;
        let kind = tag
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(ServiceKind::from_tag)
            .ok_or_else(|| malformed(format!("unknown service type {:?}", tag)))?;

        let name = match entry.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(malformed("missing name".to_string())),
        };

        let detail = match kind {
            ServiceKind::Filesystem => ServiceDetail::Filesystem {
                fstype: entry.fstype.unwrap_or_default(),
                block: entry.block.unwrap_or_default(),
            },
            ServiceKind::Directory => {
                let modified = entry
                    .timestamps
                    .and_then(|t| t.modify)
                    .or(entry.timestamp);
                ServiceDetail::Directory {
                    uid: entry.uid.unwrap_or_default(),
                    gid: entry.gid.unwrap_or_default(),
                    mode: entry.mode.unwrap_or_default(),
                    modified: to_int(modified.as_deref()),
                }
            }
            ServiceKind::Process => ServiceDetail::Process {
                uptime: to_int(entry.uptime.as_deref()),
                cpu: entry.cpu,
                memory: entry.memory.unwrap_or_default(),
            },
            ServiceKind::System => ServiceDetail::System(entry.system.unwrap_or_default()),
            ServiceKind::Program => ServiceDetail::Program(entry.program),
            _ => ServiceDetail::Plain,
        };

        Ok(Self {
            name,
            kind,
            status: to_int(entry.status.as_deref()),
            monitor: to_int(entry.monitor.as_deref()),
            onreboot: to_int(entry.onreboot.as_deref()),
            monitor_mode: to_int(entry.monitormode.as_deref()),
            collected_sec: to_int(entry.collected_sec.as_deref()),
            detail,
            icmp: entry.icmp,
            ports: entry.port,
        })
    }
}

/// Parse a status document.
///
/// Fails with [`Error::MalformedDocument`] if the text is not well-formed
/// markup or its root element is not `monit` (an HTML error page, an empty
/// body, a proxy message).
pub fn parse_document(text: &str) -> Result<RawStatusDocument, Error> {
    let root = root_element(text)?;
    if root != ROOT_ELEMENT {
        return Err(Error::MalformedDocument(format!(
            "unexpected root element <{}>",
            root
        )));
    }

    quick_xml::de::from_str(text).map_err(|e| Error::MalformedDocument(e.to_string()))
}

/// Name of the first element in the text.
fn root_element(text: &str) -> Result<String, Error> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => {
                return Err(Error::MalformedDocument("no root element".to_string()));
            }
            Ok(_) => {}
            Err(e) => return Err(Error::MalformedDocument(e.to_string())),
        }
    }
}
