//! Core data model: Target, PortSet, Tier, PortResult, EnrichedPort,
//! ScanTask, ScanEvent, CVECacheEntry, ClientBudget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use uuid::Uuid;

/// The scan subject. Resolved IP is fixed for the scan lifetime — no
/// re-resolution mid-scan, which would open a DNS-rebinding window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub raw: String,
    pub resolved_ip: IpAddr,
    pub hostname: Option<String>,
    pub allow_private: bool,
}

/// Ordered, duplicate-free port collection, cardinality <= 65535.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet(BTreeSet<u16>);

impl PortSet {
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        Self(ports.into_iter().collect())
    }

    pub fn from_sorted_vec(ports: Vec<u16>) -> Self {
        Self(ports.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn as_sorted_vec(&self) -> Vec<u16> {
        self.0.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Critical,
    High,
    Medium,
    Low,
}

impl TierKind {
    pub const ORDER: [TierKind; 4] = [
        TierKind::Critical,
        TierKind::High,
        TierKind::Medium,
        TierKind::Low,
    ];
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TierKind::Critical => "critical",
            TierKind::High => "high",
            TierKind::Medium => "medium",
            TierKind::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// A priority-graded subset of the requested port set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    pub kind: TierKind,
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    OpenFiltered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortResult {
    pub port: u16,
    pub state: PortState,
    pub service: Option<String>,
    pub version: Option<String>,
    pub banner: Option<String>,
    pub confidence: f32,
    pub protocol: Protocol,
    pub reason: Option<String>,
}

impl PortResult {
    pub fn new(port: u16, state: PortState) -> Self {
        Self {
            port,
            state,
            service: None,
            version: None,
            banner: None,
            confidence: 0.0,
            protocol: Protocol::Tcp,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CveStatus {
    SuccessCached,
    SuccessLive,
    NoCvesFound,
    SkippedLowConfidence,
    SkippedUnknownService,
    SkippedNoEvidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// ≥9 CRITICAL, ≥7 HIGH, ≥4 MEDIUM, else LOW.
    pub fn from_cvss(max_cvss: f32) -> Self {
        if max_cvss >= 9.0 {
            Severity::Critical
        } else if max_cvss >= 7.0 {
            Severity::High
        } else if max_cvss >= 4.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveRecord {
    pub id: String,
    pub cvss: f32,
    pub description: String,
}

/// PortResult enriched with CVE evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedPort {
    #[serde(flatten)]
    pub port_result: PortResult,
    pub cve_ids: Vec<String>,
    pub max_cvss: f32,
    pub cve_status: CveStatus,
    pub severity: Severity,
    pub mitre_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Progress,
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTask {
    pub task_id: Uuid,
    pub scan_id: Uuid,
    pub user_id: Option<String>,
    pub target: String,
    pub ports: String,
    pub state: TaskState,
    pub progress: f32,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cached: bool,
    pub error: Option<String>,
}

impl ScanTask {
    pub fn new(scan_id: Uuid, target: String, ports: String, user_id: Option<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            scan_id,
            user_id,
            target,
            ports,
            state: TaskState::Pending,
            progress: 0.0,
            submitted_at: Utc::now(),
            completed_at: None,
            cached: false,
            error: None,
        }
    }
}

/// Streamed scan event.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanEvent {
    #[serde(rename = "scan_start")]
    ScanStart { target: String, total_ports: usize },
    #[serde(rename = "tier_start")]
    TierStart {
        tier: TierKind,
        count: usize,
        progress: f32,
    },
    #[serde(rename = "open_port")]
    OpenPort {
        #[serde(flatten)]
        port: EnrichedPort,
        progress: f32,
    },
    #[serde(rename = "tier_complete")]
    TierComplete {
        tier: TierKind,
        open_count: usize,
        progress: f32,
    },
    #[serde(rename = "scan_complete")]
    ScanComplete,
    #[serde(rename = "error")]
    Error { message: String },
}

impl ScanEvent {
    /// Back-pressure priority: `open_port`/`tier_complete`/`scan_complete`/
    /// `error` must never be dropped; other (progress) events may be.
    pub fn is_droppable(&self) -> bool {
        matches!(self, ScanEvent::TierStart { .. } | ScanEvent::ScanStart { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveCacheEntry {
    pub service_key: String,
    pub version_key: Option<String>,
    pub cve_ids: Vec<CveRecord>,
    pub fetched_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CveCacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.fetched_at).num_seconds() < self.ttl_secs as i64
    }
}

/// Per-client rate/concurrency bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBudget {
    pub client_id: String,
    pub window_count: u32,
    pub window_start: DateTime<Utc>,
    pub violation_count: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub active_scans: u32,
}

impl ClientBudget {
    pub fn new(client_id: String, now: DateTime<Utc>) -> Self {
        Self {
            client_id,
            window_count: 0,
            window_start: now,
            violation_count: 0,
            cooldown_until: None,
            active_scans: 0,
        }
    }
}

/// One row of the audit table appended on every pre-scan-warning force
/// override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub resolved_ip: Option<IpAddr>,
    pub original_command: String,
    pub client_host: Option<String>,
    pub consent: bool,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_thresholds() {
        assert_eq!(Severity::from_cvss(9.8), Severity::Critical);
        assert_eq!(Severity::from_cvss(7.2), Severity::High);
        assert_eq!(Severity::from_cvss(4.0), Severity::Medium);
        assert_eq!(Severity::from_cvss(1.0), Severity::Low);
    }

    #[test]
    fn port_set_dedups_and_sorts() {
        let set = PortSet::new([80, 22, 80, 443]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.as_sorted_vec(), vec![22, 80, 443]);
    }

    #[test]
    fn tier_order_is_fixed() {
        assert_eq!(
            TierKind::ORDER,
            [
                TierKind::Critical,
                TierKind::High,
                TierKind::Medium,
                TierKind::Low
            ]
        );
    }
}
