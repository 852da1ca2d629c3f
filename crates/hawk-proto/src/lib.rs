//! Shared data model for CostHawk.
//!
//! Inventory snapshots produced by the resource collectors, underutilization
//! findings, the cost summary, the unified analysis report, and the records
//! persisted between runs (history entries, instance limits, credentials).

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ─── Money ────────────────────────────────────────────────────────────────────

/// Round a currency amount to cents.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

// ─── Resource Kind ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Ec2,
    Ebs,
    Snapshot,
    Lambda,
    Rds,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Ec2,
        ResourceKind::Ebs,
        ResourceKind::Snapshot,
        ResourceKind::Lambda,
        ResourceKind::Rds,
    ];
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ec2 => write!(f, "ec2"),
            Self::Ebs => write!(f, "ebs"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Lambda => write!(f, "lambda"),
            Self::Rds => write!(f, "rds"),
        }
    }
}

// ─── Inventory ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Ec2State {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    #[default]
    Unknown,
}

impl Ec2State {
    /// Map the provider's state name (`running`, `shutting-down`, ...) onto the enum.
    pub fn from_api(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Ec2State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ec2Instance {
    pub instance_id: String,
    pub name: Option<String>,
    pub instance_type: String,
    pub state: Ec2State,
    pub launched_at: Option<DateTime<Utc>>,
    pub availability_zone: Option<String>,
    pub platform: Option<String>,
}

impl Ec2Instance {
    /// The `Name` tag, or "Unnamed".
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeState {
    Creating,
    Available,
    InUse,
    Deleting,
    Deleted,
    Error,
    #[default]
    Unknown,
}

impl VolumeState {
    pub fn from_api(name: &str) -> Self {
        match name {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "in-use" => Self::InUse,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbsVolume {
    pub volume_id: String,
    pub volume_type: String,
    pub size_gb: u32,
    pub state: VolumeState,
    pub iops: Option<u32>,
    #[serde(default)]
    pub attached_to: Vec<String>,
    #[serde(default)]
    pub encrypted: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl EbsVolume {
    /// `io1` / `io2` volumes bill for provisioned IOPS.
    pub fn is_provisioned_iops(&self) -> bool {
        self.volume_type.starts_with("io")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub volume_id: Option<String>,
    pub size_gb: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaFunction {
    pub function_name: String,
    pub runtime: Option<String>,
    pub memory_mb: u32,
    pub timeout_secs: u32,
    #[serde(default)]
    pub code_size_bytes: u64,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdsInstance {
    pub db_instance_id: String,
    pub instance_class: String,
    pub engine: String,
    pub engine_version: Option<String>,
    pub status: String,
    #[serde(default)]
    pub multi_az: bool,
    pub allocated_storage_gb: u32,
    pub created_at: Option<DateTime<Utc>>,
}

// ─── Metrics ──────────────────────────────────────────────────────────────────

/// One aggregation bucket as returned by the metrics provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub average: Option<f64>,
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
    pub sum: Option<f64>,
    pub sample_count: Option<f64>,
}

/// Statistics folded from a window of datapoints.
///
/// `sample_count` is the number of buckets seen; zero means "no data",
/// which is never evidence of low usage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub average: f64,
    pub maximum: f64,
    pub minimum: f64,
    pub sum: f64,
    pub sample_count: u32,
}

impl MetricStatistics {
    pub fn has_data(&self) -> bool {
        self.sample_count > 0
    }
}

// ─── Findings ─────────────────────────────────────────────────────────────────

/// The rule that flagged a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingRule {
    LowCpu,
    Stopped,
    Unattached,
    LowIopsUtilization,
    Gp2Migration,
    OldSnapshot,
    LowInvocations,
    HighErrorRate,
    LowConnections,
}

/// Resource-specific usage figures attached to a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum UsageMetrics {
    Compute {
        cpu_average: f64,
        cpu_maximum: f64,
        network_in_bytes: f64,
    },
    Stopped,
    Volume {
        size_gb: u32,
        iops_utilization_pct: Option<f64>,
    },
    Snapshot {
        size_gb: u32,
        age_days: i64,
    },
    Function {
        invocations: u64,
        errors: u64,
        average_duration_ms: f64,
    },
    Database {
        cpu_average: f64,
        cpu_maximum: f64,
        connections_average: f64,
        connections_maximum: f64,
        read_iops: f64,
        write_iops: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: ResourceKind,
    pub resource_id: String,
    /// Instance type, volume type, runtime or DB class.
    pub resource_type: Option<String>,
    pub name: Option<String>,
    pub rule: FindingRule,
    pub usage: UsageMetrics,
    pub reason: String,
    /// Non-negative, rounded to cents.
    pub estimated_monthly_savings: f64,
    pub recommendation: String,
}

impl Finding {
    pub fn age_days(&self) -> Option<i64> {
        match self.usage {
            UsageMetrics::Snapshot { age_days, .. } => Some(age_days),
            _ => None,
        }
    }

    pub fn cpu_average(&self) -> Option<f64> {
        match self.usage {
            UsageMetrics::Compute { cpu_average, .. }
            | UsageMetrics::Database { cpu_average, .. } => Some(cpu_average),
            _ => None,
        }
    }
}

// ─── Cost ─────────────────────────────────────────────────────────────────────

/// Which billing period `CostSummary::current` actually describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CostBasis {
    #[default]
    MonthToDate,
    /// Month-to-date was zero; the prior full month stands in as a reference.
    PriorMonth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CostSummary {
    pub current: f64,
    pub forecast: f64,
    /// True when `forecast` is the `current × 1.05` estimate.
    pub forecast_estimated: bool,
    pub breakdown: BTreeMap<String, f64>,
    pub basis: CostBasis,
}

// ─── Analysis Report ──────────────────────────────────────────────────────────

/// Inventory plus findings for one resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSection<T> {
    pub inventory: Vec<T>,
    pub findings: Vec<Finding>,
}

impl<T> Default for ResourceSection<T> {
    fn default() -> Self {
        Self {
            inventory: Vec::new(),
            findings: Vec::new(),
        }
    }
}

impl<T> ResourceSection<T> {
    pub fn savings(&self) -> f64 {
        round2(
            self.findings
                .iter()
                .map(|f| f.estimated_monthly_savings)
                .sum(),
        )
    }
}

/// Per-kind savings subtotals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SavingsBreakdown {
    pub ec2: f64,
    pub ebs: f64,
    pub snapshots: f64,
    pub lambda: f64,
    pub rds: f64,
}

impl SavingsBreakdown {
    pub fn get(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Ec2 => self.ec2,
            ResourceKind::Ebs => self.ebs,
            ResourceKind::Snapshot => self.snapshots,
            ResourceKind::Lambda => self.lambda,
            ResourceKind::Rds => self.rds,
        }
    }

    pub fn total(&self) -> f64 {
        round2(ResourceKind::ALL.iter().map(|k| self.get(*k)).sum())
    }
}

/// A collector that failed and was degraded to an empty contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorFailure {
    pub collector: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub account_id: Option<String>,
    /// The region the caller asked for.
    pub primary_region: String,
    /// The region whose EC2/EBS/snapshot data the report carries.
    pub region: String,
    pub regions_scanned: Vec<String>,
    pub cost: CostSummary,
    pub ec2: ResourceSection<Ec2Instance>,
    pub ebs: ResourceSection<EbsVolume>,
    pub snapshots: ResourceSection<Snapshot>,
    pub lambda: ResourceSection<LambdaFunction>,
    pub rds: ResourceSection<RdsInstance>,
    pub savings: SavingsBreakdown,
    pub total_savings: f64,
    #[serde(default)]
    pub collector_failures: Vec<CollectorFailure>,
}

impl AnalysisReport {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.ec2
            .findings
            .iter()
            .chain(&self.ebs.findings)
            .chain(&self.snapshots.findings)
            .chain(&self.lambda.findings)
            .chain(&self.rds.findings)
    }

    pub fn finding_count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Ec2 => self.ec2.findings.len(),
            ResourceKind::Ebs => self.ebs.findings.len(),
            ResourceKind::Snapshot => self.snapshots.findings.len(),
            ResourceKind::Lambda => self.lambda.findings.len(),
            ResourceKind::Rds => self.rds.findings.len(),
        }
    }

    pub fn annual_savings(&self) -> f64 {
        round2(self.total_savings * 12.0)
    }

    pub fn running_instances(&self) -> usize {
        self.ec2
            .inventory
            .iter()
            .filter(|i| i.state == Ec2State::Running)
            .count()
    }

    pub fn stopped_instances(&self) -> usize {
        self.ec2
            .inventory
            .iter()
            .filter(|i| i.state == Ec2State::Stopped)
            .count()
    }

    pub fn unattached_volumes(&self) -> usize {
        self.ebs
            .inventory
            .iter()
            .filter(|v| v.state == VolumeState::Available)
            .count()
    }

    pub fn total_storage_gb(&self) -> u64 {
        self.ebs.inventory.iter().map(|v| u64::from(v.size_gb)).sum()
    }
}

/// One immutable analysis snapshot owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub user_id: String,
    pub analyzed_at: DateTime<Utc>,
    pub report: AnalysisReport,
}

impl HistoryEntry {
    pub fn new(user_id: impl Into<String>, report: AnalysisReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            analyzed_at: report.generated_at,
            report,
        }
    }
}

// ─── Instance Limits ──────────────────────────────────────────────────────────

/// A per-(user, instance) CPU ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceLimit {
    pub user_id: String,
    pub instance_id: String,
    pub cpu_limit_pct: f64,
    pub auto_shutdown: bool,
    pub breach_count: u64,
    pub last_breach_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceLimit {
    pub fn new(
        user_id: impl Into<String>,
        instance_id: impl Into<String>,
        cpu_limit_pct: f64,
        auto_shutdown: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            instance_id: instance_id.into(),
            cpu_limit_pct,
            auto_shutdown,
            breach_count: 0,
            last_breach_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of one monitor evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorAction {
    None,
    Alert,
    Countdown,
    Stopped,
    Error,
    ManualRequired,
}

impl std::fmt::Display for MonitorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Alert => write!(f, "alert"),
            Self::Countdown => write!(f, "countdown"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
            Self::ManualRequired => write!(f, "manual_required"),
        }
    }
}

// ─── Credentials ──────────────────────────────────────────────────────────────

/// Static access keys for the cloud account. Debug output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub user_id: String,
    pub credentials: AwsCredentials,
    pub account_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Identity returned by a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub account_id: String,
    pub principal_arn: String,
    pub user_id: String,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
