//! Wiring of stores, analyzer, advisor and monitor behind the CLI commands.

use chrono::{DateTime, Utc};
use hawk_advisor::{Advisor, Advisory, Answer};
use hawk_analyzer::Analyzer;
use hawk_cloud::metrics::{dimension, namespace};
use hawk_cloud::{CloudProvider, MetricClient, Scope};
use hawk_guard::{LimitMonitor, MonitorOutcome};
use hawk_persist::{
    CredentialVault, HistoryStore, JsonCredentialVault, JsonHistoryStore, JsonLimitStore,
    LimitStore,
};
use hawk_proto::{
    AnalysisReport, AwsCredentials, CallerIdentity, HistoryEntry, StoredCredentials,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::HawkConfig;
use crate::error::{CtlError, CtlResult};

/// Everything `analyze` hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeOutput {
    pub identity: CallerIdentity,
    pub report: AnalysisReport,
    pub advice: Advisory,
    /// False when the history write failed; the report is still valid.
    pub history_saved: bool,
}

/// What `credentials show` may reveal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub user_id: String,
    pub access_key_id: String,
    pub account_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct App {
    config: HawkConfig,
    cloud: Arc<dyn CloudProvider>,
    analyzer: Analyzer,
    advisor: Advisor,
    monitor: LimitMonitor,
    history: Arc<dyn HistoryStore>,
    vault: Arc<dyn CredentialVault>,
}

impl App {
    /// JSON-file stores under `config.state_path`, Gemini advisor when a key
    /// is configured.
    pub fn open(config: HawkConfig, cloud: Arc<dyn CloudProvider>) -> CtlResult<Self> {
        let state = config.state_path.clone();
        let advisor = Advisor::from_config(&config.llm)?;
        Ok(Self::from_parts(
            config,
            cloud,
            advisor,
            Arc::new(JsonHistoryStore::open(&state)),
            Arc::new(JsonLimitStore::open(&state)),
            Arc::new(JsonCredentialVault::open(&state)),
        ))
    }

    pub fn from_parts(
        config: HawkConfig,
        cloud: Arc<dyn CloudProvider>,
        advisor: Advisor,
        history: Arc<dyn HistoryStore>,
        limits: Arc<dyn LimitStore>,
        vault: Arc<dyn CredentialVault>,
    ) -> Self {
        let analyzer = Analyzer::new(cloud.clone(), config.analyzer_config());
        let monitor = LimitMonitor::new(limits, cloud.clone())
            .with_grace_period(chrono::Duration::seconds(config.monitor.grace_period_secs));
        Self {
            config,
            cloud,
            analyzer,
            advisor,
            monitor,
            history,
            vault,
        }
    }

    pub fn config(&self) -> &HawkConfig {
        &self.config
    }

    pub fn monitor(&self) -> &LimitMonitor {
        &self.monitor
    }

    pub fn advisor(&self) -> &Advisor {
        &self.advisor
    }

    // ─── Credentials ─────────────────────────────────────────────────────────

    /// Explicit keys win; otherwise the vault entry for `user_id`.
    pub async fn resolve_credentials(
        &self,
        user_id: &str,
        explicit: Option<AwsCredentials>,
    ) -> CtlResult<AwsCredentials> {
        if let Some(credentials) = explicit {
            return Ok(credentials);
        }
        self.vault
            .get(user_id)
            .await?
            .map(|stored| stored.credentials)
            .ok_or_else(|| CtlError::CredentialsMissing(user_id.to_string()))
    }

    pub async fn credentials_show(&self, user_id: &str) -> CtlResult<Option<CredentialSummary>> {
        Ok(self.vault.get(user_id).await?.map(|stored| CredentialSummary {
            user_id: stored.user_id,
            access_key_id: stored.credentials.access_key_id,
            account_id: stored.account_id,
            updated_at: stored.updated_at,
        }))
    }

    pub async fn credentials_clear(&self, user_id: &str) -> CtlResult<bool> {
        let removed = self.vault.delete(user_id).await?;
        info!(user = user_id, removed, "credentials cleared");
        Ok(removed)
    }

    async fn remember_credentials(
        &self,
        user_id: &str,
        credentials: &AwsCredentials,
        identity: &CallerIdentity,
    ) {
        let stored = StoredCredentials {
            user_id: user_id.to_string(),
            credentials: credentials.clone(),
            account_id: Some(identity.account_id.clone()),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.vault.upsert(stored).await {
            warn!(user = user_id, error = %e, "failed to store credentials");
        }
    }

    /// Scope for the user's stored credentials in the primary region.
    pub async fn scope_for(&self, user_id: &str) -> Option<Scope> {
        match self.vault.get(user_id).await {
            Ok(stored) => stored.map(|s| Scope::new(s.credentials, &self.config.primary_region)),
            Err(e) => {
                warn!(user = user_id, error = %e, "credential lookup failed");
                None
            }
        }
    }

    // ─── Analysis ────────────────────────────────────────────────────────────

    pub async fn analyze(
        &self,
        user_id: &str,
        explicit: Option<AwsCredentials>,
    ) -> CtlResult<AnalyzeOutput> {
        self.analyze_at(user_id, explicit, Utc::now()).await
    }

    /// Validate, remember credentials, analyze, advise, record history.
    pub async fn analyze_at(
        &self,
        user_id: &str,
        explicit: Option<AwsCredentials>,
        now: DateTime<Utc>,
    ) -> CtlResult<AnalyzeOutput> {
        let credentials = self.resolve_credentials(user_id, explicit).await?;
        let timeout_secs = self.config.analysis_timeout_secs;

        let run = async {
            let identity = self.analyzer.validate(&credentials).await?;
            self.remember_credentials(user_id, &credentials, &identity).await;
            let report = self
                .analyzer
                .analyze_validated(&credentials, &identity, now)
                .await?;
            Ok::<_, CtlError>((identity, report))
        };
        let (identity, report) = tokio::time::timeout(Duration::from_secs(timeout_secs), run)
            .await
            .map_err(|_| CtlError::Timeout(timeout_secs))??;

        let history = match self
            .history
            .query_by_user(user_id, self.config.history_context_limit)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(user = user_id, error = %e, "history unavailable, advising without it");
                Vec::new()
            }
        };
        let advice = self.advisor.advise(&report, &history).await;

        let history_saved = match self
            .history
            .append(HistoryEntry::new(user_id, report.clone()))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(user = user_id, error = %e, "failed to record history");
                false
            }
        };

        info!(
            user = user_id,
            account = %identity.account_id,
            total_savings = report.total_savings,
            advice = ?advice.source,
            "analysis delivered"
        );
        Ok(AnalyzeOutput {
            identity,
            report,
            advice,
            history_saved,
        })
    }

    pub async fn history(&self, user_id: &str, limit: usize) -> CtlResult<Vec<HistoryEntry>> {
        Ok(self.history.query_by_user(user_id, limit).await?)
    }

    pub async fn ask(&self, user_id: &str, question: &str, with_context: bool) -> CtlResult<Answer> {
        let context = if with_context {
            self.history
                .query_by_user(user_id, 1)
                .await
                .unwrap_or_else(|e| {
                    warn!(user = user_id, error = %e, "history unavailable for question context");
                    Vec::new()
                })
                .into_iter()
                .next()
        } else {
            None
        };
        Ok(self.advisor.ask(question, context.as_ref()).await?)
    }

    // ─── Monitoring ──────────────────────────────────────────────────────────

    /// Latest CPU reading for an instance, using the user's stored keys.
    pub async fn sample_cpu(&self, user_id: &str, instance_id: &str) -> CtlResult<Option<f64>> {
        let scope = self
            .scope_for(user_id)
            .await
            .ok_or_else(|| CtlError::CredentialsMissing(user_id.to_string()))?;
        Ok(MetricClient::new(self.cloud.as_ref(), &scope)
            .latest_value(
                namespace::EC2,
                "CPUUtilization",
                instance_id,
                dimension::INSTANCE_ID,
            )
            .await)
    }

    pub async fn observe(
        &self,
        user_id: &str,
        instance_id: &str,
        cpu_pct: f64,
    ) -> CtlResult<MonitorOutcome> {
        self.observe_at(user_id, instance_id, cpu_pct, Utc::now()).await
    }

    pub async fn observe_at(
        &self,
        user_id: &str,
        instance_id: &str,
        cpu_pct: f64,
        now: DateTime<Utc>,
    ) -> CtlResult<MonitorOutcome> {
        let scope = self.scope_for(user_id).await;
        Ok(self
            .monitor
            .observe_at(user_id, instance_id, cpu_pct, scope.as_ref(), now)
            .await?)
    }
}
