//! The limit monitor state machine.

use crate::state::{MonitorKey, MonitoringState, Phase};
use crate::{MonitorError, MonitorResult};
use chrono::{DateTime, Duration, Utc};
use hawk_cloud::{CloudProvider, Scope, StopResult};
use hawk_persist::LimitStore;
use hawk_proto::{InstanceLimit, MonitorAction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Seconds between the first breach and the shutdown.
pub const DEFAULT_GRACE_SECS: i64 = 30;

/// What one sample evaluation decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorOutcome {
    pub action: MonitorAction,
    pub instance_id: String,
    pub cpu_pct: f64,
    pub limit_pct: Option<f64>,
    pub breach_count: Option<u64>,
    /// Seconds until shutdown, for `alert` and `countdown`.
    pub remaining_secs: Option<i64>,
    pub stop: Option<StopResult>,
    pub message: String,
}

impl MonitorOutcome {
    fn new(action: MonitorAction, instance_id: &str, cpu_pct: f64, message: impl Into<String>) -> Self {
        Self {
            action,
            instance_id: instance_id.to_string(),
            cpu_pct,
            limit_pct: None,
            breach_count: None,
            remaining_secs: None,
            stop: None,
            message: message.into(),
        }
    }

    fn for_limit(mut self, limit: &InstanceLimit) -> Self {
        self.limit_pct = Some(limit.cpu_limit_pct);
        self.breach_count = Some(limit.breach_count);
        self
    }
}

/// An instance currently between breach and shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub instance_id: String,
    pub phase: Phase,
    pub alerted_at: DateTime<Utc>,
    pub scheduled_shutdown_at: DateTime<Utc>,
    pub remaining_secs: i64,
    pub breach_count: u64,
    pub cpu_limit_pct: Option<f64>,
}

pub struct LimitMonitor {
    limits: Arc<dyn LimitStore>,
    cloud: Arc<dyn CloudProvider>,
    grace: Duration,
    states: Mutex<HashMap<MonitorKey, MonitoringState>>,
}

impl LimitMonitor {
    pub fn new(limits: Arc<dyn LimitStore>, cloud: Arc<dyn CloudProvider>) -> Self {
        Self {
            limits,
            cloud,
            grace: Duration::seconds(DEFAULT_GRACE_SECS),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    pub fn state(&self, user_id: &str, instance_id: &str) -> Option<MonitoringState> {
        self.states
            .lock()
            .get(&MonitorKey::new(user_id, instance_id))
            .cloned()
    }

    fn clear(&self, key: &MonitorKey) -> bool {
        self.states.lock().remove(key).is_some()
    }

    // ─── Limit management ────────────────────────────────────────────────────

    /// Create or replace the limit for an instance. Breach count restarts at 0.
    pub async fn set_limit(
        &self,
        user_id: &str,
        instance_id: &str,
        cpu_limit_pct: f64,
        auto_shutdown: bool,
    ) -> MonitorResult<InstanceLimit> {
        if !cpu_limit_pct.is_finite() || cpu_limit_pct <= 0.0 || cpu_limit_pct > 100.0 {
            return Err(MonitorError::InvalidLimit(cpu_limit_pct));
        }
        let limit = InstanceLimit::new(user_id, instance_id, cpu_limit_pct, auto_shutdown);
        self.limits.upsert(limit.clone()).await?;
        info!(user = user_id, instance = instance_id, cpu_limit_pct, auto_shutdown, "limit set");
        Ok(limit)
    }

    /// Remove the limit and any countdown in progress.
    pub async fn remove_limit(&self, user_id: &str, instance_id: &str) -> MonitorResult<bool> {
        let removed = self.limits.delete(user_id, instance_id).await?;
        self.clear(&MonitorKey::new(user_id, instance_id));
        info!(user = user_id, instance = instance_id, removed, "limit removed");
        Ok(removed)
    }

    pub async fn list_limits(&self, user_id: &str) -> MonitorResult<Vec<InstanceLimit>> {
        Ok(self.limits.list_by_user(user_id).await?)
    }

    pub async fn active_alerts(&self, user_id: &str) -> MonitorResult<Vec<ActiveAlert>> {
        self.active_alerts_at(user_id, Utc::now()).await
    }

    pub async fn active_alerts_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> MonitorResult<Vec<ActiveAlert>> {
        let mut mine: Vec<(MonitorKey, MonitoringState)> = self
            .states
            .lock()
            .iter()
            .filter(|(k, _)| k.user_id == user_id)
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        mine.sort_by(|a, b| a.0.cmp(&b.0));

        let mut alerts = Vec::with_capacity(mine.len());
        for (key, state) in mine {
            let limit = self.limits.get(user_id, &key.instance_id).await?;
            alerts.push(ActiveAlert {
                instance_id: key.instance_id,
                phase: state.phase,
                alerted_at: state.alerted_at,
                scheduled_shutdown_at: state.scheduled_shutdown_at,
                remaining_secs: state.remaining_secs(now),
                breach_count: limit.as_ref().map(|l| l.breach_count).unwrap_or(0),
                cpu_limit_pct: limit.map(|l| l.cpu_limit_pct),
            });
        }
        Ok(alerts)
    }

    // ─── Sample evaluation ───────────────────────────────────────────────────

    pub async fn observe(
        &self,
        user_id: &str,
        instance_id: &str,
        cpu_pct: f64,
        scope: Option<&Scope>,
    ) -> MonitorResult<MonitorOutcome> {
        self.observe_at(user_id, instance_id, cpu_pct, scope, Utc::now())
            .await
    }

    /// Evaluate one CPU sample taken at `now`.
    ///
    /// `scope` carries the credentials used for the stop command; without it
    /// an elapsed countdown reports `manual_required`.
    pub async fn observe_at(
        &self,
        user_id: &str,
        instance_id: &str,
        cpu_pct: f64,
        scope: Option<&Scope>,
        now: DateTime<Utc>,
    ) -> MonitorResult<MonitorOutcome> {
        if !cpu_pct.is_finite() || cpu_pct < 0.0 {
            return Err(MonitorError::InvalidSample(cpu_pct));
        }
        let key = MonitorKey::new(user_id, instance_id);

        let Some(limit) = self.limits.get(user_id, instance_id).await? else {
            self.clear(&key);
            return Ok(MonitorOutcome::new(
                MonitorAction::None,
                instance_id,
                cpu_pct,
                "no limit configured",
            ));
        };

        if cpu_pct <= limit.cpu_limit_pct {
            if self.clear(&key) {
                info!(user = user_id, instance = instance_id, cpu_pct, "cpu back under limit, alert cleared");
            }
            return Ok(MonitorOutcome::new(
                MonitorAction::None,
                instance_id,
                cpu_pct,
                format!("CPU {cpu_pct:.1}% within limit {:.1}%", limit.cpu_limit_pct),
            )
            .for_limit(&limit));
        }

        // Every breach sample counts, whatever the countdown says.
        let limit = match self.limits.increment_breach(user_id, instance_id, now).await {
            Ok(Some(updated)) => updated,
            Ok(None) => limit,
            Err(e) => {
                warn!(user = user_id, instance = instance_id, error = %e, "failed to record breach");
                limit
            }
        };

        let existing = self.states.lock().get(&key).cloned();
        let Some(state) = existing else {
            let fresh = MonitoringState::alerted(now, self.grace);
            self.states.lock().insert(key.clone(), fresh.clone());
            warn!(
                user = user_id,
                instance = instance_id,
                cpu_pct,
                limit_pct = limit.cpu_limit_pct,
                shutdown_at = %fresh.scheduled_shutdown_at,
                "cpu limit breached"
            );
            let remaining = fresh.remaining_secs(now);
            let mut outcome = MonitorOutcome::new(
                MonitorAction::Alert,
                instance_id,
                cpu_pct,
                format!(
                    "CPU {cpu_pct:.1}% exceeds limit {:.1}%; shutdown in {remaining}s",
                    limit.cpu_limit_pct
                ),
            )
            .for_limit(&limit);
            outcome.remaining_secs = Some(remaining);
            return Ok(outcome);
        };

        if state.phase == Phase::ShuttingDown {
            let mut outcome = MonitorOutcome::new(
                MonitorAction::Countdown,
                instance_id,
                cpu_pct,
                "shutdown already in progress",
            )
            .for_limit(&limit);
            outcome.remaining_secs = Some(0);
            return Ok(outcome);
        }

        if !state.is_elapsed(now) {
            let remaining = state.remaining_secs(now);
            debug!(user = user_id, instance = instance_id, remaining, "countdown");
            let mut outcome = MonitorOutcome::new(
                MonitorAction::Countdown,
                instance_id,
                cpu_pct,
                format!("shutdown in {remaining}s"),
            )
            .for_limit(&limit);
            outcome.remaining_secs = Some(remaining);
            return Ok(outcome);
        }

        let scope = match scope {
            Some(scope) if limit.auto_shutdown => scope,
            _ => {
                let reason = if limit.auto_shutdown {
                    "no credentials available to stop the instance"
                } else {
                    "auto-shutdown disabled"
                };
                warn!(user = user_id, instance = instance_id, reason, "manual action required");
                return Ok(MonitorOutcome::new(
                    MonitorAction::ManualRequired,
                    instance_id,
                    cpu_pct,
                    format!("grace period elapsed; {reason}, stop the instance manually"),
                )
                .for_limit(&limit));
            }
        };

        self.set_phase(&key, Phase::ShuttingDown);
        info!(user = user_id, instance = instance_id, region = %scope.region, "stopping instance");
        match self.cloud.stop_instance(scope, instance_id).await {
            Ok(stop) => {
                self.clear(&key);
                info!(
                    instance = instance_id,
                    previous = %stop.previous_state,
                    current = %stop.current_state,
                    "instance stopped"
                );
                let mut outcome = MonitorOutcome::new(
                    MonitorAction::Stopped,
                    instance_id,
                    cpu_pct,
                    format!("instance {} -> {}", stop.previous_state, stop.current_state),
                )
                .for_limit(&limit);
                outcome.stop = Some(stop);
                Ok(outcome)
            }
            Err(e) => {
                // Keep the countdown so the next sample retries the stop.
                self.set_phase(&key, Phase::Alerted);
                error!(instance = instance_id, error = %e, "stop command failed");
                Ok(MonitorOutcome::new(
                    MonitorAction::Error,
                    instance_id,
                    cpu_pct,
                    format!("failed to stop instance: {e}"),
                )
                .for_limit(&limit))
            }
        }
    }

    fn set_phase(&self, key: &MonitorKey, phase: Phase) {
        if let Some(state) = self.states.lock().get_mut(key) {
            state.phase = phase;
        }
    }
}
