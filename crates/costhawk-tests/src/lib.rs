//! Shared builders for the CostHawk integration tests.
//!
//! Inventory constructors produce minimal but realistic resources;
//! [`ScriptedLlm`] replays canned model replies and records every call.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hawk_advisor::{Advisor, AdvisorConfig, GenerationConfig, LlmError, LlmProvider, LlmResult};
use hawk_cloud::CloudProvider;
use hawk_persist::{JsonCredentialVault, JsonHistoryStore, JsonLimitStore};
use hawk_proto::{
    AwsCredentials, Datapoint, EbsVolume, Ec2Instance, Ec2State, LambdaFunction, RdsInstance,
    Snapshot, VolumeState,
};
use hawkctl::{App, HawkConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

// ─── Inventory ────────────────────────────────────────────────────────────────

pub fn credentials() -> AwsCredentials {
    AwsCredentials::new("AKIAINTEGRATION", "integration-secret")
}

pub fn instance(id: &str, instance_type: &str, state: Ec2State) -> Ec2Instance {
    Ec2Instance {
        instance_id: id.to_string(),
        name: Some(format!("{id}-name")),
        instance_type: instance_type.to_string(),
        state,
        launched_at: None,
        availability_zone: Some("us-east-1a".to_string()),
        platform: None,
    }
}

pub fn volume(id: &str, volume_type: &str, size_gb: u32, state: VolumeState) -> EbsVolume {
    let attached_to = match state {
        VolumeState::InUse => vec!["i-attached".to_string()],
        _ => vec![],
    };
    EbsVolume {
        volume_id: id.to_string(),
        volume_type: volume_type.to_string(),
        size_gb,
        state,
        iops: None,
        attached_to,
        encrypted: true,
        created_at: None,
    }
}

pub fn snapshot(id: &str, size_gb: u32, started_at: DateTime<Utc>) -> Snapshot {
    Snapshot {
        snapshot_id: id.to_string(),
        volume_id: Some("vol-source".to_string()),
        size_gb,
        started_at: Some(started_at),
        description: None,
    }
}

pub fn function(name: &str) -> LambdaFunction {
    LambdaFunction {
        function_name: name.to_string(),
        runtime: Some("python3.12".to_string()),
        memory_mb: 128,
        timeout_secs: 30,
        code_size_bytes: 4096,
        last_modified: None,
    }
}

pub fn database(id: &str, instance_class: &str, multi_az: bool) -> RdsInstance {
    RdsInstance {
        db_instance_id: id.to_string(),
        instance_class: instance_class.to_string(),
        engine: "postgres".to_string(),
        engine_version: Some("16.3".to_string()),
        status: "available".to_string(),
        multi_az,
        allocated_storage_gb: 20,
        created_at: None,
    }
}

/// `hours` hourly buckets ending at `now`, each with the same figures.
pub fn hourly(now: DateTime<Utc>, hours: i64, average: f64, maximum: f64) -> Vec<Datapoint> {
    (0..hours)
        .map(|h| Datapoint {
            timestamp: now - Duration::hours(h),
            average: Some(average),
            maximum: Some(maximum),
            minimum: Some(average.min(maximum)),
            sum: Some(average * 60.0),
            sample_count: Some(60.0),
        })
        .collect()
}

// ─── LLM ──────────────────────────────────────────────────────────────────────

/// Model provider that answers from per-model reply queues.
///
/// The last queued reply for a model repeats forever; a model with no
/// replies is reported as missing.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    models: Vec<String>,
    replies: Mutex<HashMap<String, VecDeque<LlmResult<String>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn reply(self, model: &str, reply: LlmResult<String>) -> Self {
        self.replies
            .lock()
            .entry(model.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Every `generate` call, in order, by model id.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, model: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == model).count()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn list_models(&self) -> LlmResult<Vec<String>> {
        Ok(self.models.clone())
    }

    async fn generate(
        &self,
        model: &str,
        _prompt: &str,
        _config: &GenerationConfig,
    ) -> LlmResult<String> {
        self.calls.lock().push(model.to_string());
        let mut replies = self.replies.lock();
        let Some(queue) = replies.get_mut(model) else {
            return Err(LlmError::ModelMissing(format!("models/{model} is not found")));
        };
        match queue.len() {
            0 => Err(LlmError::ModelMissing(format!("models/{model} is not found"))),
            1 => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(LlmError::Other("empty script".to_string()))),
            _ => queue
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Other("empty script".to_string()))),
        }
    }
}

/// Advisor over `llm` with no backoff between attempts.
pub fn scripted_advisor(llm: Arc<ScriptedLlm>) -> Advisor {
    let config = AdvisorConfig {
        retry_base_delay_ms: 0,
        ..AdvisorConfig::default()
    };
    Advisor::new(llm, &config)
}

// ─── App ──────────────────────────────────────────────────────────────────────

/// An [`App`] with in-memory stores over the given cloud and advisor.
pub fn memory_app(cloud: Arc<dyn CloudProvider>, advisor: Advisor) -> App {
    App::from_parts(
        HawkConfig::default(),
        cloud,
        advisor,
        Arc::new(JsonHistoryStore::in_memory()),
        Arc::new(JsonLimitStore::in_memory()),
        Arc::new(JsonCredentialVault::in_memory()),
    )
}
