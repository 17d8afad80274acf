//! A2A (agent-to-agent) protocol sessions
//!
//! Peer handshake, skill negotiation, and a live streaming channel of
//! JSON frames tagged with a `kind` field. Only known kinds are
//! delivered; anything else is a validation failure at the boundary.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use hive_core::{constants::a2a, ClockRef, HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Message kinds carried on an A2A stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Handshake,
    Negotiate,
    TaskStart,
    TaskProgress,
    TaskResult,
    Cancel,
    Ping,
    Pong,
}

/// One frame on an A2A stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aFrame {
    pub kind: FrameKind,
    #[serde(default)]
    pub payload: Value,
}

impl A2aFrame {
    pub fn new(kind: FrameKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Parse a raw JSON document into a frame. Unknown kinds fail with
    /// Validation.
    pub fn parse(raw: &Value) -> HiveResult<Self> {
        let kind = raw
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| HiveError::validation("A2A frame missing 'kind' field"))?;
        let kind: FrameKind = serde_json::from_value(Value::String(kind.to_string()))
            .map_err(|_| {
                HiveError::validation(format!("Unknown A2A frame kind '{}'", kind))
                    .with_details(serde_json::json!({ "kind": kind }))
            })?;
        Ok(Self {
            kind,
            payload: raw.get("payload").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Handshake request from a peer agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub agent_id: String,
    pub agent_name: String,
    pub capabilities: BTreeSet<String>,
    pub protocol_version: String,
}

/// Handshake response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub session_id: String,
    pub server_capabilities: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

/// One A2A session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2aSession {
    pub session_id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub agent_capabilities: BTreeSet<String>,
    pub protocol_version: String,
    pub is_active: bool,
    pub has_stream: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a skill negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub negotiation_id: String,
    pub session_id: String,
    pub requested_skills: BTreeSet<String>,
    pub available_skills: BTreeSet<String>,
    pub task_description: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ProposedPlan>,
}

/// Plan proposed for an accepted negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedPlan {
    pub estimated_duration_secs: u64,
    pub estimated_cost_usd: f64,
    pub steps: Vec<String>,
}

/// Estimates duration and cost for a negotiated task. The runtime wires
/// a router-backed implementation; the default is a deterministic
/// heuristic for provider-less deployments.
pub trait PlanEstimator: Send + Sync {
    fn estimate(&self, task_description: &str) -> (u64, f64);
}

/// Length-scaled heuristic estimator.
#[derive(Debug, Default)]
pub struct HeuristicPlanEstimator;

impl PlanEstimator for HeuristicPlanEstimator {
    fn estimate(&self, task_description: &str) -> (u64, f64) {
        let words = task_description.split_whitespace().count() as u64;
        (30 + words, 0.001 * (1 + words) as f64)
    }
}

/// Registry of live A2A sessions.
pub struct A2aSessionRegistry {
    sessions: DashMap<String, A2aSession>,
    streams: DashMap<String, mpsc::Sender<A2aFrame>>,
    server_capabilities: BTreeSet<String>,
    session_ttl: Duration,
    estimator: Box<dyn PlanEstimator>,
    clock: ClockRef,
}

impl A2aSessionRegistry {
    pub fn new(session_ttl: Duration, clock: ClockRef) -> Self {
        Self {
            sessions: DashMap::new(),
            streams: DashMap::new(),
            server_capabilities: ["task_execution", "negotiation", "streaming"]
                .into_iter()
                .map(String::from)
                .collect(),
            session_ttl,
            estimator: Box::new(HeuristicPlanEstimator),
            clock,
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn PlanEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Accept a peer handshake and open a session.
    pub fn handshake(&self, request: HandshakeRequest) -> HiveResult<HandshakeResponse> {
        if request.agent_id.is_empty() {
            return Err(HiveError::validation("agent_id is required"));
        }
        if request.protocol_version != a2a::PROTOCOL_VERSION {
            return Err(HiveError::validation(format!(
                "Unsupported A2A protocol version '{}', expected '{}'",
                request.protocol_version,
                a2a::PROTOCOL_VERSION
            )));
        }

        let now = self.clock.now();
        let expires_at = now + ChronoDuration::from_std(self.session_ttl).unwrap_or_default();
        let session = A2aSession {
            session_id: Uuid::new_v4().to_string(),
            agent_id: request.agent_id,
            agent_name: request.agent_name,
            agent_capabilities: request.capabilities,
            protocol_version: request.protocol_version,
            is_active: true,
            has_stream: false,
            created_at: now,
            last_activity: now,
            expires_at,
        };
        tracing::info!(
            session_id = %session.session_id,
            agent = %session.agent_name,
            "A2A session opened"
        );
        let response = HandshakeResponse {
            session_id: session.session_id.clone(),
            server_capabilities: self.server_capabilities.clone(),
            expires_at,
        };
        self.sessions.insert(session.session_id.clone(), session);
        Ok(response)
    }

    /// Negotiate skills for a task. Accepted iff every requested skill
    /// is within the agent's declared capabilities.
    pub fn negotiate(
        &self,
        session_id: &str,
        requested_skills: BTreeSet<String>,
        task_description: &str,
    ) -> HiveResult<Negotiation> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| HiveError::not_found(format!("A2A session '{}'", session_id)))?;
        if !session.is_active {
            return Err(HiveError::conflict("session is closed"));
        }
        session.last_activity = self.clock.now();

        let accepted = requested_skills.is_subset(&session.agent_capabilities);
        let plan = accepted.then(|| {
            let (duration, cost) = self.estimator.estimate(task_description);
            ProposedPlan {
                estimated_duration_secs: duration,
                estimated_cost_usd: cost,
                steps: vec![
                    "validate inputs".to_string(),
                    "execute task".to_string(),
                    "report result".to_string(),
                ],
            }
        });

        tracing::info!(session_id, accepted, "A2A negotiation");
        Ok(Negotiation {
            negotiation_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            available_skills: session.agent_capabilities.clone(),
            requested_skills,
            task_description: task_description.to_string(),
            accepted,
            plan,
        })
    }

    /// Register the live message channel for a session.
    pub fn attach_stream(
        &self,
        session_id: &str,
        stream: mpsc::Sender<A2aFrame>,
    ) -> HiveResult<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| HiveError::not_found(format!("A2A session '{}'", session_id)))?;
        session.has_stream = true;
        self.streams.insert(session_id.to_string(), stream);
        Ok(())
    }

    /// Unregister the message channel.
    pub fn detach_stream(&self, session_id: &str) -> HiveResult<()> {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.has_stream = false;
        }
        self.streams.remove(session_id);
        Ok(())
    }

    /// Deliver a raw JSON document to a session's stream. The frame is
    /// validated before delivery; unknown kinds never reach the peer.
    pub async fn deliver(&self, session_id: &str, raw: &Value) -> HiveResult<()> {
        let frame = A2aFrame::parse(raw)?;
        let stream = self
            .streams
            .get(session_id)
            .map(|s| s.clone())
            .ok_or_else(|| {
                HiveError::conflict(format!("session '{}' has no attached stream", session_id))
            })?;
        stream
            .send(frame)
            .await
            .map_err(|_| HiveError::conflict("session stream is closed"))
    }

    /// Session snapshot.
    pub fn get(&self, session_id: &str) -> Option<A2aSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Close a session and drop its stream.
    pub fn close(&self, session_id: &str) -> HiveResult<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| HiveError::not_found(format!("A2A session '{}'", session_id)))?;
        session.is_active = false;
        session.has_stream = false;
        drop(session);
        self.streams.remove(session_id);
        Ok(())
    }
}
