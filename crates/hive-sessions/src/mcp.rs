//! MCP protocol sessions
//!
//! Initialize negotiates server capabilities as the intersection of the
//! client's declared set with the advertised feature set, plus the
//! mandatory features every session gets. A janitor closes sessions
//! idle past the configured timeout.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use hive_core::{constants::mcp, ClockRef, HiveError, HiveResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

/// Client identity declared at initialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// One MCP session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpSession {
    pub session_id: String,
    pub client_info: ClientInfo,
    pub protocol_version: String,
    pub client_capabilities: BTreeSet<String>,
    pub server_capabilities: BTreeSet<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Initialize response returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    pub session_id: String,
    pub protocol_version: String,
    pub server_name: String,
    pub server_version: String,
    pub server_capabilities: BTreeSet<String>,
}

/// Registry of live MCP sessions.
pub struct McpSessionRegistry {
    sessions: DashMap<String, McpSession>,
    /// Optional features the server advertises
    server_features: BTreeSet<String>,
    /// Features granted to every session regardless of the client set
    mandatory_features: BTreeSet<String>,
    idle_timeout: Duration,
    max_sessions: usize,
    clock: ClockRef,
}

impl McpSessionRegistry {
    pub fn new(idle_timeout: Duration, max_sessions: usize, clock: ClockRef) -> Self {
        Self {
            sessions: DashMap::new(),
            server_features: ["tools", "resources", "prompts", "streaming", "sampling"]
                .into_iter()
                .map(String::from)
                .collect(),
            mandatory_features: ["ping", "logging"].into_iter().map(String::from).collect(),
            idle_timeout,
            max_sessions,
            clock,
        }
    }

    /// Negotiate a new session. Server capabilities are the client set
    /// intersected with the advertised features, plus the mandatory
    /// ones.
    pub fn create(
        &self,
        client_info: ClientInfo,
        protocol_version: &str,
        client_capabilities: BTreeSet<String>,
    ) -> HiveResult<InitializeResult> {
        if self.active_count() >= self.max_sessions {
            return Err(HiveError::capacity("session limit reached").with_code("session_pool"));
        }
        if protocol_version.is_empty() {
            return Err(HiveError::validation("protocolVersion is required"));
        }

        let mut server_capabilities: BTreeSet<String> = client_capabilities
            .intersection(&self.server_features)
            .cloned()
            .collect();
        server_capabilities.extend(self.mandatory_features.iter().cloned());

        let now = self.clock.now();
        let session = McpSession {
            session_id: Uuid::new_v4().to_string(),
            client_info,
            protocol_version: protocol_version.to_string(),
            client_capabilities,
            server_capabilities: server_capabilities.clone(),
            is_active: true,
            created_at: now,
            last_activity: now,
            expires_at: Some(
                now + ChronoDuration::from_std(self.idle_timeout).unwrap_or_default(),
            ),
            closed_at: None,
        };

        tracing::info!(
            session_id = %session.session_id,
            client = %session.client_info.name,
            "MCP session created"
        );
        let result = InitializeResult {
            session_id: session.session_id.clone(),
            protocol_version: mcp::PROTOCOL_VERSION.to_string(),
            server_name: mcp::SERVER_NAME.to_string(),
            server_version: mcp::SERVER_VERSION.to_string(),
            server_capabilities,
        };
        self.sessions.insert(session.session_id.clone(), session);
        Ok(result)
    }

    /// Refresh last-activity for a session.
    pub fn touch(&self, session_id: &str) -> HiveResult<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| HiveError::not_found(format!("MCP session '{}'", session_id)))?;
        if !session.is_active {
            return Err(HiveError::conflict("session is already closed"));
        }
        let now = self.clock.now();
        session.last_activity = now;
        session.expires_at =
            Some(now + ChronoDuration::from_std(self.idle_timeout).unwrap_or_default());
        Ok(())
    }

    /// Mark a session inactive.
    pub fn close(&self, session_id: &str) -> HiveResult<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| HiveError::not_found(format!("MCP session '{}'", session_id)))?;
        if session.is_active {
            session.is_active = false;
            session.closed_at = Some(self.clock.now());
            tracing::info!(session_id, "MCP session closed");
        }
        Ok(())
    }

    /// Session snapshot.
    pub fn get(&self, session_id: &str) -> Option<McpSession> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Active session count.
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_active).count()
    }

    /// Close sessions idle past the timeout. Returns how many were
    /// closed. Run periodically by the owner.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut closed = 0;
        for mut entry in self.sessions.iter_mut() {
            if entry.is_active {
                let idle = now - entry.last_activity;
                if idle.to_std().unwrap_or_default() > self.idle_timeout {
                    entry.is_active = false;
                    entry.closed_at = Some(now);
                    closed += 1;
                    tracing::info!(session_id = %entry.session_id, "MCP session expired");
                }
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{system_clock, Clock, ManualClock};
    use std::sync::Arc;

    fn caps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn client() -> ClientInfo {
        ClientInfo {
            name: "test-client".into(),
            version: "1.0".into(),
        }
    }

    #[test]
    fn test_create_negotiates_intersection_plus_mandatory() {
        let registry =
            McpSessionRegistry::new(Duration::from_secs(1800), 10, system_clock());
        let result = registry
            .create(client(), "2025-03-26", caps(&["tools", "nonsense", "streaming"]))
            .unwrap();

        assert!(result.server_capabilities.contains("tools"));
        assert!(result.server_capabilities.contains("streaming"));
        assert!(!result.server_capabilities.contains("nonsense"));
        // Mandatory features always granted.
        assert!(result.server_capabilities.contains("ping"));
        assert!(result.server_capabilities.contains("logging"));
        assert_eq!(result.protocol_version, "2025-03-26");
        assert!(Uuid::parse_str(&result.session_id).is_ok());
    }

    #[test]
    fn test_touch_extends_expiry() {
        let clock = Arc::new(ManualClock::default());
        let registry = McpSessionRegistry::new(Duration::from_secs(600), 10, clock.clone());
        let created = registry.create(client(), "2025-03-26", caps(&[])).unwrap();

        clock.advance(Duration::from_secs(500));
        registry.touch(&created.session_id).unwrap();
        let session = registry.get(&created.session_id).unwrap();
        assert!(session.expires_at.unwrap() > clock.now());
    }

    #[test]
    fn test_janitor_closes_idle_sessions() {
        let clock = Arc::new(ManualClock::default());
        let registry = McpSessionRegistry::new(Duration::from_secs(600), 10, clock.clone());
        let a = registry.create(client(), "2025-03-26", caps(&[])).unwrap();
        let b = registry.create(client(), "2025-03-26", caps(&[])).unwrap();

        clock.advance(Duration::from_secs(500));
        registry.touch(&b.session_id).unwrap();
        clock.advance(Duration::from_secs(200));

        assert_eq!(registry.sweep_expired(), 1);
        assert!(!registry.get(&a.session_id).unwrap().is_active);
        assert!(registry.get(&b.session_id).unwrap().is_active);
    }

    #[test]
    fn test_session_limit() {
        let registry = McpSessionRegistry::new(Duration::from_secs(600), 1, system_clock());
        registry.create(client(), "2025-03-26", caps(&[])).unwrap();
        let err = registry.create(client(), "2025-03-26", caps(&[])).unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::Capacity);
    }

    #[test]
    fn test_close_is_idempotent_and_touch_rejects_closed() {
        let registry = McpSessionRegistry::new(Duration::from_secs(600), 10, system_clock());
        let created = registry.create(client(), "2025-03-26", caps(&[])).unwrap();

        registry.close(&created.session_id).unwrap();
        registry.close(&created.session_id).unwrap();
        let err = registry.touch(&created.session_id).unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::Conflict);
    }

    #[test]
    fn test_missing_protocol_version_rejected() {
        let registry = McpSessionRegistry::new(Duration::from_secs(600), 10, system_clock());
        let err = registry.create(client(), "", caps(&[])).unwrap_err();
        assert_eq!(err.kind, hive_core::ErrorKind::Validation);
    }
}
