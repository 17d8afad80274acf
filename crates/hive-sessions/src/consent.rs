//! Consent and access decisions
//!
//! The decision contract only: an access check considers active grants
//! and policy auto-approval and returns Allow or Deny with a reason.
//! Grant CRUD lives with the outer persistence layer.

use chrono::{DateTime, Utc};
use hive_core::ClockRef;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An active permission grant for a subject on a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentGrant {
    pub subject_id: String,
    pub resource_type: String,
    pub resource_name: String,
    pub permissions: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentGrant {
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }

    fn covers(&self, resource_type: &str, resource_name: &str) -> bool {
        self.resource_type == resource_type
            && (self.resource_name == resource_name || self.resource_name == "*")
    }
}

/// Auto-approval rule: permissions granted to everyone for a resource
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoApproveRule {
    pub resource_type: String,
    pub permissions: BTreeSet<String>,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum AccessDecision {
    Allow { reason: String },
    Deny { reason: String },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow { .. })
    }
}

/// Policy engine over grants and auto-approval rules.
pub struct ConsentPolicy {
    grants: RwLock<Vec<ConsentGrant>>,
    auto_approve: Vec<AutoApproveRule>,
    clock: ClockRef,
}

impl ConsentPolicy {
    pub fn new(clock: ClockRef) -> Self {
        Self {
            grants: RwLock::new(Vec::new()),
            auto_approve: Vec::new(),
            clock,
        }
    }

    pub fn with_auto_approve(mut self, rules: Vec<AutoApproveRule>) -> Self {
        self.auto_approve = rules;
        self
    }

    /// Register a grant.
    pub fn add_grant(&self, grant: ConsentGrant) {
        self.grants.write().push(grant);
    }

    /// Drop expired grants. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut grants = self.grants.write();
        let before = grants.len();
        grants.retain(|g| g.is_active(now));
        before - grants.len()
    }

    /// Decide whether a subject may act on a resource with the given
    /// permissions.
    pub fn check_access(
        &self,
        subject_id: &str,
        resource_type: &str,
        resource_name: &str,
        required_permissions: &[String],
    ) -> AccessDecision {
        // Policy auto-approval first: no grant needed.
        if let Some(rule) = self
            .auto_approve
            .iter()
            .find(|r| r.resource_type == resource_type)
        {
            if required_permissions.iter().all(|p| rule.permissions.contains(p)) {
                return AccessDecision::Allow {
                    reason: format!("auto-approved for resource type '{}'", resource_type),
                };
            }
        }

        let now = self.clock.now();
        let grants = self.grants.read();
        let mut covered: BTreeSet<&str> = BTreeSet::new();
        for grant in grants
            .iter()
            .filter(|g| g.subject_id == subject_id)
            .filter(|g| g.is_active(now))
            .filter(|g| g.covers(resource_type, resource_name))
        {
            covered.extend(grant.permissions.iter().map(String::as_str));
        }

        let missing: Vec<&str> = required_permissions
            .iter()
            .map(String::as_str)
            .filter(|p| !covered.contains(p))
            .collect();

        if missing.is_empty() {
            AccessDecision::Allow {
                reason: format!(
                    "active grant covers {} on {}:{}",
                    required_permissions.join(","),
                    resource_type,
                    resource_name
                ),
            }
        } else {
            AccessDecision::Deny {
                reason: format!("missing permissions: {}", missing.join(", ")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{system_clock, Clock, ManualClock};
    use std::sync::Arc;
    use std::time::Duration;

    fn perms(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn required(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_grant_allows() {
        let policy = ConsentPolicy::new(system_clock());
        policy.add_grant(ConsentGrant {
            subject_id: "user-1".into(),
            resource_type: "graph".into(),
            resource_name: "session-1".into(),
            permissions: perms(&["read", "write"]),
            expires_at: None,
        });

        let decision = policy.check_access("user-1", "graph", "session-1", &required(&["read"]));
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_missing_permission_denies_with_reason() {
        let policy = ConsentPolicy::new(system_clock());
        policy.add_grant(ConsentGrant {
            subject_id: "user-1".into(),
            resource_type: "graph".into(),
            resource_name: "session-1".into(),
            permissions: perms(&["read"]),
            expires_at: None,
        });

        let decision =
            policy.check_access("user-1", "graph", "session-1", &required(&["read", "write"]));
        match decision {
            AccessDecision::Deny { reason } => assert!(reason.contains("write")),
            AccessDecision::Allow { .. } => panic!("must deny"),
        }
    }

    #[test]
    fn test_expired_grant_is_inactive() {
        let clock = Arc::new(ManualClock::default());
        let policy = ConsentPolicy::new(clock.clone());
        policy.add_grant(ConsentGrant {
            subject_id: "user-1".into(),
            resource_type: "graph".into(),
            resource_name: "session-1".into(),
            permissions: perms(&["read"]),
            expires_at: Some(clock.now() + chrono::Duration::seconds(60)),
        });

        assert!(policy
            .check_access("user-1", "graph", "session-1", &required(&["read"]))
            .is_allowed());

        clock.advance(Duration::from_secs(120));
        assert!(!policy
            .check_access("user-1", "graph", "session-1", &required(&["read"]))
            .is_allowed());
        assert_eq!(policy.sweep_expired(), 1);
    }

    #[test]
    fn test_auto_approval() {
        let policy = ConsentPolicy::new(system_clock()).with_auto_approve(vec![AutoApproveRule {
            resource_type: "models".into(),
            permissions: perms(&["list"]),
        }]);

        assert!(policy
            .check_access("anyone", "models", "registry", &required(&["list"]))
            .is_allowed());
        assert!(!policy
            .check_access("anyone", "models", "registry", &required(&["mutate"]))
            .is_allowed());
    }

    #[test]
    fn test_wildcard_resource_grant() {
        let policy = ConsentPolicy::new(system_clock());
        policy.add_grant(ConsentGrant {
            subject_id: "admin".into(),
            resource_type: "workflow".into(),
            resource_name: "*".into(),
            permissions: perms(&["execute"]),
            expires_at: None,
        });

        assert!(policy
            .check_access("admin", "workflow", "any-name", &required(&["execute"]))
            .is_allowed());
        assert!(!policy
            .check_access("other", "workflow", "any-name", &required(&["execute"]))
            .is_allowed());
    }

    #[test]
    fn test_permissions_accumulate_across_grants() {
        let policy = ConsentPolicy::new(system_clock());
        for perm in ["read", "write"] {
            policy.add_grant(ConsentGrant {
                subject_id: "user-1".into(),
                resource_type: "graph".into(),
                resource_name: "session-1".into(),
                permissions: perms(&[perm]),
                expires_at: None,
            });
        }

        assert!(policy
            .check_access("user-1", "graph", "session-1", &required(&["read", "write"]))
            .is_allowed());
    }
}
