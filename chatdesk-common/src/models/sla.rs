// File: chatdesk-common/src/models/sla.rs

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope key under which the global policy is persisted.
pub const GLOBAL_SCOPE: &str = "*";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BreachType {
    FirstResponse,
    Resolution,
}

impl fmt::Display for BreachType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreachType::FirstResponse => write!(f, "first_response"),
            BreachType::Resolution => write!(f, "resolution"),
        }
    }
}

impl FromStr for BreachType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first_response" => Ok(BreachType::FirstResponse),
            "resolution" => Ok(BreachType::Resolution),
            _ => Err(format!("Unknown breach type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlaPolicy {
    /// `None` for the global policy.
    pub category: Option<String>,
    pub first_response_threshold: Duration,
    pub resolution_threshold: Duration,
}

impl SlaPolicy {
    pub fn global(first_response_threshold: Duration, resolution_threshold: Duration) -> Self {
        Self {
            category: None,
            first_response_threshold,
            resolution_threshold,
        }
    }

    pub fn for_category(
        category: &str,
        first_response_threshold: Duration,
        resolution_threshold: Duration,
    ) -> Self {
        Self {
            category: Some(category.to_string()),
            first_response_threshold,
            resolution_threshold,
        }
    }

    pub fn scope(&self) -> &str {
        self.category.as_deref().unwrap_or(GLOBAL_SCOPE)
    }
}

/// All configured policies: per-category overrides with a global fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlaPolicySet {
    pub global: Option<SlaPolicy>,
    pub by_category: HashMap<String, SlaPolicy>,
}

impl SlaPolicySet {
    pub fn from_policies(policies: impl IntoIterator<Item = SlaPolicy>) -> Self {
        let mut set = Self::default();
        for policy in policies {
            set.insert(policy);
        }
        set
    }

    pub fn with_global(policy: SlaPolicy) -> Self {
        Self::from_policies([SlaPolicy { category: None, ..policy }])
    }

    pub fn insert(&mut self, policy: SlaPolicy) {
        match policy.category.clone() {
            Some(category) => {
                self.by_category.insert(category, policy);
            }
            None => self.global = Some(policy),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.by_category.is_empty()
    }

    pub fn policy_for(&self, category: Option<&str>) -> Option<&SlaPolicy> {
        category
            .and_then(|c| self.by_category.get(c))
            .or(self.global.as_ref())
    }
}

/// One detected SLA breach. At most one exists per `(chat_id, breach_type)`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SlaBreachEvent {
    pub chat_id: Uuid,
    pub breach_type: BreachType,
    pub detected_at: DateTime<Utc>,
    pub notified: bool,
}

impl SlaBreachEvent {
    pub fn new(chat_id: Uuid, breach_type: BreachType, detected_at: DateTime<Utc>) -> Self {
        Self {
            chat_id,
            breach_type,
            detected_at,
            notified: false,
        }
    }

    pub fn key(&self) -> (Uuid, BreachType) {
        (self.chat_id, self.breach_type)
    }
}
