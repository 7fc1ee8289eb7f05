//! Subscription conditions: which event (or combination of events) a
//! listener waits for.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};

/// How a subscription's watched events combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Exactly one event; fires when it is emitted.
    Single,
    /// Fires once at least one of the watched events has fired.
    Any,
    /// Fires once every watched event has fired.
    All,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Any => write!(f, "any"),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for ConditionKind {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            other => Err(PluginError::UnknownCondition {
                kind: other.to_string(),
            }),
        }
    }
}

/// A subscription condition as supplied by a plugin.
///
/// Construction does not validate; [`EventBus::subscribe`](super::EventBus::subscribe)
/// does, so a malformed condition fails only the subscribing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// How the watched events combine.
    pub kind: ConditionKind,
    /// Watched event names.
    pub events: Vec<String>,
}

impl Condition {
    /// Wait for one event.
    pub fn single(event: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Single,
            events: vec![event.into()],
        }
    }

    /// Wait for the first of several events.
    pub fn any<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ConditionKind::Any,
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Wait until every one of several events has fired.
    pub fn all<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: ConditionKind::All,
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a condition from a textual kind, e.g. one read from a manifest.
    pub fn parse<I, S>(kind: &str, events: I) -> PluginResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            kind: kind.parse()?,
            events: events.into_iter().map(Into::into).collect(),
        })
    }

    /// Check the condition is well formed for its kind.
    pub fn validate(&self) -> PluginResult<()> {
        match self.kind {
            ConditionKind::Single if self.events.len() != 1 => Err(PluginError::invalid_condition(
                self.kind,
                &self.events,
                format!("expected exactly one event, got {}", self.events.len()),
            )),
            ConditionKind::Any | ConditionKind::All if self.events.is_empty() => Err(
                PluginError::invalid_condition(self.kind, &self.events, "no events to watch"),
            ),
            _ => Ok(()),
        }
    }

    /// Sorted, deduplicated event set. Together with the kind this is the
    /// trigger's key.
    pub fn event_set(&self) -> BTreeSet<String> {
        self.events.iter().cloned().collect()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.events.join(", "))
    }
}

/// Whether an `any`/`all` event set holds against the fired events.
pub(crate) fn holds(kind: ConditionKind, events: &BTreeSet<String>, fired: &HashSet<String>) -> bool {
    match kind {
        ConditionKind::Single | ConditionKind::Any => events.iter().any(|e| fired.contains(e)),
        ConditionKind::All => events.iter().all(|e| fired.contains(e)),
    }
}
