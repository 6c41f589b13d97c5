//! Core data types shared across the engine, the mapping layer and the resolver.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Attribute map of one element.
///
/// Keys are unique; a duplicate attribute overwrites the earlier value.
pub type Attributes = BTreeMap<String, String>;

static NEXT_RESOLUTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one resolution (one root and its own parse pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResolutionId(u64);

impl ResolutionId {
    /// Allocate a fresh, process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_RESOLUTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Use a caller-chosen identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a chain node refers to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// The reference is informational; nothing is fetched.
    #[default]
    Direct,
    /// The reference points at another response that must be resolved.
    Chained,
}

impl ReferenceKind {
    /// Classify a `type` attribute value.
    ///
    /// # Examples
    /// ```
    /// use xmlchain::types::ReferenceKind;
    ///
    /// assert_eq!(ReferenceKind::from_type_attr("Chained"), ReferenceKind::Chained);
    /// assert_eq!(ReferenceKind::from_type_attr("wrapper"), ReferenceKind::Chained);
    /// assert_eq!(ReferenceKind::from_type_attr("inline"), ReferenceKind::Direct);
    /// ```
    #[must_use]
    pub fn from_type_attr(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "chained" | "wrapper" => Self::Chained,
            _ => Self::Direct,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Chained => "chained",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the chain resolution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    #[default]
    Idle,
    FetchingReference,
    Parsing,
    HasChains,
    NoChains,
    Failed,
    Resolved,
}

impl ResolutionState {
    /// Whether the machine may move from `self` to `next`.
    ///
    /// `Resolved` is terminal: nothing leaves it.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ResolutionState::*;
        matches!(
            (self, next),
            (Idle, FetchingReference)
                | (Idle, Parsing)
                | (Idle, Failed)
                | (FetchingReference, Parsing)
                | (FetchingReference, Failed)
                | (Parsing, HasChains)
                | (Parsing, NoChains)
                | (Parsing, Failed)
                | (HasChains, Resolved)
                | (NoChains, Resolved)
                | (Failed, Resolved)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Resolved
    }
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FetchingReference => "fetching_reference",
            Self::Parsing => "parsing",
            Self::HasChains => "has_chains",
            Self::NoChains => "no_chains",
            Self::Failed => "failed",
            Self::Resolved => "resolved",
        };
        f.write_str(name)
    }
}
