//! Scope contexts and the dataset partition they map onto.
//!
//! Three visibility tiers (personal, project, team) each own one or more
//! named backend datasets. [`resolver`] decides which names a session may
//! read or write before any query is issued; [`privacy`] re-checks results
//! after retrieval.

pub mod privacy;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use privacy::filter_results;
pub use resolver::{
    classify_dataset, resolve_datasets, resolve_recall_datasets, resolve_write_dataset,
    DatasetSource, ResolvedDatasets, TEAM_PROPOSED, TEAM_SHARED,
};

/// Visibility level of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScopeTier {
    #[default]
    Personal,
    Project,
    Team,
}

impl std::fmt::Display for ScopeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Personal => write!(f, "personal"),
            Self::Project => write!(f, "project"),
            Self::Team => write!(f, "team"),
        }
    }
}

/// Who is asking, and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeContext {
    pub tier: ScopeTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub is_group_session: bool,
}

impl ScopeContext {
    pub fn personal(user_id: impl Into<String>) -> Self {
        Self {
            tier: ScopeTier::Personal,
            project: None,
            user_id: user_id.into(),
            is_group_session: false,
        }
    }

    pub fn project(user_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            tier: ScopeTier::Project,
            project: Some(project.into()),
            ..Self::personal(user_id)
        }
    }

    pub fn team(user_id: impl Into<String>) -> Self {
        Self {
            tier: ScopeTier::Team,
            ..Self::personal(user_id)
        }
    }

    pub fn in_group(mut self) -> Self {
        self.is_group_session = true;
        self
    }

    /// Project reference, ignoring blank strings.
    pub fn project_ref(&self) -> Option<&str> {
        self.project.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}
