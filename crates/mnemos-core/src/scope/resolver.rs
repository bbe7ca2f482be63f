//! Scope-to-dataset resolution.
//!
//! Naming convention: `{user}-private`, `{user}-profile`, `project-{id}`,
//! `team-shared`, `team-proposed`. Personal-private is only ever selected for
//! direct (non-group) sessions.

use serde::{Deserialize, Serialize};

use super::{ScopeContext, ScopeTier};

pub const TEAM_SHARED: &str = "team-shared";
pub const TEAM_PROPOSED: &str = "team-proposed";
const PROJECT_PREFIX: &str = "project-";
const PRIVATE_SUFFIX: &str = "-private";
const PROFILE_SUFFIX: &str = "-profile";

/// Canonical dataset names for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDatasets {
    pub personal_private: String,
    pub personal_profile: String,
    pub project: Option<String>,
    pub team_shared: String,
    pub team_proposed: String,
}

/// Which tier a dataset belongs to and whether it is private to one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSource {
    pub tier: ScopeTier,
    pub is_private: bool,
}

pub fn resolve_datasets(scope: &ScopeContext) -> ResolvedDatasets {
    ResolvedDatasets {
        personal_private: format!("{}{PRIVATE_SUFFIX}", scope.user_id),
        personal_profile: format!("{}{PROFILE_SUFFIX}", scope.user_id),
        project: scope.project_ref().map(|p| format!("{PROJECT_PREFIX}{p}")),
        team_shared: TEAM_SHARED.to_string(),
        team_proposed: TEAM_PROPOSED.to_string(),
    }
}

/// Dataset names a recall in `scope` may search, in priority order.
pub fn resolve_recall_datasets(scope: &ScopeContext) -> Vec<String> {
    let resolved = resolve_datasets(scope);
    let mut names = Vec::with_capacity(4);
    if !scope.is_group_session {
        names.push(resolved.personal_private);
    }
    names.push(resolved.personal_profile);
    match scope.tier {
        ScopeTier::Personal => {}
        ScopeTier::Project => {
            names.extend(resolved.project);
            names.push(resolved.team_shared);
        }
        ScopeTier::Team => names.push(resolved.team_shared),
    }
    names
}

/// Dataset a write in `scope` lands in. Team writes are staged in
/// `team-proposed`, never written to `team-shared` directly.
pub fn resolve_write_dataset(scope: &ScopeContext) -> String {
    let resolved = resolve_datasets(scope);
    match scope.tier {
        ScopeTier::Personal => resolved.personal_private,
        ScopeTier::Project => resolved.project.unwrap_or(resolved.personal_private),
        ScopeTier::Team => resolved.team_proposed,
    }
}

/// Classify a dataset name. Unrecognised names are treated as personal-private.
pub fn classify_dataset(name: &str, user_id: &str) -> DatasetSource {
    const PRIVATE: DatasetSource = DatasetSource {
        tier: ScopeTier::Personal,
        is_private: true,
    };
    if name == TEAM_SHARED || name == TEAM_PROPOSED {
        return DatasetSource {
            tier: ScopeTier::Team,
            is_private: false,
        };
    }
    if name
        .strip_prefix(PROJECT_PREFIX)
        .is_some_and(|id| !id.is_empty())
    {
        return DatasetSource {
            tier: ScopeTier::Project,
            is_private: false,
        };
    }
    if name
        .strip_suffix(PROFILE_SUFFIX)
        .is_some_and(|owner| !owner.is_empty())
    {
        return DatasetSource {
            tier: ScopeTier::Personal,
            is_private: false,
        };
    }
    if name != format!("{user_id}{PRIVATE_SUFFIX}") {
        tracing::debug!(dataset = %name, "unrecognised dataset name, treating as private");
    }
    PRIVATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recall_table() {
        let cases = [
            (ScopeContext::personal("u"), vec!["u-private", "u-profile"]),
            (
                ScopeContext::project("u", "webapp"),
                vec!["u-private", "u-profile", "project-webapp", "team-shared"],
            ),
            (
                ScopeContext::team("u"),
                vec!["u-private", "u-profile", "team-shared"],
            ),
            (ScopeContext::personal("u").in_group(), vec!["u-profile"]),
            (
                ScopeContext::project("u", "webapp").in_group(),
                vec!["u-profile", "project-webapp", "team-shared"],
            ),
            (
                ScopeContext::team("u").in_group(),
                vec!["u-profile", "team-shared"],
            ),
        ];
        for (scope, expected) in cases {
            assert_eq!(resolve_recall_datasets(&scope), expected, "{scope:?}");
        }
    }

    #[test]
    fn test_group_sessions_never_touch_private() {
        for scope in [
            ScopeContext::personal("alice").in_group(),
            ScopeContext::project("alice", "x").in_group(),
            ScopeContext::team("alice").in_group(),
        ] {
            assert!(!resolve_recall_datasets(&scope).contains(&"alice-private".to_string()));
        }
    }

    #[test]
    fn test_project_scope_without_project_skips_it() {
        let mut scope = ScopeContext::project("u", "  ");
        assert_eq!(
            resolve_recall_datasets(&scope),
            vec!["u-private", "u-profile", "team-shared"]
        );
        scope.project = None;
        assert_eq!(resolve_write_dataset(&scope), "u-private");
    }

    #[test]
    fn test_write_targets() {
        assert_eq!(resolve_write_dataset(&ScopeContext::personal("u")), "u-private");
        assert_eq!(
            resolve_write_dataset(&ScopeContext::project("u", "webapp")),
            "project-webapp"
        );
        assert_eq!(resolve_write_dataset(&ScopeContext::team("u")), "team-proposed");
    }

    #[test]
    fn test_classify_dataset() {
        let shared = classify_dataset("team-shared", "alice");
        assert_eq!(shared.tier, ScopeTier::Team);
        assert!(!shared.is_private);
        assert!(!classify_dataset("project-webapp", "alice").is_private);
        assert!(!classify_dataset("alice-profile", "alice").is_private);
        assert!(classify_dataset("alice-private", "alice").is_private);
        assert!(classify_dataset("bob-private", "alice").is_private);
        assert!(classify_dataset("mystery", "alice").is_private);
        assert!(classify_dataset("project-", "alice").is_private);
    }
}
