//! Target repository entity.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Identity of a repository record.
///
/// The same upstream project under different fork configurations yields
/// distinct identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub name: String,
    pub fork_mode: bool,
    pub fork_owner: Option<String>,
    pub fork_org: Option<String>,
}

impl RepositoryIdentity {
    /// Identity of a repository worked on directly, without a fork.
    pub fn upstream(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            fork_mode: false,
            fork_owner: None,
            fork_org: None,
        }
    }

    /// Stable key derived from the identity tuple, used to name the workspace.
    pub fn workspace_key(&self) -> String {
        let key = format!(
            "{}/{}/{}/{}/{}",
            self.owner,
            self.name,
            self.fork_mode,
            self.fork_owner.as_deref().unwrap_or(""),
            self.fork_org.as_deref().unwrap_or("")
        );
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
    }
}

/// A code repository that improvement jobs target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub fork_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fork_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fork_org: Option<String>,
    /// Local workspace the repository is checked out into.
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// Creates a repository record whose workspace lives under `workspace_root`.
    pub fn new(identity: RepositoryIdentity, workspace_root: &Path) -> Self {
        let now = Utc::now();
        let path = workspace_root
            .join(identity.workspace_key())
            .join(&identity.name);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: identity.owner,
            name: identity.name,
            fork_mode: identity.fork_mode,
            fork_owner: identity.fork_owner,
            fork_org: identity.fork_org,
            path,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identity(&self) -> RepositoryIdentity {
        RepositoryIdentity {
            owner: self.owner.clone(),
            name: self.name.clone(),
            fork_mode: self.fork_mode,
            fork_owner: self.fork_owner.clone(),
            fork_org: self.fork_org.clone(),
        }
    }

    /// Owner the worker should push to: the fork target in fork mode,
    /// otherwise the upstream owner. An organization wins over a user.
    pub fn effective_owner(&self) -> &str {
        if !self.fork_mode {
            return &self.owner;
        }
        self.fork_org
            .as_deref()
            .or(self.fork_owner.as_deref())
            .unwrap_or(&self.owner)
    }

    /// Marks the record as re-resolved.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forked(owner: Option<&str>, org: Option<&str>) -> RepositoryIdentity {
        RepositoryIdentity {
            owner: "acme".to_string(),
            name: "widgets".to_string(),
            fork_mode: true,
            fork_owner: owner.map(String::from),
            fork_org: org.map(String::from),
        }
    }

    #[test]
    fn test_effective_owner_without_fork_mode() {
        let repo = Repository::new(RepositoryIdentity::upstream("acme", "widgets"), Path::new("/ws"));
        assert_eq!(repo.effective_owner(), "acme");
    }

    #[test]
    fn test_effective_owner_prefers_org() {
        let repo = Repository::new(forked(Some("bot"), Some("mirror-org")), Path::new("/ws"));
        assert_eq!(repo.effective_owner(), "mirror-org");

        let repo = Repository::new(forked(Some("bot"), None), Path::new("/ws"));
        assert_eq!(repo.effective_owner(), "bot");

        let repo = Repository::new(forked(None, None), Path::new("/ws"));
        assert_eq!(repo.effective_owner(), "acme");
    }

    #[test]
    fn test_workspace_path_differs_per_fork_configuration() {
        let upstream = Repository::new(RepositoryIdentity::upstream("acme", "widgets"), Path::new("/ws"));
        let fork = Repository::new(forked(Some("bot"), None), Path::new("/ws"));

        assert_ne!(upstream.path, fork.path);
        assert!(upstream.path.starts_with("/ws"));
        assert!(upstream.path.ends_with("widgets"));
    }

    #[test]
    fn test_workspace_key_is_stable() {
        let a = RepositoryIdentity::upstream("acme", "widgets");
        let b = RepositoryIdentity::upstream("acme", "widgets");
        assert_eq!(a.workspace_key(), b.workspace_key());
    }

    #[test]
    fn test_identity_round_trip_and_touch() {
        let identity = forked(None, Some("org"));
        let mut repo = Repository::new(identity.clone(), Path::new("/ws"));
        assert_eq!(repo.identity(), identity);

        let before = repo.updated_at;
        repo.touch();
        assert!(repo.updated_at >= before);
        assert_eq!(repo.created_at, before);
    }
}
