//! GitHub repository URL handling.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static RE_HTTPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/([\w.-]+)/([\w.-]+?)(?:\.git)?/?$").unwrap()
});
static RE_SSH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^git@github\.com:/?([\w.-]+)/([\w.-]+?)(?:\.git)?$").unwrap());

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Not a GitHub repository URL: {0}")]
pub struct InvalidUrl(pub String);

/// Owner and name of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn https_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    pub fn ssh_url(&self) -> String {
        format!("git@github.com:{}/{}.git", self.owner, self.name)
    }
}

/// Parses `https://github.com/<owner>/<repo>[.git]` or
/// `git@github.com:<owner>/<repo>[.git]`.
pub fn parse_repository_url(url: &str) -> Result<RepoRef, InvalidUrl> {
    let url = url.trim();
    let caps = RE_HTTPS
        .captures(url)
        .or_else(|| RE_SSH.captures(url))
        .ok_or_else(|| InvalidUrl(url.to_string()))?;

    let owner = caps[1].to_string();
    let name = caps[2].to_string();
    if name.is_empty() || name == "." || name == ".." {
        return Err(InvalidUrl(url.to_string()));
    }
    Ok(RepoRef { owner, name })
}
