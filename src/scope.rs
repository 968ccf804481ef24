//! Scope — the tuple that qualifies every memory record and operation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `(tenant, user, agent?, session?, project?)` — see `spec.md` §3.
///
/// All reads and writes are scope-qualified; cross-scope leakage is
/// forbidden. Two scopes are equal iff every field matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub tenant: String,
    pub user: String,
    pub agent: Option<String>,
    pub session: Option<String>,
    pub project: Option<String>,
}

impl Scope {
    pub fn new(tenant: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            user: user.into(),
            agent: None,
            session: None,
            project: None,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// A scope is complete enough to write/read against once tenant and user
    /// are both non-empty; the optional fields narrow it further.
    pub fn is_complete(&self) -> bool {
        !self.tenant.trim().is_empty() && !self.user.trim().is_empty()
    }

    /// Canonical, order-stable string used as input to fingerprinting and
    /// cache/lock key derivation (`spec.md` §4.2).
    pub fn canonical(&self) -> String {
        format!(
            "{}\u{1}{}\u{1}{}\u{1}{}\u{1}{}",
            self.tenant,
            self.user,
            self.agent.as_deref().unwrap_or(""),
            self.session.as_deref().unwrap_or(""),
            self.project.as_deref().unwrap_or(""),
        )
    }

    /// Stable hash of the canonical scope, used in cache/lock keys so raw
    /// tenant/user/session identifiers never leak into key strings.
    pub fn hash(&self) -> ScopeHash {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        ScopeHash(format!("{:x}", hasher.finalize())[..16].to_string())
    }
}

/// Truncated, display-safe digest of a [`Scope`]'s canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeHash(pub String);

impl std::fmt::Display for ScopeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
