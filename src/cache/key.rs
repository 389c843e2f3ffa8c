use std::fmt;

use crate::daemon::DaemonError;

const ROLE_SEPARATOR: &str = ":role.";

/// Cache slot identity for one (domain, role) target.
///
/// The whole tuple is the identity: two keys differing only in an expiry
/// bound are distinct slots. Access token keys carry `max_expiry`, role
/// token keys carry `min_expiry`; the other bound stays `None` and is never
/// consulted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub domain: String,
    pub role: String,
    pub min_expiry: Option<i64>,
    pub max_expiry: Option<i64>,
}

impl CacheKey {
    pub fn access_token(domain: &str, role: &str, expiry_seconds: i64) -> Self {
        Self {
            domain: domain.to_owned(),
            role: role.to_owned(),
            min_expiry: None,
            max_expiry: Some(expiry_seconds),
        }
    }

    pub fn role_token(domain: &str, role: &str, expiry_seconds: i64) -> Self {
        Self {
            domain: domain.to_owned(),
            role: role.to_owned(),
            min_expiry: Some(expiry_seconds),
            max_expiry: None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.domain, ROLE_SEPARATOR, self.role)
    }
}

/// Split `domain:role.role` into its parts.
pub fn split_role_name(role_name: &str) -> Result<(String, String), DaemonError> {
    let trimmed = role_name.trim();
    let (domain, role) = trimmed
        .split_once(ROLE_SEPARATOR)
        .ok_or_else(|| DaemonError::Config(format!("invalid role name '{}': missing '{}'", trimmed, ROLE_SEPARATOR)))?;

    if domain.is_empty() || role.is_empty() {
        return Err(DaemonError::Config(format!("invalid role name '{}': empty domain or role", trimmed)));
    }
    Ok((domain.to_owned(), role.to_owned()))
}

/// Parse the comma separated target list. An empty list means no targets.
pub fn parse_targets(target_domain_roles: &str) -> Result<Vec<(String, String)>, DaemonError> {
    if target_domain_roles.trim().is_empty() {
        return Ok(Vec::new());
    }
    target_domain_roles.split(',').map(split_role_name).collect()
}
