use std::fmt;

/// Capability set shared by every cached credential. Tokens are opaque
/// snapshots: a refresh produces a new value, never an in-place mutation.
pub trait Token: Clone + Default + Send + Sync + 'static {
    const KIND: TokenKind;

    fn domain(&self) -> &str;
    fn role(&self) -> &str;
    fn raw(&self) -> &[u8];
    /// UNIX TIMESTAMP
    fn expiry(&self) -> i64;

    /// Placeholder entries are stored before the first fetch.
    fn is_placeholder(&self) -> bool {
        self.raw().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    AccessToken,
    RoleToken,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            TokenKind::AccessToken => "accesstoken",
            TokenKind::RoleToken => "roletoken",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessToken {
    pub domain: String,
    pub role: String,
    pub raw: Vec<u8>,
    pub scope: String,
    pub expiry: i64,
}

impl AccessToken {
    pub fn new(domain: String, role: String, raw: Vec<u8>, scope: String, expiry: i64) -> Self {
        Self { domain, role, raw, scope, expiry }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Token for AccessToken {
    const KIND: TokenKind = TokenKind::AccessToken;

    fn domain(&self) -> &str {
        &self.domain
    }
    fn role(&self) -> &str {
        &self.role
    }
    fn raw(&self) -> &[u8] {
        &self.raw
    }
    fn expiry(&self) -> i64 {
        self.expiry
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleToken {
    pub domain: String,
    pub role: String,
    pub raw: Vec<u8>,
    pub expiry: i64,
}

impl RoleToken {
    pub fn new(domain: String, role: String, raw: Vec<u8>, expiry: i64) -> Self {
        Self { domain, role, raw, expiry }
    }
}

impl Token for RoleToken {
    const KIND: TokenKind = TokenKind::RoleToken;

    fn domain(&self) -> &str {
        &self.domain
    }
    fn role(&self) -> &str {
        &self.role
    }
    fn raw(&self) -> &[u8] {
        &self.raw
    }
    fn expiry(&self) -> i64 {
        self.expiry
    }
}
