use reqwest::Url;
use std::fmt;

/// Identity of a backend for quarantine bookkeeping: two descriptors with the
/// same address and credential are the same backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendId {
    pub address: Url,
    pub credential: String,
}

/// One upstream endpoint and credential pairing. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    id: BackendId,
    target_model: String,
    priority: i64,
    stream_capable: bool,
    unstable: bool,
}

impl BackendDescriptor {
    pub fn new(address: Url, credential: impl Into<String>, target_model: impl Into<String>) -> Self {
        Self {
            id: BackendId {
                address,
                credential: credential.into(),
            },
            target_model: target_model.into(),
            priority: -1,
            stream_capable: true,
            unstable: false,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_stream_capable(mut self, stream_capable: bool) -> Self {
        self.stream_capable = stream_capable;
        self
    }

    pub fn with_unstable(mut self, unstable: bool) -> Self {
        self.unstable = unstable;
        self
    }

    pub fn id(&self) -> &BackendId {
        &self.id
    }

    pub fn address(&self) -> &Url {
        &self.id.address
    }

    pub fn credential(&self) -> &str {
        &self.id.credential
    }

    pub fn target_model(&self) -> &str {
        &self.target_model
    }

    /// Configured priority; zero or negative means "use the pool default".
    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn stream_capable(&self) -> bool {
        self.stream_capable
    }

    pub fn unstable(&self) -> bool {
        self.unstable
    }

    /// Same backend under the given rule: `address_only` ignores the
    /// credential.
    pub fn matches(&self, other: &BackendDescriptor, address_only: bool) -> bool {
        self.id.address == other.id.address
            && (address_only || self.id.credential == other.id.credential)
    }
}

/// Masks a credential down to its first and last four characters for logs.
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id.address, mask_credential(&self.id.credential))
    }
}
