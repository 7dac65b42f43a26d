use std::fmt;

/// Why an upstream attempt did not produce a usable response.
///
/// None of these reach the client directly; they drive the choice of the
/// next backend inside the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 401: the credential is gone for good.
    CredentialExpired,
    /// 418 / 429.
    RateLimited,
    /// 402 / 403 / 422 and any other non-2xx below 500.
    Rejected,
    /// 5xx: the address itself is suspect.
    UpstreamFault,
    /// No response at all (connect error, reset, timeout).
    NetworkFailure,
}

impl FailureKind {
    /// Classify a response status. `None` means success.
    pub fn classify(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(FailureKind::CredentialExpired),
            418 | 429 => Some(FailureKind::RateLimited),
            500.. => Some(FailureKind::UpstreamFault),
            _ => Some(FailureKind::Rejected),
        }
    }

    /// Strict failures exclude every backend on the same address from the
    /// next pick, not just the same credential.
    pub fn strict(self) -> bool {
        matches!(self, FailureKind::UpstreamFault)
    }

    pub fn expires_credential(self) -> bool {
        matches!(self, FailureKind::CredentialExpired)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::CredentialExpired => "credential_expired",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Rejected => "rejected",
            FailureKind::UpstreamFault => "upstream_fault",
            FailureKind::NetworkFailure => "network_failure",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses() {
        assert_eq!(FailureKind::classify(200), None);
        assert_eq!(FailureKind::classify(201), None);
        assert_eq!(FailureKind::classify(299), None);
    }

    #[test]
    fn test_credential_expired() {
        let kind = FailureKind::classify(401).unwrap();
        assert_eq!(kind, FailureKind::CredentialExpired);
        assert!(kind.expires_credential());
        assert!(!kind.strict());
    }

    #[test]
    fn test_rate_limited() {
        assert_eq!(FailureKind::classify(418), Some(FailureKind::RateLimited));
        assert_eq!(FailureKind::classify(429), Some(FailureKind::RateLimited));
        assert!(!FailureKind::RateLimited.strict());
    }

    #[test]
    fn test_switch_statuses_are_not_strict() {
        for status in [402, 403, 422, 400, 404, 302] {
            let kind = FailureKind::classify(status).unwrap();
            assert_eq!(kind, FailureKind::Rejected, "status {}", status);
            assert!(!kind.strict());
        }
    }

    #[test]
    fn test_server_errors_are_strict() {
        for status in [500, 502, 503, 504, 599] {
            let kind = FailureKind::classify(status).unwrap();
            assert_eq!(kind, FailureKind::UpstreamFault);
            assert!(kind.strict());
        }
    }

    #[test]
    fn test_network_failure_is_not_strict() {
        assert!(!FailureKind::NetworkFailure.strict());
        assert!(!FailureKind::NetworkFailure.expires_credential());
    }

    #[test]
    fn test_display() {
        assert_eq!(FailureKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(FailureKind::UpstreamFault.to_string(), "upstream_fault");
    }
}
