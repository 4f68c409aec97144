use std::fmt;
use subtle::ConstantTimeEq;

/// A credential that must never show up in logs or responses.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        SecretToken(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact comparison against a caller-supplied value, in constant time
    /// with respect to the contents.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.len() == candidate.len() && self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

impl fmt::Display for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// The two process-wide secrets. Loaded once at startup, read-only afterwards.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// Compared against the `Authorization` header of every request.
    pub deploy_token: SecretToken,
    /// Used both for fetching artifacts and for the registry login.
    pub access_token: SecretToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_secret_is_redacted_when_formatted() {
        let token = SecretToken::new("ghp_verysecret");
        assert_eq!(format!("{}", token), "***");
        assert_eq!(format!("{:?}", token), "SecretToken(***)");

        let credentials = Credentials {
            deploy_token: SecretToken::new("deploy-secret"),
            access_token: token,
        };
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("deploy-secret"));
        assert!(!debug.contains("ghp_verysecret"));
    }

    #[test]
    fn test_matches_is_exact() {
        let token = SecretToken::new("abc123");
        assert!(token.matches("abc123"));
        assert!(!token.matches("abc12"));
        assert!(!token.matches("abc1234"));
        assert!(!token.matches("ABC123"));
        assert!(!token.matches(""));
    }
}
