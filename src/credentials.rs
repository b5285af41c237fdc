//! Bearer token supply for the indexing service.
//!
//! The `Authorization` header is always sent. Where the token comes from is
//! pluggable: [`EnvToken`] reads an environment variable (an unset variable
//! yields an empty token), [`StaticToken`] wraps a fixed value.

pub trait TokenProvider: Send + Sync {
    /// Token to place after `Bearer `. May be empty.
    fn token(&self) -> String;
}

pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn token(&self) -> String {
        self.0.clone()
    }
}

/// Reads the token from an environment variable on every request.
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl TokenProvider for EnvToken {
    fn token(&self) -> String {
        std::env::var(&self.var).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_env_gives_empty_token() {
        let provider = EnvToken::new("INDEX_SYNC_TEST_TOKEN_THAT_IS_NEVER_SET");
        assert_eq!(provider.token(), "");
    }

    #[test]
    fn static_token_is_returned_verbatim() {
        assert_eq!(StaticToken("abc".into()).token(), "abc");
    }
}
