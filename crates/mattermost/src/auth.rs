use secrecy::{ExposeSecret, SecretString};

use pollbot_core::config::MattermostConfig;

/// Slash-command tokens this service answers to.
///
/// An empty policy accepts every request, so a fresh install works before any token is
/// configured.
#[derive(Clone, Debug, Default)]
pub struct TokenPolicy {
    accepted: Vec<SecretString>,
}

impl TokenPolicy {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let accepted = tokens
            .into_iter()
            .map(Into::into)
            .filter(|token| !token.trim().is_empty())
            .map(SecretString::from)
            .collect();
        Self { accepted }
    }

    pub fn from_config(config: &MattermostConfig) -> Self {
        Self::new(config.exposed_tokens().map(str::to_owned))
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn permits(&self, presented: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }
        let Some(presented) = presented.map(str::trim) else {
            return false;
        };
        self.accepted.iter().any(|token| token.expose_secret() == presented)
    }
}

#[cfg(test)]
mod tests {
    use pollbot_core::config::MattermostConfig;
    use secrecy::SecretString;

    use super::TokenPolicy;

    #[test]
    fn empty_policy_accepts_anything() {
        let policy = TokenPolicy::accept_all();
        assert!(policy.permits(Some("abc123")));
        assert!(policy.permits(None));
    }

    #[test]
    fn any_configured_token_is_accepted() {
        let policy = TokenPolicy::new(["xyz321", "abc123"]);
        assert!(policy.permits(Some("abc123")));
        assert!(policy.permits(Some("xyz321")));
        assert!(!policy.permits(Some("abc321")));
        assert!(!policy.permits(None));
    }

    #[test]
    fn built_from_config_tokens() {
        let config = MattermostConfig { tokens: vec![SecretString::from("abc123".to_owned())] };
        let policy = TokenPolicy::from_config(&config);
        assert_eq!(policy.len(), 1);
        assert!(policy.permits(Some("abc123")));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let policy = TokenPolicy::new(["abc123"]);
        assert!(!format!("{policy:?}").contains("abc123"));
    }
}
