use anyhow::{
    Error,
    Result,
};

use crate::decoupler::JoinPolicy;

/// Configuration for a [`DecoupledClient`][`crate::client::DecoupledClient`].
#[derive(Debug, Clone)]
pub struct DecoupledClientConfig {
    /// Name of the client, used for logging and for naming the event loop thread.
    pub name: String,
    /// Failed requests resolve to an error.
    ///
    /// If `false`, failed requests resolve to `None` and the failure is only logged.
    pub allow_exception: bool,
    /// How requests enqueued before the session joins are treated.
    pub join_policy: JoinPolicy,
}

impl DecoupledClientConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::msg("client name cannot be empty"));
        }
        if self.name.contains('\0') {
            return Err(Error::msg("client name cannot contain a null byte"));
        }
        Ok(())
    }
}

impl Default for DecoupledClientConfig {
    fn default() -> Self {
        Self {
            name: "wamp-decoupled-client".to_owned(),
            allow_exception: false,
            join_policy: JoinPolicy::default(),
        }
    }
}

#[cfg(test)]
mod config_test {
    use crate::client::DecoupledClientConfig;

    #[test]
    fn default_config_is_valid() {
        let config = DecoupledClientConfig::default();
        assert!(!config.allow_exception);
        assert_matches::assert_matches!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_invalid_names() {
        let mut config = DecoupledClientConfig::default();
        config.name = String::new();
        assert_matches::assert_matches!(config.validate(), Err(err) => {
            assert!(err.to_string().contains("empty"));
        });
        config.name = "client\0".to_owned();
        assert_matches::assert_matches!(config.validate(), Err(_));
    }
}
