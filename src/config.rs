use crate::core::net_config::{self, NetConfig, NetKind};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable \"{key}\"\n\tMessage: {message}")]
    Missing { key: String, message: String },
    #[error("Could not parse environment variable: {key}\n\tGot: {value}\n\tMessage: {message}")]
    Invalid {
        key: String,
        value: String,
        message: String,
    },
    #[error("Could not load net config from {path}\n\tMessage: {message}")]
    NetConfig { path: String, message: String },
}

pub trait Var {
    const NAME: &'static str;
    type Type;

    fn from_env() -> Result<Self::Type, ConfigError>;

    /// Like [`Var::from_env`], but an unset variable is `None` rather than an error.
    fn maybe_from_env() -> Result<Option<Self::Type>, ConfigError> {
        match std::env::var(Self::NAME) {
            Err(std::env::VarError::NotPresent) => Ok(None),
            _ => Self::from_env().map(Some),
        }
    }
}

fn read(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|err| ConfigError::Missing {
        key: key.to_string(),
        message: err.to_string(),
    })
}

pub struct NetConfigPath;
pub struct LogLevel;

impl Var for NetConfigPath {
    const NAME: &'static str = "DRIVENET_CONFIG";
    type Type = String;

    fn from_env() -> Result<String, ConfigError> {
        read(Self::NAME)
    }
}

impl Var for LogLevel {
    const NAME: &'static str = "DRIVENET_LOG_LEVEL";
    type Type = tracing::Level;

    fn from_env() -> Result<tracing::Level, ConfigError> {
        let level_str = read(Self::NAME)?;

        tracing::Level::from_str(&level_str).map_err(|err| ConfigError::Invalid {
            key: Self::NAME.to_string(),
            value: level_str,
            message: err.to_string(),
        })
    }
}

/// Settings read from the environment before the network is built.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub log_level: tracing::Level,
    /// Value of `DRIVENET_CONFIG`, loaded lazily by [`AppConfig::net_config`].
    pub net_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            net_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_level = LogLevel::maybe_from_env()?.unwrap_or(tracing::Level::INFO);
        let net_path = NetConfigPath::maybe_from_env()?;

        Ok(AppConfig {
            log_level,
            net_path,
        })
    }

    /// Load the net config from `cli_path`, else from `DRIVENET_CONFIG`, else the default.
    ///
    /// The environment path is never read when `cli_path` is given.
    pub fn net_config(&self, cli_path: Option<&str>) -> Result<NetConfig, ConfigError> {
        match cli_path.or(self.net_path.as_deref()) {
            Some(path) => NetConfig::load(path).map_err(|err| ConfigError::NetConfig {
                path: path.to_string(),
                message: err.to_string(),
            }),
            None => Ok(NetConfig::default()),
        }
    }
}

/// Command line values that take precedence over a loaded [`NetConfig`].
#[derive(Clone, Debug, Default)]
pub struct NetOverrides {
    pub kind: Option<NetKind>,
    pub n_frames: Option<usize>,
    pub n_steps: Option<usize>,
}

impl NetOverrides {
    pub fn apply(&self, base: NetConfig) -> Result<NetConfig, net_config::Error> {
        let mut config = base;
        if let Some(kind) = self.kind {
            config = config.with_kind(kind);
        }
        if let Some(n_frames) = self.n_frames {
            config = config.with_n_frames(n_frames)?;
        }
        if let Some(n_steps) = self.n_steps {
            config = config.with_n_steps(n_steps)?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable so they can run in parallel.
    struct TestLevel;

    impl Var for TestLevel {
        const NAME: &'static str = "DRIVENET_TEST_LOG_LEVEL";
        type Type = tracing::Level;

        fn from_env() -> Result<tracing::Level, ConfigError> {
            let level_str = read(Self::NAME)?;
            tracing::Level::from_str(&level_str).map_err(|err| ConfigError::Invalid {
                key: Self::NAME.to_string(),
                value: level_str,
                message: err.to_string(),
            })
        }
    }

    struct Unset;

    impl Var for Unset {
        const NAME: &'static str = "DRIVENET_TEST_NEVER_SET";
        type Type = String;

        fn from_env() -> Result<String, ConfigError> {
            read(Self::NAME)
        }
    }

    #[test]
    fn test_missing_variable() {
        assert!(matches!(Unset::from_env(), Err(ConfigError::Missing { .. })));
        assert!(matches!(Unset::maybe_from_env(), Ok(None)));
    }

    #[test]
    fn test_parse_and_reject_levels() {
        // SAFETY: no other test touches this variable
        unsafe { std::env::set_var(TestLevel::NAME, "debug") };
        assert_eq!(TestLevel::from_env().unwrap(), tracing::Level::DEBUG);

        unsafe { std::env::set_var(TestLevel::NAME, "loud") };
        assert!(matches!(
            TestLevel::maybe_from_env(),
            Err(ConfigError::Invalid { value, .. }) if value == "loud"
        ));

        unsafe { std::env::remove_var(TestLevel::NAME) };
    }

    #[test]
    fn test_overrides_take_precedence() {
        let base = NetConfig::new(NetKind::Feedforward, 4, 7).unwrap();
        let overrides = NetOverrides {
            kind: Some(NetKind::Nvidia),
            n_frames: None,
            n_steps: Some(3),
        };

        let config = overrides.apply(base).unwrap();
        assert_eq!(config, NetConfig::new(NetKind::Nvidia, 4, 3).unwrap());

        let invalid = NetOverrides {
            n_frames: Some(0),
            ..Default::default()
        };
        assert!(invalid.apply(NetConfig::default()).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert_eq!(config.net_config(None).unwrap(), NetConfig::default());
    }

    #[test]
    fn test_command_line_path_shadows_broken_env_path() {
        let path = std::env::temp_dir().join(format!(
            "drivenets_config_test_{}.json",
            std::process::id()
        ));
        let path = path.to_str().unwrap();
        let expected = NetConfig::new(NetKind::Nvidia, 3, 4).unwrap();
        expected.save(path).unwrap();

        let config = AppConfig {
            net_path: Some("/nonexistent/drivenets.json".to_string()),
            ..Default::default()
        };

        assert_eq!(config.net_config(Some(path)).unwrap(), expected);
        assert!(matches!(
            config.net_config(None),
            Err(ConfigError::NetConfig { path, .. }) if path == "/nonexistent/drivenets.json"
        ));

        let _ = std::fs::remove_file(path);
    }
}
