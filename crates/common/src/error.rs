//! Configuration errors shared by the gateway crates

use thiserror::Error;

/// Error raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// An environment variable is set but cannot be used.
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_missing_setting() {
        let err = Error::Config("XERO_CLIENT_ID is not set".into());
        assert_eq!(err.to_string(), "Configuration error: XERO_CLIENT_ID is not set");
    }

    #[test]
    fn invalid_env_quotes_the_value() {
        let err = Error::InvalidEnv {
            name: "PORT",
            value: "eighty".into(),
        };
        assert_eq!(err.to_string(), r#"invalid value for PORT: "eighty""#);
    }

    #[test]
    fn toml_errors_convert() {
        let parse = toml::from_str::<toml::Table>("not valid {{{{ toml").unwrap_err();
        let err: Error = parse.into();
        assert!(err.to_string().starts_with("TOML parse error"), "got: {err}");
    }
}
