//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating `EndpointConfig`
#[derive(Error, Debug)]
pub enum Error {
    /// A setting is present but unusable.
    #[error("Invalid {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("failed to read access token file {}: {source}", path.display())]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

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
    fn error_display_includes_context() {
        let token_err = Error::TokenFile {
            path: PathBuf::from("/run/secrets/acrolinx-token"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            token_err.to_string(),
            "failed to read access token file /run/secrets/acrolinx-token: denied"
        );

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "acrolinx.toml not found",
        ));
        assert!(
            io_err.to_string().starts_with("I/O error:"),
            "got: {}",
            io_err
        );
    }

    #[test]
    fn invalid_setting_names_the_field() {
        let err = Error::InvalidSetting {
            field: "timeout_secs",
            reason: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "Invalid timeout_secs: must be greater than 0");
    }

    #[test]
    fn toml_errors_convert() {
        let parse_err = toml::from_str::<toml::Table>("acrolinx_url = ").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Toml(_)));
    }
}
