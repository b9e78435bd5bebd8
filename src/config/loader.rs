//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable that overrides `auth.jwt_secret`.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document without touching the environment or validating.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load configuration from an optional TOML file, apply environment
/// overrides and validate the result.
///
/// Without a path the built-in defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => GatewayConfig::default(),
    };

    if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
        config.auth.jwt_secret = secret;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::KeyStrategy;

    #[test]
    fn test_parse_partial_document_keeps_defaults() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [auth]
            jwt_secret = "0123456789abcdef0123456789abcdef"
            access_token_ttl_secs = 900
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.auth.access_token_ttl_secs, 900);
        assert_eq!(config.auth.refresh_token_ttl_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.auth.exempt_paths.len(), 4);
        assert_eq!(config.routes.len(), 7);
        assert_eq!(config.rate_limit.classes["auth"].capacity, 5);
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_parse_route_table() {
        let config = parse_config(
            r#"
            [rate_limit.classes.uploads]
            capacity = 2
            rate_per_second = 0.5
            key = "ip"

            [[routes]]
            name = "files"
            path = "/files/**"
            service = "files"
            rate_limit = "uploads"
            rewrite = { prefix = "/files/", template = "/v2/files/{segment}" }

            [[services]]
            name = "files"
            addresses = ["10.0.0.5:7000", "10.0.0.6:7000"]
            "#,
        )
        .unwrap();

        assert_eq!(config.routes.len(), 1);
        let route = &config.routes[0];
        assert_eq!(route.rate_limit, "uploads");
        assert!(route.circuit_breaker.is_none());
        assert_eq!(route.rewrite.as_ref().unwrap().template, "/v2/files/{segment}");
        assert_eq!(config.services[0].addresses.len(), 2);
        assert_eq!(config.rate_limit.classes["uploads"].key, KeyStrategy::Ip);
        // Declared classes replace the stock table.
        assert_eq!(config.rate_limit.classes.len(), 1);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_validation_error_message_lists_fields() {
        let err = ConfigError::Validation(vec![
            ValidationError {
                field: "a".into(),
                message: "bad".into(),
            },
            ValidationError {
                field: "b".into(),
                message: "worse".into(),
            },
        ]);
        assert_eq!(err.to_string(), "Validation failed: a: bad, b: worse");
    }
}
