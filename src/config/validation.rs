//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing services and limiter classes)
//! - Validate value ranges (capacities, rates, thresholds)
//! - Reject unusable signing secrets before any traffic is accepted
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use axum::http::uri::Authority;

use crate::config::schema::GatewayConfig;
use crate::routing::matcher::PathPattern;
use crate::security::cors;
use crate::security::token::MIN_SECRET_LEN;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            format!("must be at least {MIN_SECRET_LEN} bytes (set JWT_SECRET)"),
        ));
    }
    if config.auth.access_token_ttl_secs <= 0 {
        errors.push(ValidationError::new("auth.access_token_ttl_secs", "must be positive"));
    }
    if config.auth.refresh_token_ttl_secs <= 0 {
        errors.push(ValidationError::new("auth.refresh_token_ttl_secs", "must be positive"));
    }
    for (i, pattern) in config.auth.exempt_paths.iter().enumerate() {
        if PathPattern::parse(pattern).is_none() {
            errors.push(ValidationError::new(
                format!("auth.exempt_paths[{i}]"),
                format!("invalid path pattern '{pattern}'"),
            ));
        }
    }

    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new("timeouts.upstream_ms", "must be greater than zero"));
    }

    for (name, class) in &config.rate_limit.classes {
        if class.capacity == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.classes.{name}.capacity"),
                "must be at least 1",
            ));
        }
        if !(class.rate_per_second.is_finite() && class.rate_per_second > 0.0) {
            errors.push(ValidationError::new(
                format!("rate_limit.classes.{name}.rate_per_second"),
                "must be a positive number",
            ));
        }
    }

    if config.cors.enabled {
        let policy = &config.cors;
        let lists: [(&str, &[String], fn(&str) -> bool); 4] = [
            ("allowed_origins", policy.allowed_origins.as_slice(), |v| v.trim() == "*" || cors::parse_origin(v).is_some()),
            ("allowed_methods", policy.allowed_methods.as_slice(), |v| cors::parse_method(v).is_some()),
            ("allowed_headers", policy.allowed_headers.as_slice(), |v| v.trim() == "*" || cors::parse_header_name(v).is_some()),
            ("exposed_headers", policy.exposed_headers.as_slice(), |v| cors::parse_header_name(v).is_some()),
        ];
        for (name, values, valid) in lists {
            for (i, value) in values.iter().enumerate() {
                if !valid(value) {
                    errors.push(ValidationError::new(
                        format!("cors.{name}[{i}]"),
                        format!("invalid entry '{value}'"),
                    ));
                }
            }
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if breaker.half_open_probes == 0 {
        errors.push(ValidationError::new("circuit_breaker.half_open_probes", "must be at least 1"));
    }

    let mut services = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        if !services.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("services[{i}].name"),
                format!("duplicate service '{}'", service.name),
            ));
        }
        if service.addresses.is_empty() {
            errors.push(ValidationError::new(
                format!("services[{i}].addresses"),
                format!("service '{}' has no addresses", service.name),
            ));
        }
        for address in &service.addresses {
            if address.parse::<Authority>().is_err() {
                errors.push(ValidationError::new(
                    format!("services[{i}].addresses"),
                    format!("invalid address '{address}'"),
                ));
            }
        }
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::new("routes", "at least one route is required"));
    }

    let mut route_names = HashSet::new();
    let mut breaker_names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = |name: &str| format!("routes[{i}].{name}");

        if !route_names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(field("name"), format!("duplicate route '{}'", route.name)));
        }

        let pattern = PathPattern::parse(&route.path);
        if pattern.is_none() {
            errors.push(ValidationError::new(field("path"), format!("invalid path pattern '{}'", route.path)));
        }

        if let Some(rewrite) = &route.rewrite {
            if !rewrite.template.contains("{segment}") {
                errors.push(ValidationError::new(field("rewrite.template"), "must contain {segment}"));
            }
            if let Some(pattern) = &pattern {
                if !pattern.matches(&rewrite.prefix) && !pattern.matches(rewrite.prefix.trim_end_matches('/')) {
                    errors.push(ValidationError::new(
                        field("rewrite.prefix"),
                        format!("'{}' is not covered by path '{}'", rewrite.prefix, route.path),
                    ));
                }
            }
        }

        if !services.contains(route.service.as_str()) {
            errors.push(ValidationError::new(
                field("service"),
                format!("unknown service '{}'", route.service),
            ));
        }

        if !config.rate_limit.classes.contains_key(&route.rate_limit) {
            errors.push(ValidationError::new(
                field("rate_limit"),
                format!("unknown limiter class '{}'", route.rate_limit),
            ));
        }

        if let Some(name) = &route.circuit_breaker {
            if !breaker_names.insert(name.as_str()) {
                errors.push(ValidationError::new(
                    field("circuit_breaker"),
                    format!("breaker '{name}' is already bound to another route"),
                ));
            }
        }

        if let Some(fallback) = &route.fallback {
            let valid = fallback
                .strip_prefix("/fallback/")
                .is_some_and(|service| !service.is_empty() && !service.contains('/'));
            if !valid {
                errors.push(ValidationError::new(
                    field("fallback"),
                    format!("'{fallback}' must look like /fallback/<service>"),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RouteConfig, ServiceConfig};

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "k".repeat(64);
        config
    }

    #[test]
    fn test_default_config_with_secret_is_valid() {
        assert_eq!(validate_config(&valid_config()), Ok(()));
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let config = GatewayConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "auth.jwt_secret"));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = valid_config();
        config.routes.push(RouteConfig {
            name: "broken".into(),
            path: "api/no-leading-slash".into(),
            rewrite: None,
            service: "ghost-service".into(),
            circuit_breaker: Some("userServiceCircuitBreaker".into()),
            fallback: Some("/elsewhere".into()),
            rate_limit: "premium".into(),
        });
        config.services.push(ServiceConfig {
            name: "empty-service".into(),
            addresses: vec![],
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"routes[7].path"));
        assert!(fields.contains(&"routes[7].service"));
        assert!(fields.contains(&"routes[7].rate_limit"));
        assert!(fields.contains(&"routes[7].circuit_breaker"));
        assert!(fields.contains(&"routes[7].fallback"));
        assert!(fields.contains(&"services[5].addresses"));
    }

    #[test]
    fn test_rewrite_needs_segment_placeholder() {
        let mut config = valid_config();
        config.routes[1].rewrite.as_mut().unwrap().template = "/api/v1/users".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "routes[1].rewrite.template");
    }

    #[test]
    fn test_malformed_cors_entries() {
        let mut config = valid_config();
        config.cors.allowed_methods.push("GET POST".into());
        config.cors.exposed_headers.push("X Total".into());
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["cors.allowed_methods[6]", "cors.exposed_headers[3]"]);

        config.cors.enabled = false;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_zero_capacity_and_rate() {
        let mut config = valid_config();
        let class = config.rate_limit.classes.get_mut("general").unwrap();
        class.capacity = 0;
        class.rate_per_second = 0.0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
