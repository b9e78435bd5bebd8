//! Service registry.
//!
//! # Responsibilities
//! - Map service names from the route table to backend addresses
//! - Apply the service's load balancing algorithm on every dispatch

use std::collections::HashMap;

use axum::http::uri::Authority;

use crate::config::ServiceConfig;
use crate::load_balancer::{LoadBalancer, RoundRobin};

#[derive(Debug)]
struct ServicePool {
    backends: Vec<Authority>,
    balancer: Box<dyn LoadBalancer>,
}

/// Resolves service names to backend addresses.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServicePool>,
}

impl ServiceRegistry {
    pub fn new(configs: &[ServiceConfig]) -> Self {
        let mut services = HashMap::new();

        for config in configs {
            let backends: Vec<Authority> = config
                .addresses
                .iter()
                .filter_map(|address| match address.parse() {
                    Ok(authority) => Some(authority),
                    Err(e) => {
                        tracing::warn!(service = %config.name, address = %address, error = %e, "Invalid backend address");
                        None
                    }
                })
                .collect();

            tracing::debug!(service = %config.name, backends = backends.len(), "Service registered");
            services.insert(
                config.name.clone(),
                ServicePool {
                    backends,
                    balancer: Box::new(RoundRobin::new()),
                },
            );
        }

        Self { services }
    }

    /// Pick the backend for the next call to `service`.
    pub fn resolve(&self, service: &str) -> Option<Authority> {
        let pool = self.services.get(service)?;
        pool.balancer.next_server(&pool.backends).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rotates_within_service() {
        let registry = ServiceRegistry::new(&[
            ServiceConfig {
                name: "chat-service".into(),
                addresses: vec!["10.0.0.1:80".into(), "10.0.0.2:80".into()],
            },
            ServiceConfig {
                name: "user-service".into(),
                addresses: vec!["10.0.1.1:80".into()],
            },
        ]);

        let first = registry.resolve("chat-service").unwrap();
        let second = registry.resolve("chat-service").unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.resolve("user-service").unwrap().as_str(), "10.0.1.1:80");
        assert!(registry.resolve("missing-service").is_none());
    }

    #[test]
    fn test_service_without_valid_addresses_resolves_to_none() {
        let registry = ServiceRegistry::new(&[ServiceConfig {
            name: "broken".into(),
            addresses: vec!["not a host".into()],
        }]);
        assert!(registry.resolve("broken").is_none());
    }
}
