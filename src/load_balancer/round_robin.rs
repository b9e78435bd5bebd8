//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use axum::http::uri::Authority;

use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal counter to rotate through backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server<'a>(&self, backends: &'a [Authority]) -> Option<&'a Authority> {
        if backends.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % backends.len();
        backends.get(index)
    }
}
