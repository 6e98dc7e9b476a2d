//! Inbound command rate limiting

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Per-connection limiter for client commands
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    commands: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new(commands_per_second: u32) -> Self {
        Self {
            commands: create_limiter(commands_per_second),
        }
    }

    /// True when the command may be processed
    pub fn check(&self) -> bool {
        self.commands.check().is_ok()
    }
}
