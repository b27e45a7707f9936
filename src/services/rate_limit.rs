// =====================================================================================
// RATE LIMITER - PER-CLIENT SLIDING WINDOW
// =====================================================================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;

/// Whole-entry eviction runs when the client map grows past this many
/// entries at a new-client insert; windows idle for a full window width
/// contribute nothing to any admission decision and are dropped.
const EVICTION_SCAN_THRESHOLD: usize = 1_024;

#[derive(Debug, Default)]
struct ClientWindow {
    /// Admitted-request timestamps, oldest first. Denied requests do not
    /// consume window slots.
    hits: Vec<Instant>,
}

/// Sliding-window admission control keyed by client id. Distinct clients
/// lock independent windows; same-client checks serialize on the window
/// mutex so check-then-record stays atomic.
pub struct RateLimiterService {
    enabled: bool,
    config: RateLimitConfig,
    clients: RwLock<HashMap<String, Arc<Mutex<ClientWindow>>>>,
}

impl RateLimiterService {
    pub fn new(enabled: bool, config: RateLimitConfig) -> Self {
        Self {
            enabled,
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Returns true when the request is admitted. A disabled limiter admits
    /// everything without touching any per-client state. A request at time T
    /// counts against prior admitted requests with timestamp strictly newer
    /// than T minus the window; stale entries are pruned here, lazily, not
    /// by a background sweep.
    pub fn check(&self, client_id: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let now = Instant::now();
        let window = self.window_for(client_id, now);
        let mut state = window.lock().expect("rate limiter mutex poisoned");

        if let Some(cutoff) = now.checked_sub(self.config.window) {
            state.hits.retain(|t| *t > cutoff);
        }

        if state.hits.len() >= self.config.max_requests as usize {
            warn!(
                client_id = %client_id,
                limit = self.config.max_requests,
                window = ?self.config.window,
                "rate limit exceeded"
            );
            return false;
        }

        state.hits.push(now);
        true
    }

    /// Number of client windows currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .read()
            .expect("rate limiter lock poisoned")
            .len()
    }

    /// Forgets one client's window entirely.
    pub fn reset(&self, client_id: &str) {
        self.clients
            .write()
            .expect("rate limiter lock poisoned")
            .remove(client_id);
    }

    fn window_for(&self, client_id: &str, now: Instant) -> Arc<Mutex<ClientWindow>> {
        {
            let clients = self.clients.read().expect("rate limiter lock poisoned");
            if let Some(window) = clients.get(client_id) {
                return Arc::clone(window);
            }
        }

        let mut clients = self.clients.write().expect("rate limiter lock poisoned");
        if !clients.contains_key(client_id) && clients.len() >= EVICTION_SCAN_THRESHOLD {
            self.evict_idle(&mut clients, now);
        }
        Arc::clone(clients.entry(client_id.to_string()).or_default())
    }

    fn evict_idle(&self, clients: &mut HashMap<String, Arc<Mutex<ClientWindow>>>, now: Instant) {
        let cutoff = match now.checked_sub(self.config.window) {
            Some(cutoff) => cutoff,
            None => return,
        };
        let before = clients.len();
        clients.retain(|_, window| {
            window
                .lock()
                .map(|state| state.hits.iter().any(|t| *t > cutoff))
                .unwrap_or(false)
        });
        let evicted = before - clients.len();
        if evicted > 0 {
            debug!(evicted = evicted, "evicted idle rate limit windows");
        }
    }
}
