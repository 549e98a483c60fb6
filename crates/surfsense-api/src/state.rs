use std::sync::Arc;
use std::time::Instant;

use surfsense_core::TaskBroker;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn TaskBroker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(broker: Arc<dyn TaskBroker>) -> Self {
        Self {
            broker,
            started_at: Instant::now(),
        }
    }
}
