use std::sync::Arc;

use tokio::sync::Notify;

/// Asks the synchronizer for an early refresh
///
/// Requests made while a refresh is pending collapse into one.
#[derive(Debug, Clone, Default)]
pub struct SchemaRefresher {
    notify: Arc<Notify>,
}

impl SchemaRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }

    /// Resolves once a refresh has been requested
    pub async fn requested(&self) {
        self.notify.notified().await;
    }
}
