//! Change notifier for live accessory updates.
//!
//! When a characteristic changes, the accessory framework should push the new
//! value to paired controllers straight away instead of waiting for a poll.

use log::trace;
use std::sync::Arc;
use tokio::sync::Notify;

/// Wakes whoever serves the accessory when a characteristic changes.
///
/// Several notifiers may share one [`Notify`]; the accessory framework waits
/// on it and then re-reads the characteristics whose version moved.
#[derive(Clone)]
pub struct ChangeNotifier {
    notify: Arc<Notify>,
    characteristic: &'static str,
}

impl ChangeNotifier {
    pub fn new(notify: Arc<Notify>, characteristic: &'static str) -> Self {
        Self {
            notify,
            characteristic,
        }
    }

    /// Non-blocking; a pending notification is kept if nobody is waiting.
    pub fn notify(&self) {
        trace!("[Accessory] {} changed", self.characteristic);
        self.notify.notify_one();
    }
}
