use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::network::EventSubscription;

/// Live event-stream handle of one channel.
///
/// Subscribing happens outside this type; the registry attaches the result so
/// status reads never wait on network I/O.
#[derive(Debug, Default)]
pub struct ChannelConnection {
    subscription: Mutex<Option<EventSubscription>>,
}

impl ChannelConnection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_subscription(subscription: EventSubscription) -> Self {
        Self {
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// True iff a subscription is attached and reports itself active
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(EventSubscription::is_active)
    }

    /// Replace the current subscription; the previous one is closed
    pub fn attach(&self, subscription: EventSubscription) {
        let previous = self.slot().replace(subscription);
        if let Some(previous) = previous {
            previous.close();
        }
    }

    /// Close and drop the subscription. Returns whether one was attached.
    pub fn disconnect(&self) -> bool {
        let previous = self.slot().take();
        previous.map(|subscription| subscription.close()).is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<EventSubscription>> {
        // A panic while holding the slot cannot leave it half-written
        self.subscription
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
