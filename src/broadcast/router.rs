//! Event fan-out to matching subscribers

use crate::broadcast::{Audience, Broadcaster, SubscriberRegistry};
use crate::nostr::Event;
use tracing::debug;

/// Routes events to every subscriber whose filters match
#[derive(Clone)]
pub struct EventRouter {
    subscribers: SubscriberRegistry,
}

impl EventRouter {
    pub fn new(subscribers: SubscriberRegistry) -> Self {
        Self { subscribers }
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    /// Route an event to the matching subscribers the audience admits,
    /// returning how many took it
    pub fn route(&self, event: &Event, audience: &Audience) -> usize {
        let matching: Vec<_> = self
            .subscribers
            .find_matching(event)
            .into_iter()
            .filter(|subscriber| audience.admits(subscriber.pubkey.as_deref()))
            .collect();

        if matching.is_empty() {
            debug!(event = %event, "No subscribers for event");
            return 0;
        }

        debug!(event = %event, subscriber_count = matching.len(), "Routing event");

        let mut delivered = 0;
        for subscriber in matching {
            let mut event = event.clone();
            if !audience.keeps_signature(subscriber.pubkey.as_deref()) {
                event.sig.clear();
            }

            match subscriber.try_send(event) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // Expected during rapid disconnect or when a reader falls behind
                    debug!(
                        subscriber_id = %subscriber.id,
                        error = %e,
                        "Failed to send event to subscriber (buffer full or disconnected)"
                    );
                }
            }
        }

        delivered
    }
}

impl Broadcaster for EventRouter {
    fn broadcast(&self, event: &Event, audience: &Audience) -> usize {
        self.route(event, audience)
    }
}
