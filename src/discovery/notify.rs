//! Notifications returned to the application.

use crate::channel::PageChannel;
use crate::joinable::NetworkRecord;
use crate::session::ScanError;

/// Events one transition can produce.
pub const MAX_NOTIFICATIONS: usize = 4;

/// Something the application must act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A joinable network; try to join it, then report the result.
    NetworkFound(NetworkRecord),
    /// Form a network here, then report it up.
    ///
    /// The form request stays active until [`Orchestrator::network_up`] or
    /// [`Orchestrator::abort`] is called; until then new requests fail with
    /// `AlreadyScanning` and policy setters with `Busy`.
    ///
    /// [`Orchestrator::network_up`]: super::Orchestrator::network_up
    /// [`Orchestrator::abort`]: super::Orchestrator::abort
    UnusedPanIdFound { pan_id: u16, channel: PageChannel },
    /// Channel for the second (sub-GHz) interface.
    SecondaryChannelSelected(PageChannel),
    /// The search ended with an error.
    ScanError(ScanError),
    /// The search ended.
    SearchFinished,
}

/// Fixed-capacity list of events produced by one transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "notifications carry search results"]
pub struct Notifications {
    events: heapless::Vec<DiscoveryEvent, MAX_NOTIFICATIONS>,
}

impl Notifications {
    pub const MAX: usize = MAX_NOTIFICATIONS;

    pub const fn new() -> Self {
        Self {
            events: heapless::Vec::new(),
        }
    }

    pub fn push(&mut self, event: DiscoveryEvent) {
        if self.events.push(event).is_err() {
            log::warn!("notification dropped: {:?}", event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryEvent> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[DiscoveryEvent] {
        &self.events
    }

    /// True if the transition ended the search.
    pub fn is_terminal(&self) -> bool {
        self.iter().any(|event| {
            matches!(
                event,
                DiscoveryEvent::ScanError(_) | DiscoveryEvent::SearchFinished
            )
        })
    }
}

impl<'a> IntoIterator for &'a Notifications {
    type Item = &'a DiscoveryEvent;
    type IntoIter = std::slice::Iter<'a, DiscoveryEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
