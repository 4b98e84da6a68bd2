use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::lifecycle::BookingStatus;
use crate::model::TimeRange;

const CHANNEL_CAPACITY: usize = 256;

/// Realtime audience for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    User(Ulid),
    Venue(Ulid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Notification {
    #[serde(rename = "booking.confirmed")]
    BookingConfirmed { booking_id: Ulid, court_id: Ulid, range: TimeRange },
    #[serde(rename = "booking.cancelled")]
    BookingCancelled { booking_id: Ulid, court_id: Ulid, status: BookingStatus },
    #[serde(rename = "booking.expired")]
    BookingExpired { booking_id: Ulid, court_id: Ulid },
    #[serde(rename = "slot.updated")]
    SlotUpdated { court_id: Ulid, range: TimeRange, status: BookingStatus },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::BookingConfirmed { .. } => "booking.confirmed",
            Notification::BookingCancelled { .. } => "booking.cancelled",
            Notification::BookingExpired { .. } => "booking.expired",
            Notification::SlotUpdated { .. } => "slot.updated",
        }
    }
}

/// Fire-and-forget delivery. Implementations must not block and never fail
/// the caller.
pub trait NotificationSink: Send + Sync {
    fn notify_user(&self, user_id: Ulid, notification: Notification);
    fn notify_venue(&self, venue_id: Ulid, notification: Notification);
}

/// Broadcast fan-out per user and per venue.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Channel, broadcast::Sender<Notification>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the channel on first subscription.
    pub fn subscribe(&self, channel: Channel) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(channel)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, channel: Channel, notification: &Notification) {
        if let Some(sender) = self.channels.get(&channel) {
            let _ = sender.send(notification.clone());
        }
    }

    pub fn remove(&self, channel: &Channel) {
        self.channels.remove(channel);
    }
}

impl NotificationSink for NotifyHub {
    fn notify_user(&self, user_id: Ulid, notification: Notification) {
        tracing::debug!(%user_id, event = notification.name(), "notify user");
        self.send(Channel::User(user_id), &notification);
    }

    fn notify_venue(&self, venue_id: Ulid, notification: Notification) {
        tracing::debug!(%venue_id, event = notification.name(), "notify venue");
        self.send(Channel::Venue(venue_id), &notification);
    }
}
