use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a booking row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Hold,
    Confirmed,
    CancelledByUser,
    CancelledByOwner,
    Expired,
    Completed,
}

/// Statuses that occupy a slot for conflict detection.
pub const BLOCKING_STATUSES: [BookingStatus; 2] = [BookingStatus::Hold, BookingStatus::Confirmed];

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Hold,
        BookingStatus::Confirmed,
        BookingStatus::CancelledByUser,
        BookingStatus::CancelledByOwner,
        BookingStatus::Expired,
        BookingStatus::Completed,
    ];

    /// The transition table. Anything not listed here is illegal.
    pub fn allowed_transitions(self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Hold => &[BookingStatus::Confirmed, BookingStatus::Expired],
            BookingStatus::Confirmed => &[
                BookingStatus::CancelledByUser,
                BookingStatus::CancelledByOwner,
                BookingStatus::Completed,
            ],
            BookingStatus::CancelledByUser
            | BookingStatus::CancelledByOwner
            | BookingStatus::Expired
            | BookingStatus::Completed => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn is_blocking(self) -> bool {
        BLOCKING_STATUSES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Hold => "HOLD",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::CancelledByUser => "CANCELLED_BY_USER",
            BookingStatus::CancelledByOwner => "CANCELLED_BY_OWNER",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_valid_transition(from: BookingStatus, to: BookingStatus) -> bool {
    from.allowed_transitions().contains(&to)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid booking status transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booking, NewBooking, TimeRange};
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use ulid::Ulid;

    #[test]
    fn hold_moves_to_confirmed_or_expired_only() {
        use BookingStatus::*;
        assert!(is_valid_transition(Hold, Confirmed));
        assert!(is_valid_transition(Hold, Expired));
        assert!(!is_valid_transition(Hold, CancelledByUser));
        assert!(!is_valid_transition(Hold, Completed));
        assert!(!is_valid_transition(Hold, Hold));
    }

    #[test]
    fn confirmed_moves_to_cancel_or_complete() {
        use BookingStatus::*;
        assert!(is_valid_transition(Confirmed, CancelledByUser));
        assert!(is_valid_transition(Confirmed, CancelledByOwner));
        assert!(is_valid_transition(Confirmed, Completed));
        assert!(!is_valid_transition(Confirmed, Expired));
        assert!(!is_valid_transition(Confirmed, Hold));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for s in BookingStatus::ALL {
            let terminal = matches!(
                s,
                BookingStatus::CancelledByUser
                    | BookingStatus::CancelledByOwner
                    | BookingStatus::Expired
                    | BookingStatus::Completed
            );
            assert_eq!(s.is_terminal(), terminal, "{s}");
            if terminal {
                for to in BookingStatus::ALL {
                    assert!(!is_valid_transition(s, to));
                }
            }
        }
    }

    #[test]
    fn only_hold_and_confirmed_block() {
        let blocking: Vec<_> = BookingStatus::ALL.into_iter().filter(|s| s.is_blocking()).collect();
        assert_eq!(blocking, vec![BookingStatus::Hold, BookingStatus::Confirmed]);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&BookingStatus::CancelledByOwner).unwrap();
        assert_eq!(json, "\"CANCELLED_BY_OWNER\"");
        let back: BookingStatus = serde_json::from_str("\"EXPIRED\"").unwrap();
        assert_eq!(back, BookingStatus::Expired);
        assert_eq!(BookingStatus::CancelledByOwner.to_string(), "CANCELLED_BY_OWNER");
    }

    fn fresh_hold() -> Booking {
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 8, 0, 0).unwrap();
        let range = TimeRange::new(start, start + Duration::hours(1)).unwrap();
        Booking::from_new(
            Ulid::new(),
            NewBooking {
                user_id: Ulid::new(),
                court_id: Ulid::new(),
                range,
                hold_expires_at: start - Duration::minutes(30),
                total_price: 150_000,
                note: None,
            },
            start - Duration::hours(1),
        )
    }

    fn any_status() -> impl Strategy<Value = BookingStatus> {
        (0..BookingStatus::ALL.len()).prop_map(|i| BookingStatus::ALL[i])
    }

    proptest! {
        #[test]
        fn random_transition_sequences_follow_table(targets in proptest::collection::vec(any_status(), 0..24)) {
            let mut booking = fresh_hold();
            let at = booking.created_at();
            for to in targets {
                let before = booking.status();
                match booking.transition(to, None, at) {
                    Ok(()) => {
                        prop_assert!(before.allowed_transitions().contains(&to));
                        prop_assert_eq!(booking.status(), to);
                    }
                    Err(err) => {
                        prop_assert!(!is_valid_transition(before, to));
                        prop_assert_eq!(err, InvalidTransition { from: before, to });
                        prop_assert_eq!(booking.status(), before);
                    }
                }
            }
        }
    }
}
