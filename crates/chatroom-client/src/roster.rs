//! Who is in the room, as seen by this client.

use std::collections::BTreeSet;

use parking_lot::RwLock;

use crate::events::RoomEvent;

/// Sorted set of present participant names.
///
/// Fed from `JOINED`/`LEFT` events and seeded with our own name once the
/// login is accepted.
#[derive(Debug, Default)]
pub struct Roster {
    names: RwLock<BTreeSet<String>>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a presence change. Chat messages leave the roster untouched.
    pub fn apply(&self, event: &RoomEvent) {
        match event {
            RoomEvent::Joined { name, .. } => self.insert(name),
            RoomEvent::Left { name, .. } => {
                let _ = self.names.write().remove(name);
            }
            RoomEvent::Message(_) => {}
        }
    }

    /// Add `name`. Adding a present name is a no-op.
    pub fn insert(&self, name: &str) {
        let _ = self.names.write().insert(name.to_string());
    }

    /// Present names in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.names.read().iter().cloned().collect()
    }

    /// Whether `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.names.read().contains(name)
    }

    /// Number of present participants.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Whether nobody is present.
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatroom_core::Message;
    use chrono::Utc;

    fn joined(name: &str) -> RoomEvent {
        RoomEvent::Joined {
            at: Utc::now(),
            name: name.to_string(),
        }
    }

    fn left(name: &str) -> RoomEvent {
        RoomEvent::Left {
            at: Utc::now(),
            name: name.to_string(),
        }
    }

    #[test]
    fn names_are_sorted() {
        let roster = Roster::new();
        roster.insert("mallory");
        roster.apply(&joined("carol"));
        roster.apply(&joined("alice"));
        assert_eq!(roster.names(), vec!["alice", "carol", "mallory"]);
    }

    #[test]
    fn left_removes_and_unknown_left_is_ignored() {
        let roster = Roster::new();
        roster.apply(&joined("alice"));
        roster.apply(&joined("bob"));
        roster.apply(&left("alice"));
        roster.apply(&left("ghost"));
        assert_eq!(roster.names(), vec!["bob"]);
        assert!(!roster.contains("alice"));
    }

    #[test]
    fn repeated_join_is_counted_once() {
        let roster = Roster::new();
        roster.apply(&joined("alice"));
        roster.insert("alice");
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn chat_messages_do_not_change_presence() {
        let roster = Roster::new();
        let message = Message::builder().from("alice").broadcast().text("hi").build();
        roster.apply(&RoomEvent::Message(message));
        assert!(roster.is_empty());
    }
}
