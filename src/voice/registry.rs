use std::{collections::HashMap, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{common::ConnectionId, gateway::VoiceConnection};

struct SessionEntry {
    connection: VoiceConnection,
    last_active: Instant,
    leaving: bool,
}

/// Copy of one registry entry taken for a reaper sweep.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: VoiceConnection,
    pub last_active: Instant,
    pub leaving: bool,
}

/// Connections eligible for auto-disconnect, keyed by connection id.
///
/// An entry exists from the first successful connect/move until teardown.
/// All timestamps come from tokio's monotonic clock.
#[derive(Default)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<ConnectionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `connection` active now, inserting it if needed.
    pub fn touch(&self, connection: &VoiceConnection) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get_mut(&connection.id) {
            Some(entry) => {
                entry.connection = connection.clone();
                entry.last_active = now;
            }
            None => {
                entries.insert(
                    connection.id,
                    SessionEntry {
                        connection: connection.clone(),
                        last_active: now,
                        leaving: false,
                    },
                );
            }
        }
    }

    /// Marks an existing entry active now. Returns `false` if it is gone.
    pub fn refresh(&self, id: ConnectionId) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) => {
                entry.last_active = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Removes the entry. Returns whether one existed.
    pub fn forget(&self, id: ConnectionId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    /// Claims the teardown of `id`.
    ///
    /// Returns `false` when another teardown already claimed it. Unknown ids
    /// can always be torn down.
    pub fn mark_leaving(&self, id: ConnectionId) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) if entry.leaving => false,
            Some(entry) => {
                entry.leaving = true;
                true
            }
            None => true,
        }
    }

    /// Gives up a teardown claim, e.g. when an eviction is abandoned.
    pub fn clear_leaving(&self, id: ConnectionId) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.leaving = false;
        }
    }

    pub fn idle_since(&self, id: ConnectionId, now: Instant) -> Option<Duration> {
        self.entries
            .lock()
            .get(&id)
            .map(|entry| now.saturating_duration_since(entry.last_active))
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn is_leaving(&self, id: ConnectionId) -> bool {
        self.entries.lock().get(&id).is_some_and(|e| e.leaving)
    }

    pub fn entries(&self) -> Vec<SessionSnapshot> {
        self.entries
            .lock()
            .values()
            .map(|entry| SessionSnapshot {
                connection: entry.connection.clone(),
                last_active: entry.last_active,
                leaving: entry.leaving,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
