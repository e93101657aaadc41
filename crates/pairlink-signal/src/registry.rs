//! Participant registry for the relay
//!
//! Holds at most `capacity` live participants in admission order. Every
//! read-modify-write happens under one lock acquisition so that two
//! near-simultaneous admissions cannot both observe a free slot.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use pairlink_core::RelayError;

use crate::link::{LinkState, PeerLink};

/// An admitted connection
pub struct Participant {
    /// Process-unique identifier
    pub id: String,

    /// Remote socket address
    pub addr: SocketAddr,

    /// Client-supplied identifying string (the upgrade request's User-Agent)
    pub user_agent: Option<String>,

    /// When the participant was admitted
    pub connected_at: DateTime<Utc>,

    link: Arc<dyn PeerLink>,
}

impl Participant {
    pub fn new(
        id: String,
        addr: SocketAddr,
        user_agent: Option<String>,
        link: Arc<dyn PeerLink>,
    ) -> Self {
        Self {
            id,
            addr,
            user_agent,
            connected_at: Utc::now(),
            link,
        }
    }

    /// Transport handle
    pub fn link(&self) -> &Arc<dyn PeerLink> {
        &self.link
    }

    /// Whether the transport is already closing or closed
    pub fn is_stale(&self) -> bool {
        self.link.state().is_stale()
    }

    /// How long the participant has been connected
    pub fn session_duration(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }
}

/// A relay destination picked out of the registry
#[derive(Clone)]
pub struct Target {
    pub id: String,
    pub link: Arc<dyn PeerLink>,
}

/// Result of an admission attempt
pub struct Admission {
    /// Stale entries removed before the capacity check
    pub swept: Vec<Participant>,

    /// Registry size after insertion, or the rejection
    pub result: Result<usize, RelayError>,
}

/// The set of currently admitted participants
pub struct Registry {
    entries: Mutex<Vec<Participant>>,
    capacity: usize,
}

impl Registry {
    /// Create an empty registry holding at most `capacity` participants
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Sweep stale entries, then insert `participant` if a slot is free.
    ///
    /// Sweep, count and insert happen under a single lock acquisition.
    pub fn admit(&self, participant: Participant) -> Admission {
        let mut entries = self.entries.lock();

        let (swept, live): (Vec<_>, Vec<_>) = entries.drain(..).partition(Participant::is_stale);
        *entries = live;

        let result = if entries.len() >= self.capacity {
            Err(RelayError::ServerFull {
                capacity: self.capacity,
            })
        } else {
            entries.push(participant);
            Ok(entries.len())
        };

        Admission { swept, result }
    }

    /// Open connections other than `sender`, in admission order
    pub fn targets(&self, sender: &str) -> Vec<Target> {
        self.entries
            .lock()
            .iter()
            .filter(|p| p.id != sender && p.link.state() == LinkState::Open)
            .map(|p| Target {
                id: p.id.clone(),
                link: p.link.clone(),
            })
            .collect()
    }

    /// Remove a participant. Removing an absent id is a no-op.
    pub fn remove(&self, id: &str) -> Option<Participant> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|p| p.id == id)?;
        Some(entries.remove(index))
    }

    /// Registered ids in admission order
    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().iter().map(|p| p.id.clone()).collect()
    }

    /// Number of registered participants (stale entries included until swept)
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
