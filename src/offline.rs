//! Offline message store
//!
//! Keeps the last N normal messages for everyone, plus per-nickname rings of
//! messages that mentioned that nickname. Owned exclusively by the hub.

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::{Message, MessageKind};
use crate::user::User;

/// Fixed-capacity circular buffer
///
/// Pushing into a full buffer overwrites the oldest entry. Iteration runs
/// from the oldest retained entry to the newest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Next slot to write
    cursor: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            cursor: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: T) {
        self.slots[self.cursor] = Some(value);
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.slots.split_at(self.cursor);
        older.iter().chain(newer.iter()).flatten()
    }
}

/// Recent-history and mention rings for replay on (re)entry
#[derive(Debug)]
pub struct OfflineStore {
    capacity: usize,
    recent: RingBuffer<Arc<Message>>,
    mentions: HashMap<String, RingBuffer<Arc<Message>>>,
}

impl OfflineStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: RingBuffer::new(capacity),
            mentions: HashMap::new(),
        }
    }

    /// Record a normal message; every other kind is ignored
    ///
    /// Mention rings are filled whether or not the mentioned user is online.
    pub fn save(&mut self, msg: &Arc<Message>) {
        if msg.kind != MessageKind::Normal {
            return;
        }
        self.recent.push(Arc::clone(msg));

        for mention in &msg.ats {
            let nickname = mention.strip_prefix('@').unwrap_or(mention);
            self.mentions
                .entry(nickname.to_string())
                .or_insert_with(|| RingBuffer::new(self.capacity))
                .push(Arc::clone(msg));
        }
    }

    /// Messages to replay to `user` on entry
    ///
    /// Recent history always; a recovered identity also gets the messages
    /// that mentioned it, which are then forgotten.
    pub fn take_replay(&mut self, user: &User) -> Vec<Arc<Message>> {
        let mut replay: Vec<Arc<Message>> = self.recent.iter().cloned().collect();
        if user.is_new {
            return replay;
        }

        if let Some(ring) = self.mentions.remove(user.nickname()) {
            replay.extend(ring.iter().cloned());
        }
        replay
    }

    /// Number of nicknames with pending mentions
    pub fn pending_mentions(&self) -> usize {
        self.mentions.len()
    }
}
