//! User (identity) definitions
//!
//! A `UserProfile` is the serializable part of an identity; a `User` adds
//! the outgoing mailbox and is what the hub keeps in its registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Message;
use crate::types::UserId;

/// Serializable identity record
///
/// The token is only present on the copy a session keeps for itself and
/// on the welcome message addressed to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub uid: UserId,
    pub nickname: String,
    pub enter_at: DateTime<Utc>,
    pub addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl UserProfile {
    pub fn new(uid: UserId, nickname: String, addr: String, token: String) -> Self {
        Self {
            uid,
            nickname,
            enter_at: Utc::now(),
            addr,
            token: Some(token),
        }
    }

    /// The author of system-generated messages
    pub fn system() -> Self {
        Self {
            uid: UserId::SYSTEM,
            nickname: String::new(),
            enter_at: Utc::now(),
            addr: String::new(),
            token: None,
        }
    }

    /// Copy of this profile safe to show other participants
    pub fn public(&self) -> Self {
        Self {
            token: None,
            ..self.clone()
        }
    }
}

/// Online identity as held by the hub
///
/// Holds the only sender of the mailbox once the user has entered, so
/// dropping it closes the mailbox.
#[derive(Debug)]
pub struct User {
    pub profile: UserProfile,
    /// Hub → session message channel
    pub mailbox: mpsc::Sender<Arc<Message>>,
    /// Identity was minted in this session rather than recovered
    pub is_new: bool,
}

impl User {
    /// Create a user and the receiving half of its mailbox
    pub fn new(profile: UserProfile, is_new: bool, capacity: usize) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let user = Self {
            profile: profile.public(),
            mailbox: tx,
            is_new,
        };
        (user, Mailbox(rx))
    }

    pub fn uid(&self) -> UserId {
        self.profile.uid
    }

    pub fn nickname(&self) -> &str {
        &self.profile.nickname
    }

    /// Enqueue a message, waiting for room if the mailbox is full
    pub async fn send(&self, msg: Arc<Message>) -> Result<(), SendError> {
        self.mailbox
            .send(msg)
            .await
            .map_err(|_| SendError::MailboxClosed)
    }
}

/// Receiving half of a user's mailbox, drained by the session's send task
#[derive(Debug)]
pub struct Mailbox(mpsc::Receiver<Arc<Message>>);

impl Mailbox {
    /// Next message, or `None` once the hub has let go of the sender
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        self.0.recv().await
    }

    /// Non-blocking variant, mostly useful in tests
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        self.0.try_recv().ok()
    }
}
