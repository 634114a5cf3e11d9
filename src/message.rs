//! Message protocol definitions
//!
//! Inbound frames are `{"content": ..., "send_time": ...}` objects; outbound
//! frames are serialized `Message` values with an integer `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::user::UserProfile;

/// Message kind
///
/// The discriminants are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Text sent by a user
    Normal = 0,
    /// Greeting sent only to the user who just connected
    Welcome = 1,
    /// A user joined the room
    UserEnter = 2,
    /// A user left the room
    UserLeave = 3,
    /// Error notice from the system
    Error = 4,
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Client → Server message
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub content: String,
    /// Client clock at send time, nanoseconds since the epoch as a string
    #[serde(default)]
    pub send_time: Option<String>,
}

/// Server → Client message
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Author of the message
    pub user: UserProfile,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub msg_time: DateTime<Utc>,
    pub client_send_time: Option<DateTime<Utc>>,
    /// Mention tokens, each still carrying its leading `@`
    pub ats: Vec<String>,
}

impl Message {
    fn with_kind(user: UserProfile, kind: MessageKind, content: String) -> Self {
        Self {
            user,
            kind,
            content,
            msg_time: Utc::now(),
            client_send_time: None,
            ats: Vec::new(),
        }
    }

    /// A user's chat message
    pub fn normal(user: UserProfile, content: String, send_time: Option<&str>) -> Self {
        let mut msg = Self::with_kind(user, MessageKind::Normal, content);
        msg.client_send_time = send_time.and_then(parse_send_time);
        msg
    }

    /// Greeting for the connecting user; keeps their token so they learn it
    pub fn welcome(user: UserProfile) -> Self {
        let content = format!("Hello {}, welcome to the chat room!", user.nickname);
        Self::with_kind(user, MessageKind::Welcome, content)
    }

    pub fn user_enter(user: &UserProfile) -> Self {
        let content = format!("{} joined the chat room", user.nickname);
        Self::with_kind(user.public(), MessageKind::UserEnter, content)
    }

    pub fn user_leave(user: &UserProfile) -> Self {
        let content = format!("{} left the chat room", user.nickname);
        Self::with_kind(user.public(), MessageKind::UserLeave, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::with_kind(UserProfile::system(), MessageKind::Error, content.into())
    }
}

/// Parse a stringified nanosecond epoch; anything else yields `None`
fn parse_send_time(raw: &str) -> Option<DateTime<Utc>> {
    let nanos = raw.trim().parse::<i64>().ok()?;
    Some(DateTime::from_timestamp_nanos(nanos))
}
