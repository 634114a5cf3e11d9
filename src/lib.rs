//! In-memory chat room hub library
//!
//! Tracks online users, relays messages between them and replays missed
//! messages to reconnecting or mentioned users.
//!
//! # Features
//! - WebSocket and line-oriented TCP transports
//! - Reconnection tokens (HMAC-SHA256) that keep a user's id stable
//! - Offline replay: recent history plus per-user `@mention` history
//! - Forbidden-word masking
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the single task owning the online registry and offline store
//! - Each connection runs a `Session` that talks to the hub via `HubHandle`
//! - Each user has a bounded mailbox drained by its connection's write task
//! - No locks needed - all hub state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chatroom_hub::{handle_connection, Authenticator, ContentFilter, Hub, SessionContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:2066").await.unwrap();
//!     let (hub, handle) = Hub::new(10, 8);
//!     tokio::spawn(hub.run());
//!
//!     let ctx = SessionContext {
//!         hub: handle,
//!         auth: Arc::new(Authenticator::new("secret")),
//!         filter: Arc::new(ContentFilter::default()),
//!         mailbox_capacity: 32,
//!     };
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, ctx.clone()));
//!     }
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod hub;
pub mod message;
pub mod offline;
pub mod session;
pub mod tcp;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use auth::{Authenticator, Credentials};
pub use config::Config;
pub use error::{AppError, AuthError, SendError};
pub use filter::ContentFilter;
pub use handler::handle_connection;
pub use hub::{Hub, HubCommand, HubHandle};
pub use message::{ClientMessage, Message, MessageKind};
pub use offline::{OfflineStore, RingBuffer};
pub use session::{Session, SessionContext, SessionState};
pub use tcp::handle_tcp_connection;
pub use types::UserId;
pub use user::{Mailbox, User, UserProfile};
