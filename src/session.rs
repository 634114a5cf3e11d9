//! Session lifecycle
//!
//! One `Session` per connected user, independent of the transport. The
//! transport drives it: `authenticate`, `enter`, `receive` per inbound
//! frame, `leave`. Outbound delivery happens by draining the `Mailbox`
//! returned from `authenticate`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::error::AppError;
use crate::filter::ContentFilter;
use crate::hub::HubHandle;
use crate::message::{ClientMessage, Message};
use crate::user::{Mailbox, User, UserProfile};

/// Allowed nickname length, in characters
pub const NICKNAME_MIN_LEN: usize = 2;
/// Upper nickname bound, counted in characters rather than bytes
///
/// A 20-character CJK nickname is accepted. This matches the unit the
/// `@mention` pattern counts in.
pub const NICKNAME_MAX_LEN: usize = 20;

/// Shared collaborators every session needs
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub hub: HubHandle,
    pub auth: Arc<Authenticator>,
    pub filter: Arc<ContentFilter>,
    pub mailbox_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, no session yet
    ///
    /// Only the transport is ever in this phase; `Session::authenticate`
    /// hands back a session already in `Authenticating`.
    Connecting,
    /// Identity resolved, not yet registered with the hub
    Authenticating,
    Active,
    Leaving,
    /// Left the hub; the mailbox is closed
    Closed,
}

#[derive(Debug)]
pub struct Session {
    /// Own profile, token included
    profile: UserProfile,
    /// Registry entry waiting to be handed to the hub
    pending: Option<User>,
    is_new: bool,
    state: SessionState,
    ctx: SessionContext,
}

/// Check the nickname length bounds
pub fn validate_nickname(nickname: &str) -> Result<(), AppError> {
    let len = nickname.chars().count();
    if (NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len) {
        Ok(())
    } else {
        Err(AppError::InvalidNickname(nickname.to_string()))
    }
}

impl Session {
    /// Build a session for a connecting user
    ///
    /// A valid `token` recovers the user's previous id; otherwise a new id
    /// and token are issued.
    pub fn authenticate(
        ctx: SessionContext,
        nickname: &str,
        token: Option<&str>,
        addr: String,
    ) -> Result<(Self, Mailbox), AppError> {
        validate_nickname(nickname)?;

        let creds = ctx.auth.authenticate(nickname, token);
        let profile = UserProfile::new(creds.uid, nickname.to_string(), addr, creds.token);
        let (user, mailbox) = User::new(profile.clone(), creds.is_new, ctx.mailbox_capacity);

        debug!(
            "Authenticated {} as {} (new: {})",
            nickname, creds.uid, creds.is_new
        );

        let session = Self {
            profile,
            pending: Some(user),
            is_new: creds.is_new,
            state: SessionState::Authenticating,
            ctx,
        };
        Ok((session, mailbox))
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the identity was minted for this session
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Greet the user, announce them and register with the hub
    pub async fn enter(&mut self) -> Result<(), AppError> {
        let Some(user) = self.pending.take() else {
            return Ok(());
        };

        if user
            .send(Arc::new(Message::welcome(self.profile.clone())))
            .await
            .is_err()
        {
            debug!("Mailbox of {} closed before welcome", self.profile.nickname);
        }
        self.ctx.hub.broadcast(Message::user_enter(&self.profile)).await?;
        self.ctx.hub.enter(user).await?;

        self.state = SessionState::Active;
        info!("User {} joins chat", self.profile.nickname);
        Ok(())
    }

    /// Handle one inbound JSON frame
    pub async fn receive(&self, frame: &str) -> Result<(), AppError> {
        let msg: ClientMessage = serde_json::from_str(frame)?;
        self.relay(&msg.content, msg.send_time.as_deref()).await
    }

    /// Filter `content`, tag mentions and hand it to the hub
    pub async fn relay(&self, content: &str, send_time: Option<&str>) -> Result<(), AppError> {
        let content = self.ctx.filter.filter_sensitive(content);
        let ats = ContentFilter::extract_mentions(&content);

        let mut msg = Message::normal(self.profile.public(), content, send_time);
        msg.ats = ats;
        self.ctx.hub.broadcast(msg).await
    }

    /// Deregister and announce the departure
    ///
    /// The hub drops the mailbox sender, which ends the send task.
    pub async fn leave(&mut self) -> Result<(), AppError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Leaving;

        if self.pending.take().is_none() {
            self.ctx.hub.leave(&self.profile).await?;
            self.ctx
                .hub
                .broadcast(Message::user_leave(&self.profile))
                .await?;
            info!("User {} leaves chat", self.profile.nickname);
        }

        self.state = SessionState::Closed;
        Ok(())
    }
}
