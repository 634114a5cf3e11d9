//! Hub actor implementation
//!
//! The single task that owns the online registry and the offline store.
//! Sessions reach it only through `HubHandle`, which wraps two queues: a
//! control queue (enter, leave, nickname check, user list) and a bounded
//! broadcast queue. No locks needed - the hub is the only writer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::Message;
use crate::offline::OfflineStore;
use crate::types::UserId;
use crate::user::{User, UserProfile};

/// Control requests sent from sessions to the hub
#[derive(Debug)]
pub enum HubCommand {
    /// User joins the online registry
    Enter { user: User },
    /// User leaves; its registry entry is dropped, closing the mailbox
    Leave { uid: UserId, nickname: String },
    /// Is the nickname free right now?
    CanEnterRoom {
        nickname: String,
        reply: oneshot::Sender<bool>,
    },
    /// Snapshot of online users
    ListUsers {
        reply: oneshot::Sender<Vec<UserProfile>>,
    },
}

/// Cloneable entry point to the hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    messages: mpsc::Sender<Arc<Message>>,
}

impl HubHandle {
    pub async fn enter(&self, user: User) -> Result<(), AppError> {
        self.command(HubCommand::Enter { user }).await
    }

    pub async fn leave(&self, profile: &UserProfile) -> Result<(), AppError> {
        self.command(HubCommand::Leave {
            uid: profile.uid,
            nickname: profile.nickname.clone(),
        })
        .await
    }

    /// Queue a message for fan-out
    ///
    /// A full queue is only reported; the call still waits for room.
    pub async fn broadcast(&self, msg: Message) -> Result<(), AppError> {
        if self.messages.capacity() == 0 {
            warn!("Broadcast queue is full, sender will wait");
        }
        self.messages
            .send(Arc::new(msg))
            .await
            .map_err(|_| AppError::HubClosed)
    }

    /// Not atomic with a later `enter`: two callers may both see `true`
    pub async fn can_enter_room(&self, nickname: &str) -> Result<bool, AppError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::CanEnterRoom {
            nickname: nickname.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| AppError::HubClosed)
    }

    /// Online users in no particular order, tokens stripped
    pub async fn list_users(&self) -> Result<Vec<UserProfile>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.command(HubCommand::ListUsers { reply }).await?;
        rx.await.map_err(|_| AppError::HubClosed)
    }

    /// Messages currently waiting in the broadcast queue
    pub fn queued_messages(&self) -> usize {
        self.messages.max_capacity() - self.messages.capacity()
    }

    async fn command(&self, cmd: HubCommand) -> Result<(), AppError> {
        self.commands.send(cmd).await.map_err(|_| AppError::HubClosed)
    }
}

/// The hub actor
///
/// Holds the nickname → user registry and the offline store, and processes
/// requests one at a time.
pub struct Hub {
    /// Online users: nickname -> User
    users: HashMap<String, User>,
    offline: OfflineStore,
    commands: mpsc::Receiver<HubCommand>,
    messages: mpsc::Receiver<Arc<Message>>,
}

impl Hub {
    /// Create the hub and its handle
    ///
    /// `offline_capacity` sizes every offline ring; `queue_len` bounds the
    /// broadcast queue.
    pub fn new(offline_capacity: usize, queue_len: usize) -> (Self, HubHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let (msg_tx, msg_rx) = mpsc::channel(queue_len.max(1));
        let hub = Self {
            users: HashMap::new(),
            offline: OfflineStore::new(offline_capacity),
            commands: cmd_rx,
            messages: msg_rx,
        };
        let handle = HubHandle {
            commands: cmd_tx,
            messages: msg_tx,
        };
        (hub, handle)
    }

    /// Run the hub event loop
    ///
    /// Keeps going until every handle is dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                Some(cmd) = self.commands.recv() => self.handle_command(cmd).await,
                Some(msg) = self.messages.recv() => self.handle_broadcast(msg).await,
                else => break,
            }
        }

        info!("Hub shutting down");
    }

    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Enter { user } => self.handle_enter(user).await,
            HubCommand::Leave { uid, nickname } => self.handle_leave(uid, &nickname),
            HubCommand::CanEnterRoom { nickname, reply } => {
                let _ = reply.send(!self.users.contains_key(&nickname));
            }
            HubCommand::ListUsers { reply } => {
                let users = self.users.values().map(|u| u.profile.public()).collect();
                let _ = reply.send(users);
            }
        }
    }

    /// Register the user (overwriting any same-nickname entry) and replay
    async fn handle_enter(&mut self, user: User) {
        info!("User {} ({}) entered", user.nickname(), user.uid());

        let replay = self.offline.take_replay(&user);
        for msg in replay {
            if user.send(msg).await.is_err() {
                debug!("Mailbox of {} closed during replay", user.nickname());
                break;
            }
        }

        if let Some(previous) = self.users.insert(user.nickname().to_string(), user) {
            warn!(
                "Nickname {} was already online as {}, entry replaced",
                previous.nickname(),
                previous.uid()
            );
        }
        debug!("Online users: {}", self.users.len());
    }

    fn handle_leave(&mut self, uid: UserId, nickname: &str) {
        // Dropping the entry drops the last mailbox sender.
        if self.users.remove(nickname).is_some() {
            info!("User {} ({}) left", nickname, uid);
        }
        debug!("Online users: {}", self.users.len());
    }

    /// Deliver to everyone but the author, then persist
    async fn handle_broadcast(&mut self, msg: Arc<Message>) {
        debug!("Broadcast queue length: {}", self.messages.len());

        for user in self.users.values() {
            if user.uid() == msg.user.uid {
                continue;
            }
            // Blocks the whole loop while this mailbox is full.
            if user.send(Arc::clone(&msg)).await.is_err() {
                debug!("Mailbox of {} closed, message dropped", user.nickname());
            }
        }

        self.offline.save(&msg);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::filter::ContentFilter;
    use crate::message::MessageKind;
    use crate::user::Mailbox;

    fn spawn_hub(capacity: usize) -> HubHandle {
        let (hub, handle) = Hub::new(capacity, 8);
        tokio::spawn(hub.run());
        handle
    }

    fn profile(uid: u64, nickname: &str) -> UserProfile {
        UserProfile::new(
            UserId(uid),
            nickname.to_string(),
            "127.0.0.1:0".to_string(),
            "tok".to_string(),
        )
    }

    fn user(uid: u64, nickname: &str, is_new: bool) -> (User, Mailbox) {
        User::new(profile(uid, nickname), is_new, 16)
    }

    fn text(uid: u64, nickname: &str, content: &str) -> Message {
        let mut msg = Message::normal(profile(uid, nickname).public(), content.to_string(), None);
        msg.ats = ContentFilter::extract_mentions(content);
        msg
    }

    /// Enter and wait until the hub has registered the user
    async fn enter(hub: &HubHandle, user: User) {
        hub.enter(user).await.unwrap();
        hub.list_users().await.unwrap();
    }

    async fn recv(mailbox: &mut Mailbox) -> Arc<Message> {
        tokio::time::timeout(Duration::from_secs(1), mailbox.recv())
            .await
            .expect("timed out waiting for message")
            .expect("mailbox closed")
    }

    #[tokio::test]
    async fn test_enter_and_leave_registry_size() {
        let hub = spawn_hub(4);
        let (alice, _a) = user(1, "alice", true);
        let (bob, _b) = user(2, "bob", true);
        let bob_profile = bob.profile.clone();

        hub.enter(alice).await.unwrap();
        hub.enter(bob).await.unwrap();
        assert_eq!(hub.list_users().await.unwrap().len(), 2);

        hub.leave(&bob_profile).await.unwrap();
        assert_eq!(hub.list_users().await.unwrap().len(), 1);

        // Leaving twice changes nothing
        hub.leave(&bob_profile).await.unwrap();
        let users = hub.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].nickname, "alice");
        assert!(users[0].token.is_none());
    }

    #[tokio::test]
    async fn test_can_enter_room() {
        let hub = spawn_hub(4);
        assert!(hub.can_enter_room("alice").await.unwrap());

        let (alice, _a) = user(1, "alice", true);
        let alice_profile = alice.profile.clone();
        hub.enter(alice).await.unwrap();
        assert!(!hub.can_enter_room("alice").await.unwrap());

        hub.leave(&alice_profile).await.unwrap();
        assert!(hub.can_enter_room("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_then_enter_is_not_atomic() {
        let hub = spawn_hub(4);
        assert!(hub.can_enter_room("twin").await.unwrap());
        assert!(hub.can_enter_room("twin").await.unwrap());

        let (first, mut first_mb) = user(1, "twin", true);
        let (second, _second_mb) = user(2, "twin", true);
        hub.enter(first).await.unwrap();
        enter(&hub, second).await;

        let users = hub.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].uid, UserId(2));
        // The overwritten entry held the only sender
        assert!(first_mb.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = spawn_hub(4);
        let (alice, mut alice_mb) = user(1, "alice", true);
        let (bob, mut bob_mb) = user(2, "bob", true);
        enter(&hub, alice).await;
        enter(&hub, bob).await;

        hub.broadcast(text(2, "bob", "hello @alice")).await.unwrap();
        let msg = recv(&mut alice_mb).await;
        assert_eq!(msg.content, "hello @alice");
        assert_eq!(msg.ats, vec!["@alice"]);

        hub.broadcast(text(1, "alice", "hi bob")).await.unwrap();
        assert_eq!(recv(&mut bob_mb).await.content, "hi bob");
        assert!(bob_mb.try_recv().is_none());
        assert!(alice_mb.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_by_uid_not_nickname() {
        let hub = spawn_hub(4);
        let (carol, mut carol_mb) = user(5, "carol", true);
        enter(&hub, carol).await;

        // Same nickname, different uid: still delivered
        hub.broadcast(text(6, "carol", "impostor")).await.unwrap();
        assert_eq!(recv(&mut carol_mb).await.content, "impostor");

        // Same uid: never delivered
        hub.broadcast(text(5, "carol", "self")).await.unwrap();
        hub.broadcast(text(7, "dan", "after")).await.unwrap();
        assert_eq!(recv(&mut carol_mb).await.content, "after");
    }

    #[tokio::test]
    async fn test_broadcast_preserves_order() {
        let hub = spawn_hub(8);
        let (alice, mut alice_mb) = user(1, "alice", true);
        enter(&hub, alice).await;

        for i in 0..5 {
            hub.broadcast(text(2, "bob", &format!("m{i}"))).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(recv(&mut alice_mb).await.content, format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn test_leave_closes_mailbox() {
        let hub = spawn_hub(4);
        let (alice, mut alice_mb) = user(1, "alice", true);
        let alice_profile = alice.profile.clone();
        enter(&hub, alice).await;
        hub.leave(&alice_profile).await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(1), alice_mb.recv()).await;
        assert!(closed.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_replays_mentions_once() {
        let hub = spawn_hub(4);
        let (alice, mut alice_mb) = user(1, "alice", true);
        let alice_profile = alice.profile.clone();
        let (bob, _bob_mb) = user(2, "bob", true);
        enter(&hub, alice).await;
        enter(&hub, bob).await;

        hub.broadcast(text(2, "bob", "hello @alice")).await.unwrap();
        assert_eq!(recv(&mut alice_mb).await.content, "hello @alice");
        hub.leave(&alice_profile).await.unwrap();

        // Reconnect with the recovered identity: recent ring, then mentions
        let (alice, mut alice_mb) = user(1, "alice", false);
        enter(&hub, alice).await;
        assert_eq!(recv(&mut alice_mb).await.content, "hello @alice");
        assert_eq!(recv(&mut alice_mb).await.content, "hello @alice");
        assert!(alice_mb.try_recv().is_none());

        // Mentions were consumed by the previous entry
        hub.leave(&alice_profile).await.unwrap();
        let (alice, mut alice_mb) = user(1, "alice", false);
        enter(&hub, alice).await;
        assert_eq!(recv(&mut alice_mb).await.kind, MessageKind::Normal);
        assert!(alice_mb.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_only_normal_messages_replayed() {
        let hub = spawn_hub(4);
        let (watcher, mut watcher_mb) = user(9, "watcher", true);
        enter(&hub, watcher).await;

        hub.broadcast(Message::user_enter(&profile(2, "bob"))).await.unwrap();
        hub.broadcast(text(2, "bob", "kept")).await.unwrap();
        recv(&mut watcher_mb).await;
        recv(&mut watcher_mb).await;

        let (carol, mut carol_mb) = user(3, "carol", true);
        enter(&hub, carol).await;

        let msg = carol_mb.try_recv().expect("replayed message");
        assert_eq!(msg.content, "kept");
        assert!(carol_mb.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_queued_messages_and_shutdown() {
        let (hub, handle) = Hub::new(4, 2);
        handle.broadcast(text(1, "a", "x")).await.unwrap();
        assert_eq!(handle.queued_messages(), 1);

        let task = tokio::spawn(hub.run());
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
