//! WebSocket connection handler
//!
//! Handles individual WebSocket clients: handshake (nickname and token come
//! from the request query string), then a read loop feeding the session and
//! a write task draining the user's mailbox.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::Message;
use crate::session::{Session, SessionContext};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// Connection parameters from the handshake URL
#[derive(Debug, Default, PartialEq, Eq)]
pub struct JoinParams {
    pub nickname: String,
    pub token: Option<String>,
}

impl JoinParams {
    /// Parse `nickname` and `token` out of a URL query string
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "nickname" => params.nickname = value.into_owned(),
                "token" if !value.is_empty() => params.token = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake and runs the session until the client
/// goes away.
pub async fn handle_connection(stream: TcpStream, ctx: SessionContext) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, capturing the query string
    let mut query = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        query = req.uri().query().map(str::to_string);
        Ok(resp)
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let params = JoinParams::from_query(query.as_deref());

    if !ctx.hub.can_enter_room(&params.nickname).await? {
        warn!("Nickname already online: {}", params.nickname);
        reject(&mut ws_sender, "nickname already online").await;
        return Ok(());
    }

    let (mut session, mut mailbox) = match Session::authenticate(
        ctx,
        &params.nickname,
        params.token.as_deref(),
        peer_addr.clone(),
    ) {
        Ok(pair) => pair,
        Err(AppError::InvalidNickname(nickname)) => {
            warn!("Nickname illegal: {:?}", nickname);
            reject(&mut ws_sender, "nickname length must be 2-20").await;
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let nickname = session.profile().nickname.clone();

    // Spawn write task (mailbox -> WebSocket); hands the sink back once the
    // mailbox closes so the close frame can be sent afterwards
    let write_task = tokio::spawn(async move {
        while let Some(msg) = mailbox.recv().await {
            match serde_json::to_string(msg.as_ref()) {
                Ok(json) => {
                    if ws_sender.send(WsMessage::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        ws_sender
    });

    session.enter().await?;

    // Read loop (WebSocket -> hub)
    let result = async {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => session.receive(&text).await?,
                Ok(WsMessage::Close(_)) => {
                    debug!("{} sent close frame", nickname);
                    break;
                }
                Ok(_) => {
                    // Ping/pong handled by tungstenite, binary ignored
                }
                Err(e) if is_clean_close(&e) => {
                    debug!("{} went away: {}", nickname, e);
                    break;
                }
                Err(e) => return Err(AppError::from(e)),
            }
        }
        Ok::<(), AppError>(())
    }
    .await;

    session.leave().await?;

    let frame = match &result {
        Ok(()) => CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        },
        Err(e) => {
            error!("Read from {} failed: {}", nickname, e);
            CloseFrame {
                code: CloseCode::Error,
                reason: "read from client error".into(),
            }
        }
    };
    if let Ok(mut ws_sender) = write_task.await {
        let _ = ws_sender.send(WsMessage::Close(Some(frame))).await;
    }

    info!("{} disconnected from {}", nickname, peer_addr);
    Ok(())
}

/// Whether a read error just means the peer hung up
///
/// A client that drops its TCP connection without a close frame counts as
/// leaving, not as a failed read.
fn is_clean_close(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

/// Tell the client why it was refused and close with a protocol error
async fn reject(ws_sender: &mut WsSink, reason: &str) {
    if let Ok(json) = serde_json::to_string(&Message::error(reason)) {
        let _ = ws_sender.send(WsMessage::Text(json.into())).await;
    }
    let frame = CloseFrame {
        code: CloseCode::Protocol,
        reason: reason.to_string().into(),
    };
    let _ = ws_sender.send(WsMessage::Close(Some(frame))).await;
}
