//! Line-oriented TCP transport
//!
//! The first line is `nickname [token]`, every later line is message text.
//! Outbound messages are written as JSON lines. Each read is bounded by the
//! idle timeout; a silent connection is dropped.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::Message;
use crate::session::{Session, SessionContext};

/// Handle one TCP client until it disconnects or idles out
pub async fn handle_tcp_connection(
    stream: TcpStream,
    ctx: SessionContext,
    idle: Duration,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!("New TCP line connection from {}", peer_addr);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let first = match timeout(idle, lines.next_line()).await {
        Ok(Ok(Some(line))) => line,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(AppError::IdleTimeout),
    };
    let mut parts = first.split_whitespace();
    let nickname = parts.next().unwrap_or_default();
    let token = parts.next();

    if !ctx.hub.can_enter_room(nickname).await? {
        warn!("Nickname already online: {}", nickname);
        write_json_line(&mut writer, &Message::error("nickname already online")).await?;
        return Ok(());
    }

    let (mut session, mut mailbox) =
        match Session::authenticate(ctx, nickname, token, peer_addr.clone()) {
            Ok(pair) => pair,
            Err(AppError::InvalidNickname(nickname)) => {
                warn!("Nickname illegal: {:?}", nickname);
                write_json_line(&mut writer, &Message::error("nickname length must be 2-20"))
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
    let nickname = session.profile().nickname.clone();

    let write_task = tokio::spawn(async move {
        while let Some(msg) = mailbox.recv().await {
            if let Err(e) = write_json_line(&mut writer, &msg).await {
                debug!("TCP write failed, ending write task: {}", e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    session.enter().await?;

    let result = loop {
        match timeout(idle, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = session.relay(&line, None).await {
                    break Err(e);
                }
            }
            Ok(Ok(None)) => break Ok(()),
            Ok(Err(e)) => break Err(AppError::from(e)),
            Err(_) => {
                info!("{} idle for {:?}, kicking", nickname, idle);
                break Err(AppError::IdleTimeout);
            }
        }
    };

    session.leave().await?;
    let _ = write_task.await;

    match result {
        Ok(()) | Err(AppError::IdleTimeout) => {
            info!("{} disconnected from {}", nickname, peer_addr);
            Ok(())
        }
        Err(e) => {
            error!("Read from {} failed: {}", nickname, e);
            Err(e)
        }
    }
}

async fn write_json_line(writer: &mut OwnedWriteHalf, msg: &Message) -> Result<(), AppError> {
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}
