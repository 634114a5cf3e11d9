//! Chat room hub - Entry Point
//!
//! Loads configuration, starts the hub actor and accepts WebSocket (and
//! optionally line-oriented TCP) connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatroom_hub::{
    handle_connection, handle_tcp_connection, Authenticator, Config, ContentFilter, Hub,
    SessionContext,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chatroom_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chatroom_hub=info")),
        )
        .init();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let config = Config::from_env()?;

    // Create the hub actor and start it
    let (hub, handle) = Hub::new(config.offline_num, config.message_queue_len);
    tokio::spawn(hub.run());

    let ctx = SessionContext {
        hub: handle,
        auth: Arc::new(Authenticator::new(config.token_secret.as_bytes())),
        filter: Arc::new(ContentFilter::new(config.sensitive_words.iter().cloned())),
        mailbox_capacity: config.mailbox_capacity,
    };

    if let Some(tcp_addr) = &config.tcp_addr {
        let listener = TcpListener::bind(tcp_addr).await?;
        info!("TCP line server listening on {}", tcp_addr);
        tokio::spawn(serve_tcp(listener, ctx.clone(), config.tcp_idle_timeout));
    }

    let listener = TcpListener::bind(&config.addr).await?;
    info!("WebSocket chat hub listening on {}", config.addr);

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn serve_tcp(listener: TcpListener, ctx: SessionContext, idle: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New TCP line connection from {}", addr);
                let ctx = ctx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_tcp_connection(stream, ctx, idle).await {
                        error!("TCP connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept TCP connection: {}", e);
            }
        }
    }
}
