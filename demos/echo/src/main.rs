//! RLPx Echo Demo
//!
//! A TCP echo server and client speaking RLPx sessions.
//!
//! Environment variables:
//! - RLPX_MODE: "server" or "client" (default client)
//! - RLPX_SECRET_KEY: hex secret key (generated if unset)
//! - RLPX_BIND_ADDR: listen address (server only, default 0.0.0.0:30303)
//! - RLPX_PEER_ADDR: server address (client only, default 127.0.0.1:30303)
//! - RLPX_PEER_PUBLIC_KEY: hex public key of the server (client only)
//! - RUST_LOG: tracing filter, e.g. `rlpx_transport=debug`
//!
//! Client arguments are sent as messages, one frame each (default "ping").

mod client;
mod server;

use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;

use rlpx_transport::{CryptoError, Identity, PublicKey, SessionConfig, SessionError};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Errors surfaced by the demo.
#[derive(Debug, Error)]
pub enum EchoError {
    /// Required environment variable not set.
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    /// Environment variable could not be parsed.
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// Key parsing failed.
    #[error("key error: {0}")]
    Crypto(#[from] CryptoError),

    /// Session failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Socket error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = setup() {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "rlpx-echo failed");
            ExitCode::FAILURE
        }
    }
}

fn setup() -> Result<(), tracing_subscriber::filter::ParseError> {
    tracing_subscriber::registry()
        .with(EnvFilter::builder().parse(format!(
            "rlpx_echo=info,{}",
            env::var("RUST_LOG").unwrap_or_default()
        ))?)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

async fn run() -> Result<(), EchoError> {
    let identity = load_identity()?;
    let config = SessionConfig::default();

    match env::var("RLPX_MODE").as_deref() {
        Ok("server") => {
            let bind = parse_addr("RLPX_BIND_ADDR", "0.0.0.0:30303")?;
            server::run(identity, bind, config).await
        }
        Ok("client") | Err(_) => {
            let peer_addr = parse_addr("RLPX_PEER_ADDR", "127.0.0.1:30303")?;
            let peer_key = env::var("RLPX_PEER_PUBLIC_KEY")
                .map_err(|_| EchoError::MissingVar("RLPX_PEER_PUBLIC_KEY"))?;
            let peer_key = PublicKey::from_hex(&peer_key)?;

            let mut messages: Vec<String> = env::args().skip(1).collect();
            if messages.is_empty() {
                messages.push("ping".to_string());
            }
            client::run(identity, peer_addr, peer_key, config, messages).await
        }
        Ok(other) => Err(EchoError::Invalid {
            name: "RLPX_MODE",
            reason: format!("expected \"server\" or \"client\", got {other:?}"),
        }),
    }
}

fn load_identity() -> Result<Identity, EchoError> {
    match env::var("RLPX_SECRET_KEY") {
        Ok(secret) => Ok(Identity::from_hex(&secret)?),
        Err(_) => {
            let identity = Identity::generate();
            info!(public_key = %identity.public_key(), "generated ephemeral node identity");
            Ok(identity)
        }
    }
}

fn parse_addr(name: &'static str, default: &str) -> Result<SocketAddr, EchoError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|err: std::net::AddrParseError| EchoError::Invalid {
        name,
        reason: err.to_string(),
    })
}
