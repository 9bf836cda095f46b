//! Echo client: sends each message and prints the reply.

use std::net::SocketAddr;

use rlpx_transport::{Identity, PublicKey, Session, SessionConfig};
use tokio::net::TcpStream;
use tracing::info;

use crate::EchoError;

/// Connect to the server, echo `messages`, then close.
pub async fn run(
    identity: Identity,
    peer_addr: SocketAddr,
    peer_key: PublicKey,
    config: SessionConfig,
    messages: Vec<String>,
) -> Result<(), EchoError> {
    let stream = TcpStream::connect(peer_addr).await?;
    stream.set_nodelay(true)?;

    let session = Session::connect(&identity, &peer_key, stream, &config).await?;
    info!(%peer_addr, remote = %peer_key.short_hex(), "session established");

    for message in &messages {
        session.send(message.as_bytes()).await?;
        let reply = session.receive().await?;
        println!("{}", String::from_utf8_lossy(&reply));
    }

    session.close().await?;
    Ok(())
}
