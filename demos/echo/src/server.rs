//! Echo server: accepts RLPx sessions and sends every frame straight back.

use std::net::SocketAddr;
use std::sync::Arc;

use rlpx_transport::{Identity, Session, SessionConfig, SessionError};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::EchoError;

/// Listen on `bind` and serve connections until the process is stopped.
pub async fn run(
    identity: Identity,
    bind: SocketAddr,
    config: SessionConfig,
) -> Result<(), EchoError> {
    let listener = TcpListener::bind(bind).await?;
    info!(
        addr = %listener.local_addr()?,
        public_key = %identity.public_key(),
        "echo server listening"
    );

    let identity = Arc::new(identity);
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;

        let identity = Arc::clone(&identity);
        let config = config.clone();
        tokio::spawn(async move {
            match serve(&identity, stream, &config).await {
                Err(SessionError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    info!(%peer, "peer disconnected");
                }
                Err(err) => warn!(%peer, %err, "connection failed"),
                Ok(()) => {}
            }
        });
    }
}

async fn serve(
    identity: &Identity,
    stream: TcpStream,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    let session = Session::accept(identity, stream, config).await?;
    info!(remote = %session.remote_public_key().short_hex(), "session established");

    loop {
        let frame = session.receive_frame().await?;
        debug!(size = frame.payload.len(), context_id = frame.context_id, "echo");
        session
            .send_with_context(&frame.payload, frame.context_id)
            .await?;
    }
}
