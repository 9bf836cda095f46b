//! Encrypted sessions over an async byte stream.
//!
//! [`Session::connect`] and [`Session::accept`] drive the handshake on the
//! stream, then split it into a read half and a write half, each with its own
//! side of the frame codec. One task may send while another receives; sends
//! and receives are each serialized.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::FRAME_PREFIX_SIZE;
use crate::crypto::{Identity, PublicKey};
use crate::handshake::{Handshake, HandshakeError, ReadProgress, Role, SessionSecrets};

use super::config::SessionConfig;
use super::error::{SessionError, SessionResult};
use super::frame::{Frame, FrameError, FrameReader, FrameWriter};

struct ReadSide<S> {
    io: ReadHalf<S>,
    codec: Option<FrameReader>,
}

struct WriteSide<S> {
    io: WriteHalf<S>,
    codec: Option<FrameWriter>,
}

/// An established, authenticated session.
///
/// Methods take `&self`, so a session can be shared across tasks in an
/// `Arc`. After [`close`](Self::close), or any fatal error, every operation
/// fails with [`SessionError::SessionClosed`]; calls already waiting on the
/// stream are woken and fail the same way.
///
/// `receive` is not cancellation safe: dropping it mid-frame leaves the
/// stream desynchronized.
pub struct Session<S> {
    role: Role,
    remote: PublicKey,
    reader: Mutex<ReadSide<S>>,
    writer: Mutex<WriteSide<S>>,
    closed: watch::Sender<bool>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Dial: run the handshake as initiator towards `remote`.
    pub async fn connect(
        local: &Identity,
        remote: &PublicKey,
        mut stream: S,
        config: &SessionConfig,
    ) -> SessionResult<Self> {
        let handshake = Handshake::initiator(local, *remote, config.handshake_encoding)
            .with_version(config.protocol_version);

        let secrets = timeout(config.handshake_timeout, initiate(handshake, &mut stream))
            .await
            .map_err(|_| {
                warn!(remote = %remote.short_hex(), "handshake timed out");
                SessionError::HandshakeTimeout
            })??;

        Ok(Self::established(stream, &secrets, config))
    }

    /// Accept: run the handshake as recipient. The peer's identity is
    /// learned from its auth message.
    pub async fn accept(
        local: &Identity,
        mut stream: S,
        config: &SessionConfig,
    ) -> SessionResult<Self> {
        let handshake = Handshake::recipient(local).with_version(config.protocol_version);

        let secrets = timeout(config.handshake_timeout, respond(handshake, &mut stream))
            .await
            .map_err(|_| {
                warn!("handshake timed out");
                SessionError::HandshakeTimeout
            })??;

        Ok(Self::established(stream, &secrets, config))
    }

    fn established(stream: S, secrets: &SessionSecrets, config: &SessionConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);
        let reader = FrameReader::new(secrets).with_max_frame_size(config.max_frame_size);
        let writer = FrameWriter::new(secrets).with_max_frame_size(config.max_frame_size);

        debug!(
            role = ?secrets.role(),
            remote = %secrets.remote_public_key().short_hex(),
            "session established"
        );

        Self {
            role: secrets.role(),
            remote: *secrets.remote_public_key(),
            reader: Mutex::new(ReadSide {
                io: read_half,
                codec: Some(reader),
            }),
            writer: Mutex::new(WriteSide {
                io: write_half,
                codec: Some(writer),
            }),
            closed,
        }
    }

    /// Our side of the handshake.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The peer's authenticated long-term key.
    pub fn remote_public_key(&self) -> &PublicKey {
        &self.remote
    }

    /// Check if the session has been closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Send one payload in one frame.
    pub async fn send(&self, payload: &[u8]) -> SessionResult<()> {
        self.send_with_context(payload, 0).await
    }

    /// Send one payload with a context tag in the frame header.
    ///
    /// A payload over the frame size limit fails with
    /// [`SessionError::PayloadTooLarge`] and leaves the session open.
    pub async fn send_with_context(&self, payload: &[u8], context_id: u16) -> SessionResult<()> {
        self.ensure_open()?;

        let mut guard = self.writer.lock().await;
        let side = &mut *guard;
        if self.is_closed() {
            side.codec = None;
            return Err(SessionError::SessionClosed);
        }
        let codec = side.codec.as_mut().ok_or(SessionError::SessionClosed)?;

        let frame = codec.write_frame(payload, context_id).map_err(|err| match err {
            FrameError::TooLarge { size, max } => SessionError::PayloadTooLarge { size, max },
            other => SessionError::from(other),
        })?;

        let write = async {
            match side.io.write_all(&frame).await {
                Ok(()) => side.io.flush().await,
                Err(err) => Err(err),
            }
        };
        let result = self.until_closed(write).await;

        match result {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                warn!(error = %err, "send failed, closing session");
                side.codec = None;
                self.fail();
                Err(err.into())
            }
            None => {
                side.codec = None;
                Err(SessionError::SessionClosed)
            }
        }
    }

    /// Receive the next payload.
    pub async fn receive(&self) -> SessionResult<Vec<u8>> {
        self.receive_frame().await.map(|frame| frame.payload)
    }

    /// Receive the next frame, with its context tag.
    ///
    /// Any failure, including a MAC mismatch or an oversized frame, closes
    /// the session.
    pub async fn receive_frame(&self) -> SessionResult<Frame> {
        self.ensure_open()?;

        let mut guard = self.reader.lock().await;
        let side = &mut *guard;
        if self.is_closed() {
            side.codec = None;
            return Err(SessionError::SessionClosed);
        }
        let codec = side.codec.as_mut().ok_or(SessionError::SessionClosed)?;

        let result = self.until_closed(read_frame(&mut side.io, codec)).await;

        match result {
            Some(Ok(frame)) if !self.is_closed() => Ok(frame),
            Some(Err(err)) if !self.is_closed() => {
                warn!(error = %err, "receive failed, closing session");
                side.codec = None;
                self.fail();
                Err(err)
            }
            _ => {
                side.codec = None;
                Err(SessionError::SessionClosed)
            }
        }
    }

    /// Close the session and release its key material. Idempotent.
    ///
    /// Pending sends and receives are woken and fail with `SessionClosed`,
    /// dropping their codec halves as they return.
    pub async fn close(&self) -> SessionResult<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }

        if let Ok(mut reader) = self.reader.try_lock() {
            reader.codec = None;
        }

        let mut writer = self.writer.lock().await;
        writer.codec = None;
        let result = writer.io.shutdown().await;
        debug!(remote = %self.remote.short_hex(), "session closed");
        result.map_err(SessionError::from)
    }

    /// Check if either direction still holds key material.
    pub async fn has_key_material(&self) -> bool {
        self.reader.lock().await.codec.is_some() || self.writer.lock().await.codec.is_some()
    }

    /// Run `io` unless the session closes first, in which case `None`.
    async fn until_closed<F: Future>(&self, io: F) -> Option<F::Output> {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            output = io => Some(output),
            _ = async { closed.wait_for(|closed| *closed).await.is_ok() } => None,
        }
    }

    /// Mark closed after a fatal error, waking pending calls, and drop
    /// whichever codec half is not in use.
    fn fail(&self) {
        self.closed.send_replace(true);
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.codec = None;
        }
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.codec = None;
        }
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.is_closed() {
            Err(SessionError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("remote", &self.remote)
            .field("closed", &*self.closed.borrow())
            .finish_non_exhaustive()
    }
}

async fn initiate<S>(
    mut handshake: Handshake,
    stream: &mut S,
) -> Result<SessionSecrets, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let auth = handshake.write_auth()?;
    stream.write_all(&auth).await?;
    stream.flush().await?;

    let initial = handshake.initial_read_size();
    read_packet(stream, initial, |packet| handshake.read_ack(packet)).await?;
    handshake.finish()
}

async fn respond<S>(
    mut handshake: Handshake,
    stream: &mut S,
) -> Result<SessionSecrets, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let initial = handshake.initial_read_size();
    read_packet(stream, initial, |packet| handshake.read_auth(packet)).await?;

    let ack = handshake.write_ack()?;
    stream.write_all(&ack).await?;
    stream.flush().await?;
    handshake.finish()
}

/// Read one handshake packet, growing the buffer until `step` accepts it.
async fn read_packet<S, F>(
    stream: &mut S,
    initial: usize,
    mut step: F,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> Result<ReadProgress, HandshakeError>,
{
    let mut packet = vec![0u8; initial];
    stream.read_exact(&mut packet).await?;

    loop {
        match step(&packet)? {
            ReadProgress::Complete => return Ok(()),
            ReadProgress::NeedMore(missing) => {
                let start = packet.len();
                packet.resize(start + missing, 0);
                stream.read_exact(&mut packet[start..]).await?;
            }
        }
    }
}

async fn read_frame<R>(io: &mut R, codec: &mut FrameReader) -> SessionResult<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; FRAME_PREFIX_SIZE];
    io.read_exact(&mut prefix).await?;
    let header = codec.read_header(&prefix)?;

    let mut body = vec![0u8; header.body_wire_len()];
    io.read_exact(&mut body).await?;
    let payload = codec.read_body(&header, &body)?;

    Ok(Frame {
        context_id: header.context_id,
        payload,
    })
}
