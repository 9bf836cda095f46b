//! End-to-end sessions over in-memory duplex streams.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use rlpx_transport::crypto::ecies;
use rlpx_transport::handshake::{AckMessage, AuthMessage};
use rlpx_transport::prelude::*;
use rlpx_transport::transport::FramePart;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::{sleep, timeout};

const BUFFER: usize = 64 * 1024;

async fn establish(
    config: SessionConfig,
) -> (
    Identity,
    Identity,
    Session<DuplexStream>,
    Session<DuplexStream>,
) {
    establish_with(config.clone(), config).await
}

async fn establish_with(
    initiator_config: SessionConfig,
    recipient_config: SessionConfig,
) -> (
    Identity,
    Identity,
    Session<DuplexStream>,
    Session<DuplexStream>,
) {
    let a = Identity::generate();
    let b = Identity::generate();
    let (left, right) = duplex(BUFFER);

    let b_public = *b.public_key();
    let b_clone = b.clone();
    let recipient =
        tokio::spawn(async move { Session::accept(&b_clone, right, &recipient_config).await });

    let initiator = Session::connect(&a, &b_public, left, &initiator_config)
        .await
        .expect("connect");
    let recipient = recipient.await.expect("join").expect("accept");
    (a, b, initiator, recipient)
}

#[tokio::test]
async fn test_ping_pong() {
    let (a, b, alice, bob) = establish(SessionConfig::default()).await;

    assert_eq!(alice.remote_public_key(), b.public_key());
    assert_eq!(bob.remote_public_key(), a.public_key());
    assert_eq!(alice.role(), Role::Initiator);
    assert_eq!(bob.role(), Role::Recipient);

    alice.send(b"ping").await.unwrap();
    assert_eq!(bob.receive().await.unwrap(), b"ping");

    bob.send(b"pong").await.unwrap();
    assert_eq!(alice.receive().await.unwrap(), b"pong");
}

#[tokio::test]
async fn test_legacy_encoding() {
    let config = SessionConfig::builder()
        .handshake_encoding(HandshakeEncoding::Legacy)
        .build();
    let (_, _, alice, bob) = establish(config).await;

    alice.send(b"legacy").await.unwrap();
    assert_eq!(bob.receive().await.unwrap(), b"legacy");
    bob.send(b"ok").await.unwrap();
    assert_eq!(alice.receive().await.unwrap(), b"ok");
}

#[tokio::test]
async fn test_handshake_is_exactly_two_messages() {
    // Drive the recipient side by hand so the wire can be observed.
    let a = Identity::generate();
    let b = Identity::generate();
    let (left, mut right) = duplex(BUFFER);

    let b_public = *b.public_key();
    let connect = tokio::spawn(async move {
        Session::connect(&a, &b_public, left, &SessionConfig::default()).await
    });

    let mut handshake = Handshake::recipient(&b);
    let mut auth = vec![0u8; handshake.initial_read_size()];
    right.read_exact(&mut auth).await.unwrap();
    while let ReadProgress::NeedMore(missing) = handshake.read_auth(&auth).unwrap() {
        let start = auth.len();
        auth.resize(start + missing, 0);
        right.read_exact(&mut auth[start..]).await.unwrap();
    }
    let ack = handshake.write_ack().unwrap();
    right.write_all(&ack).await.unwrap();
    let secrets = handshake.finish().unwrap();

    let alice = connect.await.unwrap().unwrap();
    let mut codec = FrameCodec::new(&secrets);

    alice.send(b"first frame").await.unwrap();
    let mut wire = vec![0u8; 32 + 16 + 16];
    right.read_exact(&mut wire).await.unwrap();
    assert_eq!(codec.decode(&wire).unwrap(), b"first frame");

    let reply = codec.encode(b"reply").unwrap();
    right.write_all(&reply).await.unwrap();
    assert_eq!(alice.receive().await.unwrap(), b"reply");
}

#[tokio::test]
async fn test_many_frames_both_directions() {
    let (_, _, alice, bob) = establish(SessionConfig::default()).await;

    for i in 0..50u32 {
        let payload = vec![i as u8; i as usize * 7];
        alice.send(&payload).await.unwrap();
        assert_eq!(bob.receive().await.unwrap(), payload);

        bob.send(&i.to_be_bytes()).await.unwrap();
        assert_eq!(alice.receive().await.unwrap(), i.to_be_bytes());
    }
}

#[tokio::test]
async fn test_context_id_carried() {
    let (_, _, alice, bob) = establish(SessionConfig::default()).await;

    alice.send_with_context(b"tagged", 0x1234).await.unwrap();
    let frame = bob.receive_frame().await.unwrap();
    assert_eq!(frame.context_id, 0x1234);
    assert_eq!(frame.payload, b"tagged");

    alice.send(b"plain").await.unwrap();
    assert_eq!(bob.receive_frame().await.unwrap().context_id, 0);
}

#[tokio::test]
async fn test_large_payload() {
    let (_, _, alice, bob) = establish(SessionConfig::default()).await;
    let alice = Arc::new(alice);
    let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();

    // Larger than the duplex buffer, so send and receive must overlap.
    let sender = {
        let alice = Arc::clone(&alice);
        let payload = payload.clone();
        tokio::spawn(async move { alice.send(&payload).await })
    };
    assert_eq!(bob.receive().await.unwrap(), payload);
    sender.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_send_and_receive() {
    let (_, _, alice, bob) = establish(SessionConfig::default()).await;
    let alice = Arc::new(alice);
    let bob = Arc::new(bob);

    let sender = {
        let alice = Arc::clone(&alice);
        tokio::spawn(async move {
            for i in 0..100u32 {
                alice.send(&i.to_le_bytes()).await.unwrap();
            }
        })
    };
    let echo = {
        let bob = Arc::clone(&bob);
        tokio::spawn(async move {
            for _ in 0..100u32 {
                let msg = bob.receive().await.unwrap();
                bob.send(&msg).await.unwrap();
            }
        })
    };

    for i in 0..100u32 {
        assert_eq!(alice.receive().await.unwrap(), i.to_le_bytes());
    }
    sender.await.unwrap();
    echo.await.unwrap();
}

#[tokio::test]
async fn test_wrong_peer_key_fails() {
    let a = Identity::generate();
    let b = Identity::generate();
    let c = Identity::generate();
    let (left, right) = duplex(BUFFER);

    let config = SessionConfig::builder()
        .handshake_timeout(Duration::from_secs(2))
        .build();
    let accept_config = config.clone();
    let recipient = tokio::spawn(async move { Session::accept(&b, right, &accept_config).await });

    // Dial expecting C, but B answers: B cannot open the auth packet and
    // hangs up, so the initiator's handshake fails on the closed stream.
    let connected = Session::connect(&a, c.public_key(), left, &config).await;
    assert!(matches!(
        connected,
        Err(SessionError::HandshakeFailed(HandshakeError::Io(
            ErrorKind::UnexpectedEof
        )))
    ));

    let accepted = recipient.await.unwrap();
    assert!(matches!(
        accepted,
        Err(SessionError::HandshakeFailed(HandshakeError::Crypto(
            CryptoError::AuthenticationFailure
        )))
    ));
}

#[tokio::test]
async fn test_handshake_timeout() {
    let a = Identity::generate();
    let b = Identity::generate();
    let (left, _right) = duplex(BUFFER);

    let config = SessionConfig::builder()
        .handshake_timeout(Duration::from_millis(100))
        .build();
    let result = Session::connect(&a, b.public_key(), left, &config).await;
    assert!(matches!(result, Err(SessionError::HandshakeTimeout)));

    let (_left, right) = duplex(BUFFER);
    let result = Session::accept(&b, right, &config).await;
    assert!(matches!(result, Err(SessionError::HandshakeTimeout)));
}

#[tokio::test]
async fn test_garbage_handshake_fails() {
    let b = Identity::generate();
    let (mut left, right) = duplex(BUFFER);

    let accept = tokio::spawn(async move {
        Session::accept(&b, right, &SessionConfig::default()).await
    });

    // Declares a 100-byte EIP-8 packet that is not a valid envelope.
    let mut garbage = vec![0x00, 0x64];
    garbage.extend_from_slice(&[0xaa; 100]);
    garbage.resize(307, 0xbb);
    left.write_all(&garbage).await.unwrap();

    assert!(matches!(
        accept.await.unwrap(),
        Err(SessionError::HandshakeFailed(_))
    ));
}

#[tokio::test]
async fn test_closed_session_rejects_operations() {
    let (_, _, alice, bob) = establish(SessionConfig::default()).await;

    assert!(alice.has_key_material().await);
    alice.close().await.unwrap();
    assert!(alice.is_closed());
    assert!(!alice.has_key_material().await);

    assert!(matches!(alice.send(b"late").await, Err(SessionError::SessionClosed)));
    assert!(matches!(alice.receive().await, Err(SessionError::SessionClosed)));
    alice.close().await.unwrap();

    // The peer sees the stream end and closes too.
    assert!(bob.receive().await.is_err());
    assert!(bob.is_closed());
    assert!(matches!(bob.send(b"x").await, Err(SessionError::SessionClosed)));
}

#[tokio::test]
async fn test_tampered_frame_closes_session() {
    let a = Identity::generate();
    let b = Identity::generate();
    let (left, mut right) = duplex(BUFFER);

    let b_public = *b.public_key();
    let connect = tokio::spawn(async move {
        Session::connect(&a, &b_public, left, &SessionConfig::default()).await
    });

    let mut handshake = Handshake::recipient(&b);
    let mut auth = vec![0u8; handshake.initial_read_size()];
    right.read_exact(&mut auth).await.unwrap();
    while let ReadProgress::NeedMore(missing) = handshake.read_auth(&auth).unwrap() {
        let start = auth.len();
        auth.resize(start + missing, 0);
        right.read_exact(&mut auth[start..]).await.unwrap();
    }
    right.write_all(&handshake.write_ack().unwrap()).await.unwrap();
    let mut codec = FrameCodec::new(&handshake.finish().unwrap());
    let alice = connect.await.unwrap().unwrap();

    let mut wire = codec.encode(b"forged").unwrap();
    let last = wire.len() - 1;
    wire[last] ^= 0x01;
    right.write_all(&wire).await.unwrap();

    let err = alice.receive().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::FrameAuthenticationFailure(FramePart::Body)
    ));
    assert!(err.is_security_error());
    assert!(alice.is_closed());
    assert!(!alice.has_key_material().await);
    assert!(matches!(alice.receive().await, Err(SessionError::SessionClosed)));
}

#[tokio::test]
async fn test_oversized_send_keeps_session() {
    let config = SessionConfig::builder().max_frame_size(1024).build();
    let (_, _, alice, bob) = establish(config).await;

    let err = alice.send(&[0u8; 2048]).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::PayloadTooLarge {
            size: 2048,
            max: 1024
        }
    ));
    assert!(!err.is_fatal());
    assert!(!alice.is_closed());

    alice.send(&[1u8; 1024]).await.unwrap();
    assert_eq!(bob.receive().await.unwrap(), vec![1u8; 1024]);
}

#[tokio::test]
async fn test_oversized_receive_closes_session() {
    let small = SessionConfig::builder().max_frame_size(1024).build();
    let (_, _, alice, bob) = establish_with(SessionConfig::default(), small).await;

    alice.send(&[7u8; 2048]).await.unwrap();
    let err = bob.receive().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Frame(FrameError::TooLarge {
            size: 2048,
            max: 1024
        })
    ));
    assert!(err.is_fatal());
    assert!(bob.is_closed());
    assert!(!bob.has_key_material().await);
    assert!(matches!(bob.receive().await, Err(SessionError::SessionClosed)));
}

#[tokio::test]
async fn test_close_wakes_pending_receive() {
    let (_, _, alice, _bob) = establish(SessionConfig::default()).await;
    let alice = Arc::new(alice);

    let pending = {
        let alice = Arc::clone(&alice);
        tokio::spawn(async move { alice.receive().await })
    };
    sleep(Duration::from_millis(50)).await;
    alice.close().await.unwrap();

    let received = timeout(Duration::from_secs(2), pending)
        .await
        .expect("receive still blocked after close")
        .unwrap();
    assert!(matches!(received, Err(SessionError::SessionClosed)));

    let released = timeout(Duration::from_secs(2), alice.has_key_material())
        .await
        .expect("read half still locked after close");
    assert!(!released);
}

#[tokio::test]
async fn test_close_wakes_pending_send() {
    // A small buffer the peer never drains, so a large send blocks.
    let a = Identity::generate();
    let b = Identity::generate();
    let (left, right) = duplex(4096);

    let b_public = *b.public_key();
    let recipient =
        tokio::spawn(async move { Session::accept(&b, right, &SessionConfig::default()).await });
    let alice = Session::connect(&a, &b_public, left, &SessionConfig::default())
        .await
        .unwrap();
    let _bob = recipient.await.unwrap().unwrap();
    let alice = Arc::new(alice);

    let pending = {
        let alice = Arc::clone(&alice);
        tokio::spawn(async move { alice.send(&[0u8; 64 * 1024]).await })
    };
    sleep(Duration::from_millis(50)).await;

    let closed = timeout(Duration::from_secs(2), alice.close()).await;
    assert!(closed.is_ok(), "close blocked behind pending send");
    let sent = timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
    assert!(matches!(sent, Err(SessionError::SessionClosed)));
    assert!(!alice.has_key_material().await);
}

#[tokio::test]
async fn test_sessions_are_fresh() {
    const TRIALS: usize = 32;

    let a = Identity::generate();
    let b = Identity::generate();

    let mut ephemeral_keys = HashSet::new();
    let mut nonces = HashSet::new();
    let mut secrets = HashSet::new();

    for _ in 0..TRIALS {
        let mut initiator = Handshake::initiator(&a, *b.public_key(), HandshakeEncoding::Legacy);
        let mut recipient = Handshake::recipient(&b);

        let auth = initiator.write_auth().unwrap();
        recipient.read_auth(&auth).unwrap();
        let ack = recipient.write_ack().unwrap();
        initiator.read_ack(&ack).unwrap();
        let established = initiator.finish().unwrap();

        let auth = AuthMessage::decode_legacy(&ecies::open(&b, &auth, &[]).unwrap()).unwrap();
        let ack = AckMessage::decode_legacy(&ecies::open(&a, &ack, &[]).unwrap()).unwrap();
        assert_eq!(&ack.ephemeral_public_key, recipient.ephemeral_public_key());

        assert!(ephemeral_keys.insert(*initiator.ephemeral_public_key()));
        assert!(ephemeral_keys.insert(ack.ephemeral_public_key));
        assert!(nonces.insert(auth.message.nonce));
        assert!(nonces.insert(ack.nonce));
        assert!(secrets.insert(*established.aes_secret()));
        assert!(secrets.insert(*established.mac_secret()));
        assert!(secrets.insert(established.egress_seed()));
        assert!(secrets.insert(established.ingress_seed()));
    }

    assert_eq!(ephemeral_keys.len(), 2 * TRIALS);
    assert_eq!(nonces.len(), 2 * TRIALS);
    assert_eq!(secrets.len(), 4 * TRIALS);
}
