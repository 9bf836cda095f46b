//! RLPx Key Generation Utility
//!
//! Generates secp256k1 node identities for the echo demo.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p rlpx-echo --bin keygen
//! ```
//!
//! # Output Format
//!
//! Keys are printed in hex, ready to use as environment variables:
//! - `RLPX_SECRET_KEY` - the node's secret key (keep secret!)
//! - `RLPX_PEER_PUBLIC_KEY` - the node's public key (share with peers)

use std::env;

use rlpx_transport::Identity;

fn main() {
    let show_help = env::args().any(|a| a == "--help" || a == "-h");
    if show_help {
        println!("RLPx Key Generation Utility");
        println!();
        println!("Usage:");
        println!("  keygen    Generate a fresh random node identity");
        println!();
        println!("Output:");
        println!("  Hex-encoded keys ready for environment variables");
        return;
    }

    let identity = Identity::generate();
    let secret = identity.secret_bytes();
    let public = identity.public_key();

    println!("Secret Key (hex) - KEEP SECRET!");
    println!("────────────────────────────────────────────────────────────────────");
    println!("{}", hex::encode(secret.as_slice()));
    println!();

    println!("Public Key / Node ID (hex) - share with peers");
    println!("────────────────────────────────────────────────────────────────────");
    println!("{}", public.to_hex());
    println!();

    println!("Address Hash (hex)");
    println!("────────────────────────────────────────────────────────────────────");
    println!("{}", hex::encode(public.address_hash()));
    println!();

    println!("# Server:");
    println!("export RLPX_MODE=server");
    println!("export RLPX_SECRET_KEY={}", hex::encode(secret.as_slice()));
    println!();
    println!("# Client:");
    println!("export RLPX_MODE=client");
    println!("export RLPX_PEER_PUBLIC_KEY={}", public.to_hex());
    println!("export RLPX_PEER_ADDR=<server-ip>:30303");
}
