//! Hierarchical deterministic (BIP-32) key nodes.
//!
//! A [`Node`] holds a private scalar or a public point plus chain code,
//! depth, parent fingerprint and child number. Nodes derive children
//! (hardened, normal, public-only), walk paths like `"0H/1/2.pub"`, and
//! serialize to the 78-byte extended key payload.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hdnode::{Base58Check, Network, Node, Secp256k1Generator};
//!
//! let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
//! let master = Node::from_seed(Arc::new(Secp256k1Generator::new()), &seed).unwrap();
//! let account = master.subkey_for_path("0H/1").unwrap();
//! println!("{}", account.to_extended_key(&Base58Check, Network::Mainnet, true).unwrap());
//! ```

pub mod bip32;
#[cfg(feature = "cli")]
pub mod cli;

pub use crate::bip32::{
  Base58Check, Bip32Error, ChildNumber, DerivationPath, Generator, KeyMaterial, Network, Node,
  PathSpec, Secp256k1Generator, TextCodec, HARDENED_OFFSET,
};
