//! BIP-32 (HD keys) over a pluggable curve generator.
//!
//! Features:
//! - Master node from seed
//! - CKDpriv (hardened & normal) and CKDpub (normal only), with the
//!   skip-to-next-index rule for invalid child keys
//! - Per-node memoization of derived children
//! - 78-byte extended key payloads, xprv/xpub Base58Check (mainnet, testnet, custom)
//! - Path parser ("m/0h/1/2'/2.pub") and ranged path specs ("0H/0-19,1/0-4")

mod codec;
mod error;
mod generator;
mod path;
mod util;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};

pub use crate::bip32::codec::{Base58Check, Network, TextCodec, PAYLOAD_LEN};
pub use crate::bip32::error::{Bip32Error, Result};
pub use crate::bip32::generator::{Generator, Secp256k1Generator, SecpScalar};
pub use crate::bip32::path::{ChildNumber, DerivationPath, PathSpec, HARDENED_OFFSET};

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// (index, hardened, want_private)
type CacheKey = (u32, bool, bool);

/// Key material of a node: a private scalar (with its point) or a bare point.
pub enum KeyMaterial<G: Generator> {
  Private {
    secret_exponent: G::Scalar,
    public_pair: G::Point,
  },
  Public {
    public_pair: G::Point,
  },
}

impl<G: Generator> KeyMaterial<G> {
  pub fn public_pair(&self) -> &G::Point {
    match self {
      KeyMaterial::Private { public_pair, .. } | KeyMaterial::Public { public_pair } => public_pair,
    }
  }

  pub fn secret_exponent(&self) -> Option<&G::Scalar> {
    match self {
      KeyMaterial::Private {
        secret_exponent, ..
      } => Some(secret_exponent),
      KeyMaterial::Public { .. } => None,
    }
  }
}

impl<G: Generator> Clone for KeyMaterial<G> {
  fn clone(&self) -> Self {
    match self {
      KeyMaterial::Private {
        secret_exponent,
        public_pair,
      } => KeyMaterial::Private {
        secret_exponent: secret_exponent.clone(),
        public_pair: public_pair.clone(),
      },
      KeyMaterial::Public { public_pair } => KeyMaterial::Public {
        public_pair: public_pair.clone(),
      },
    }
  }
}

impl<G: Generator> PartialEq for KeyMaterial<G> {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (
        KeyMaterial::Private {
          secret_exponent: a, ..
        },
        KeyMaterial::Private {
          secret_exponent: b, ..
        },
      ) => a == b,
      (KeyMaterial::Public { public_pair: a }, KeyMaterial::Public { public_pair: b }) => a == b,
      _ => false,
    }
  }
}

struct NodeInner<G: Generator> {
  generator: Arc<G>,
  key: KeyMaterial<G>,
  chain_code: [u8; 32],
  depth: u8,
  parent_fingerprint: [u8; 4],
  child_index: u32,
  subkey_cache: RwLock<HashMap<CacheKey, Node<G>>>,
}

/// A BIP-32 node: key material, chain code and its position in the tree.
///
/// Cloning is cheap and clones share the memoized children. Nodes are
/// immutable apart from that cache, and `Node` is `Send + Sync`.
pub struct Node<G: Generator = Secp256k1Generator> {
  inner: Arc<NodeInner<G>>,
}

impl<G: Generator> Clone for Node<G> {
  fn clone(&self) -> Self {
    Node {
      inner: Arc::clone(&self.inner),
    }
  }
}

/* --------------------- Construction ---------------------- */

impl<G: Generator> Node<G> {
  fn assemble(
    generator: Arc<G>,
    key: KeyMaterial<G>,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_index: u32,
  ) -> Self {
    Node {
      inner: Arc::new(NodeInner {
        generator,
        key,
        chain_code,
        depth,
        parent_fingerprint,
        child_index,
        subkey_cache: RwLock::new(HashMap::new()),
      }),
    }
  }

  /// Create the master node from seed (BIP-32).
  /// I = HMAC-SHA512(key="Bitcoin seed", data=seed)
  /// master secret = I_L, master chain code = I_R
  ///
  /// Fails with `InvalidSeed` if I_L is 0 or >= n; the caller needs another seed.
  pub fn from_seed(generator: Arc<G>, seed: &[u8]) -> Result<Self> {
    let (il, ir) = util::hmac_split(MASTER_HMAC_KEY, seed);
    let secret_exponent = generator
      .parse_scalar(&il)
      .filter(|s| !generator.is_zero(s))
      .ok_or(Bip32Error::InvalidSeed)?;
    let public_pair = generator
      .mul(&secret_exponent)
      .ok_or(Bip32Error::InvalidSeed)?;
    debug!(seed_len = seed.len(), "created master node");
    Ok(Self::assemble(
      generator,
      KeyMaterial::Private {
        secret_exponent,
        public_pair,
      },
      ir,
      0,
      [0u8; 4],
      0,
    ))
  }

  /// Private node from raw fields. `secret` must be in [1, n-1].
  pub fn from_private(
    generator: Arc<G>,
    secret: &[u8; 32],
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_index: u32,
  ) -> Result<Self> {
    let secret_exponent = generator
      .parse_scalar(secret)
      .filter(|s| !generator.is_zero(s))
      .ok_or(Bip32Error::BadKeyData)?;
    let public_pair = generator
      .mul(&secret_exponent)
      .ok_or(Bip32Error::BadKeyData)?;
    Ok(Self::assemble(
      generator,
      KeyMaterial::Private {
        secret_exponent,
        public_pair,
      },
      chain_code,
      depth,
      parent_fingerprint,
      child_index,
    ))
  }

  /// Public-only node from raw fields.
  pub fn from_public(
    generator: Arc<G>,
    public_pair: G::Point,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_index: u32,
  ) -> Self {
    Self::assemble(
      generator,
      KeyMaterial::Public { public_pair },
      chain_code,
      depth,
      parent_fingerprint,
      child_index,
    )
  }

  /// Same node with the secret exponent discarded.
  pub fn public_copy(&self) -> Self {
    if !self.is_private() {
      return self.clone();
    }
    Self::from_public(
      Arc::clone(&self.inner.generator),
      self.public_pair().clone(),
      self.inner.chain_code,
      self.inner.depth,
      self.inner.parent_fingerprint,
      self.inner.child_index,
    )
  }
}

/* --------------------- Accessors ---------------------- */

impl<G: Generator> Node<G> {
  pub fn generator(&self) -> &Arc<G> {
    &self.inner.generator
  }

  pub fn key_material(&self) -> &KeyMaterial<G> {
    &self.inner.key
  }

  pub fn secret_exponent(&self) -> Option<&G::Scalar> {
    self.inner.key.secret_exponent()
  }

  pub fn public_pair(&self) -> &G::Point {
    self.inner.key.public_pair()
  }

  pub fn is_private(&self) -> bool {
    self.secret_exponent().is_some()
  }

  pub fn chain_code(&self) -> &[u8; 32] {
    &self.inner.chain_code
  }

  pub fn depth(&self) -> u8 {
    self.inner.depth
  }

  pub fn parent_fingerprint(&self) -> [u8; 4] {
    self.inner.parent_fingerprint
  }

  /// ser32 child number, hardened bit included.
  pub fn child_index(&self) -> u32 {
    self.inner.child_index
  }

  /// serP(K): compressed public key.
  pub fn sec(&self) -> [u8; 33] {
    self.inner.generator.encode_point_compressed(self.public_pair())
  }

  /// RIPEMD160(SHA256(serP(K)))
  pub fn hash160(&self) -> [u8; 20] {
    util::hash160(&self.sec())
  }

  pub fn fingerprint(&self) -> [u8; 4] {
    util::fingerprint(&self.sec())
  }
}

/* --------------------- Child key derivation ---------------------- */

impl<G: Generator> Node<G> {
  /// Derive the child at `index` (hardened if `hardened`), memoized.
  ///
  /// If the key at `index` is invalid (I_L >= n, zero scalar or point at
  /// infinity) derivation moves on to `index + 1`; the returned node's
  /// `child_index` tells which index was used.
  pub fn subkey(&self, index: u32, hardened: bool, want_private: bool) -> Result<Self> {
    if index >= HARDENED_OFFSET {
      return Err(Bip32Error::IndexOutOfRange(index));
    }
    if (hardened || want_private) && !self.is_private() {
      return Err(Bip32Error::PublicPrivateMismatch);
    }
    if self.inner.depth == u8::MAX {
      return Err(Bip32Error::MaxDepthExceeded);
    }

    let key = (index, hardened, want_private);
    if let Some(child) = self
      .inner
      .subkey_cache
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&key)
    {
      trace!(index, hardened, want_private, "subkey cache hit");
      return Ok(child.clone());
    }

    let child = self.derive_first_valid(index, hardened)?;
    let child = if want_private {
      child
    } else {
      child.public_copy()
    };

    let mut cache = self
      .inner
      .subkey_cache
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    // another thread may have raced us here; both results are identical
    Ok(cache.entry(key).or_insert(child).clone())
  }

  fn derive_first_valid(&self, index: u32, hardened: bool) -> Result<Self> {
    let parent_fingerprint = self.fingerprint();
    for i in index..HARDENED_OFFSET {
      let cn = ChildNumber::new(i, hardened)?;
      match self.ckd(cn, parent_fingerprint) {
        Some(child) => {
          debug!(depth = child.depth(), child = %cn, "derived child node");
          return Ok(child);
        }
        None => warn!(child = %cn, "invalid child key, skipping to next index"),
      }
    }
    Err(Bip32Error::InvalidDerivedKey)
  }

  /// CKDpriv / CKDpub for a single child number. `None` if the child key is invalid.
  fn ckd(&self, cn: ChildNumber, parent_fingerprint: [u8; 4]) -> Option<Self> {
    let g = &self.inner.generator;

    // Data = (0x00 || ser256(k_par) || ser32(i)) for hardened
    //      = (serP(K_par)     || ser32(i))       for normal
    let mut data = [0u8; 1 + 32 + 4];
    match (&self.inner.key, cn.is_hardened()) {
      (KeyMaterial::Private { secret_exponent, .. }, true) => {
        data[1..33].copy_from_slice(&g.serialize_scalar(secret_exponent));
      }
      // hardened from public was rejected by the caller
      (KeyMaterial::Public { .. }, true) => return None,
      (_, false) => data[..33].copy_from_slice(&self.sec()),
    }
    data[33..].copy_from_slice(&util::ser32(cn.number()));

    let (il, ir) = util::hmac_split(&self.inner.chain_code, &data);
    let tweak = g.parse_scalar(&il)?;

    let key = match &self.inner.key {
      KeyMaterial::Private {
        secret_exponent, ..
      } => {
        // k_i = parse256(I_L) + k_par (mod n)
        let secret_exponent = g.scalar_add(&tweak, secret_exponent);
        if g.is_zero(&secret_exponent) {
          return None;
        }
        let public_pair = g.mul(&secret_exponent)?;
        KeyMaterial::Private {
          secret_exponent,
          public_pair,
        }
      }
      KeyMaterial::Public { public_pair } => {
        // K_i = point(parse256(I_L)) + K_par
        let public_pair = if g.is_zero(&tweak) {
          public_pair.clone()
        } else {
          g.point_add(&g.mul(&tweak)?, public_pair)?
        };
        KeyMaterial::Public { public_pair }
      }
    };

    Some(Self::assemble(
      Arc::clone(g),
      key,
      ir,
      self.inner.depth + 1,
      parent_fingerprint,
      cn.number(),
    ))
  }

  /// Walk `path` left to right. Each step keeps the private key if there is one.
  pub fn derive_path(&self, path: &DerivationPath) -> Result<Self> {
    let mut node = self.clone();
    for cn in path.children() {
      let want_private = node.is_private();
      node = node.subkey(cn.index(), cn.is_hardened(), want_private)?;
    }
    Ok(if path.is_public() {
      node.public_copy()
    } else {
      node
    })
  }

  /// Derive along a path string like "1H/5/2" or "0'/1.pub". "" returns this node.
  pub fn subkey_for_path(&self, path: &str) -> Result<Self> {
    self.derive_path(&DerivationPath::from_str(path)?)
  }

  /// Every node a ranged spec like "0H-1H/0-9,2/3.pub" names, lazily and in order.
  pub fn subkeys(&self, spec: &str) -> Result<impl Iterator<Item = Result<Self>> + '_> {
    let spec = PathSpec::from_str(spec)?;
    Ok(spec.into_paths().map(move |path| self.derive_path(&path)))
  }

  /// Children for indices `start_index..=start_index + max_level`: the normal
  /// child, then (if `include_hardened`) the hardened child, per index.
  pub fn children(
    &self,
    max_level: u32,
    start_index: u32,
    include_hardened: bool,
  ) -> impl Iterator<Item = Result<Self>> + '_ {
    let flags: &'static [bool] = if include_hardened {
      &[false, true]
    } else {
      &[false]
    };
    let want_private = self.is_private();
    let end = start_index.saturating_add(max_level);
    (start_index..=end)
      .flat_map(move |i| flags.iter().map(move |&hardened| self.subkey(i, hardened, want_private)))
  }
}

/* --------------------- Serialization ---------------------- */

impl<G: Generator> Node<G> {
  /// 78-byte extended key payload:
  /// version(4) || depth(1) || parent fingerprint(4) || ser32(i)(4) || chain code(32) || key data(33)
  pub fn serialize(&self, version: u32, as_private: bool) -> Result<[u8; PAYLOAD_LEN]> {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..4].copy_from_slice(&version.to_be_bytes());
    payload[4] = self.inner.depth;
    payload[5..9].copy_from_slice(&self.inner.parent_fingerprint);
    payload[9..13].copy_from_slice(&util::ser32(self.inner.child_index));
    payload[13..45].copy_from_slice(&self.inner.chain_code);
    if as_private {
      let secret = self
        .secret_exponent()
        .ok_or(Bip32Error::PublicPrivateMismatch)?;
      // key data: 0x00 + ser256(k)
      payload[45] = 0;
      payload[46..78].copy_from_slice(&self.inner.generator.serialize_scalar(secret));
    } else {
      payload[45..78].copy_from_slice(&self.sec());
    }
    Ok(payload)
  }

  /// Parse a 78-byte payload; returns the node and the version prefix.
  pub fn deserialize(generator: Arc<G>, data: &[u8; PAYLOAD_LEN]) -> Result<(Self, u32)> {
    let version = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let depth = data[4];
    let mut parent_fingerprint = [0u8; 4];
    parent_fingerprint.copy_from_slice(&data[5..9]);
    let child_index = u32::from_be_bytes([data[9], data[10], data[11], data[12]]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&data[13..45]);

    // Reject invalid "root" headers per BIP-32
    if depth == 0 && (parent_fingerprint != [0, 0, 0, 0] || child_index != 0) {
      return Err(Bip32Error::InvalidRootFields);
    }

    let mut key_data = [0u8; 33];
    key_data.copy_from_slice(&data[45..78]);
    let node = if key_data[0] == 0x00 {
      let mut secret = [0u8; 32];
      secret.copy_from_slice(&key_data[1..]);
      Self::from_private(generator, &secret, chain_code, depth, parent_fingerprint, child_index)?
    } else {
      let public_pair = generator
        .decode_point_compressed(&key_data)
        .ok_or(Bip32Error::BadKeyData)?;
      Self::from_public(generator, public_pair, chain_code, depth, parent_fingerprint, child_index)
    };
    Ok((node, version))
  }

  /// Text form (xprv/xpub for mainnet) through `codec`.
  pub fn to_extended_key(
    &self,
    codec: &impl TextCodec,
    network: Network,
    as_private: bool,
  ) -> Result<String> {
    let payload = self.serialize(network.version(as_private), as_private)?;
    Ok(codec.encode(&payload))
  }

  /// Parse an extended key whose version belongs to one of `networks`.
  pub fn from_extended_key(
    generator: Arc<G>,
    codec: &impl TextCodec,
    text: &str,
    networks: &[Network],
  ) -> Result<(Self, Network)> {
    let payload = codec.decode(text)?;
    let version = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let (network, is_private) = Network::from_version(version, networks)?;
    // private versions carry 0x00 || ser256(k), public ones a compressed point
    if (payload[45] == 0x00) != is_private {
      return Err(Bip32Error::BadKeyData);
    }
    let (node, _) = Self::deserialize(generator, &payload)?;
    Ok((node, network))
  }
}

impl<G: Generator> PartialEq for Node<G> {
  fn eq(&self, other: &Self) -> bool {
    self.inner.key == other.inner.key
      && self.inner.chain_code == other.inner.chain_code
      && self.inner.depth == other.inner.depth
      && self.inner.parent_fingerprint == other.inner.parent_fingerprint
      && self.inner.child_index == other.inner.child_index
  }
}

impl<G: Generator> fmt::Debug for Node<G> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Node")
      .field("private", &self.is_private())
      .field("depth", &self.inner.depth)
      .field("child", &ChildNumber::from(self.inner.child_index))
      .field("fingerprint", &hex::encode(self.fingerprint()))
      .field("parent_fingerprint", &hex::encode(self.inner.parent_fingerprint))
      .finish()
  }
}
