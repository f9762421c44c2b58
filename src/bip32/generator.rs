//! The elliptic-curve group that key derivation runs on.
//!
//! `Node` never touches curve arithmetic directly; everything goes through a
//! [`Generator`], so the derivation code can be driven by toy groups in tests
//! and by secp256k1 in production.

use std::fmt;

use secp256k1::{constants, All, PublicKey, Scalar, Secp256k1, SecretKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A cyclic group with generator `G` and order `n`.
///
/// Scalars handed out by a generator are always reduced into `[0, n-1]`.
/// Points are never the point at infinity: every operation that could land
/// there returns `None` instead.
pub trait Generator: fmt::Debug + Send + Sync + 'static {
  type Scalar: Clone + PartialEq + fmt::Debug + Send + Sync;
  type Point: Clone + PartialEq + fmt::Debug + Send + Sync;

  /// The group order `n`, big-endian.
  fn order(&self) -> [u8; 32];

  /// parse256(p); `None` if the value is `>= n`. Zero is accepted.
  fn parse_scalar(&self, bytes: &[u8; 32]) -> Option<Self::Scalar>;

  /// ser256(p)
  fn serialize_scalar(&self, s: &Self::Scalar) -> [u8; 32];

  fn is_zero(&self, s: &Self::Scalar) -> bool;

  /// (a + b) mod n
  fn scalar_add(&self, a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar;

  /// (a * b) mod n
  fn scalar_mul(&self, a: &Self::Scalar, b: &Self::Scalar) -> Self::Scalar;

  /// point(p) = p·G, `None` for p = 0.
  fn mul(&self, s: &Self::Scalar) -> Option<Self::Point>;

  /// P + Q, `None` if the sum is the point at infinity.
  fn point_add(&self, p: &Self::Point, q: &Self::Point) -> Option<Self::Point>;

  /// serP(P): 0x02/0x03 parity byte followed by the X coordinate.
  fn encode_point_compressed(&self, p: &Self::Point) -> [u8; 33];

  fn decode_point_compressed(&self, bytes: &[u8; 33]) -> Option<Self::Point>;
}

/* --------------------------- secp256k1 ---------------------------- */

/// Secret scalar on secp256k1, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecpScalar([u8; 32]);

impl SecpScalar {
  pub fn to_be_bytes(&self) -> [u8; 32] {
    self.0
  }
}

impl fmt::Debug for SecpScalar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SecpScalar(<redacted>)")
  }
}

/// secp256k1 backed by libsecp256k1.
#[derive(Clone)]
pub struct Secp256k1Generator {
  secp: Secp256k1<All>,
}

impl Secp256k1Generator {
  pub fn new() -> Self {
    Secp256k1Generator {
      secp: Secp256k1::new(),
    }
  }
}

impl Default for Secp256k1Generator {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Secp256k1Generator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Secp256k1Generator")
  }
}

impl Generator for Secp256k1Generator {
  type Scalar = SecpScalar;
  type Point = PublicKey;

  fn order(&self) -> [u8; 32] {
    constants::CURVE_ORDER
  }

  fn parse_scalar(&self, bytes: &[u8; 32]) -> Option<SecpScalar> {
    Scalar::from_be_bytes(*bytes).ok().map(|_| SecpScalar(*bytes))
  }

  fn serialize_scalar(&self, s: &SecpScalar) -> [u8; 32] {
    s.0
  }

  fn is_zero(&self, s: &SecpScalar) -> bool {
    s.0 == [0u8; 32]
  }

  fn scalar_add(&self, a: &SecpScalar, b: &SecpScalar) -> SecpScalar {
    // SecretKey rejects zero, so the zero operand is handled up front
    let sk = match SecretKey::from_byte_array(a.0) {
      Ok(sk) => sk,
      Err(_) => return b.clone(),
    };
    let tweak = match Scalar::from_be_bytes(b.0) {
      Ok(t) => t,
      Err(_) => return a.clone(),
    };
    match sk.add_tweak(&tweak) {
      Ok(sum) => SecpScalar(sum.secret_bytes()),
      // only fails when a + b == 0 mod n
      Err(_) => SecpScalar([0u8; 32]),
    }
  }

  fn scalar_mul(&self, a: &SecpScalar, b: &SecpScalar) -> SecpScalar {
    let zero = SecpScalar([0u8; 32]);
    let (Ok(sk), Ok(tweak)) = (SecretKey::from_byte_array(a.0), Scalar::from_be_bytes(b.0)) else {
      return zero;
    };
    match sk.mul_tweak(&tweak) {
      Ok(product) => SecpScalar(product.secret_bytes()),
      Err(_) => zero,
    }
  }

  fn mul(&self, s: &SecpScalar) -> Option<PublicKey> {
    let sk = SecretKey::from_byte_array(s.0).ok()?;
    Some(PublicKey::from_secret_key(&self.secp, &sk))
  }

  fn point_add(&self, p: &PublicKey, q: &PublicKey) -> Option<PublicKey> {
    p.combine(q).ok()
  }

  fn encode_point_compressed(&self, p: &PublicKey) -> [u8; 33] {
    p.serialize() // `serialize()` returns compressed by default
  }

  fn decode_point_compressed(&self, bytes: &[u8; 33]) -> Option<PublicKey> {
    PublicKey::from_slice(bytes).ok()
  }
}

/* ------------------------ toy group (tests) ------------------------ */

/// Additive group of integers modulo 2^255 with `G = 1`.
///
/// Half of all 256-bit values are `>= n`, so invalid I_L values and the
/// skip-to-next-index rule show up constantly instead of once in 2^127.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ToyGenerator;

#[cfg(test)]
impl ToyGenerator {
  fn reduce(mut v: [u8; 32]) -> [u8; 32] {
    v[0] &= 0x7f;
    v
  }

  fn to_limbs(v: &[u8; 32]) -> [u64; 4] {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
      let start = 32 - 8 * (i + 1);
      let mut word = [0u8; 8];
      word.copy_from_slice(&v[start..start + 8]);
      *limb = u64::from_be_bytes(word);
    }
    limbs
  }

  fn from_limbs(limbs: &[u64; 4]) -> [u8; 32] {
    let mut v = [0u8; 32];
    for (i, limb) in limbs.iter().enumerate() {
      let start = 32 - 8 * (i + 1);
      v[start..start + 8].copy_from_slice(&limb.to_be_bytes());
    }
    v
  }

  fn add(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut carry = 0u16;
    for i in (0..32).rev() {
      let sum = a[i] as u16 + b[i] as u16 + carry;
      out[i] = sum as u8;
      carry = sum >> 8;
    }
    Self::reduce(out)
  }
}

#[cfg(test)]
impl Generator for ToyGenerator {
  type Scalar = [u8; 32];
  type Point = [u8; 32];

  fn order(&self) -> [u8; 32] {
    let mut n = [0u8; 32];
    n[0] = 0x80;
    n
  }

  fn parse_scalar(&self, bytes: &[u8; 32]) -> Option<[u8; 32]> {
    (bytes[0] & 0x80 == 0).then_some(*bytes)
  }

  fn serialize_scalar(&self, s: &[u8; 32]) -> [u8; 32] {
    *s
  }

  fn is_zero(&self, s: &[u8; 32]) -> bool {
    *s == [0u8; 32]
  }

  fn scalar_add(&self, a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    Self::add(a, b)
  }

  fn scalar_mul(&self, a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (x, y) = (Self::to_limbs(a), Self::to_limbs(b));
    let mut acc = [0u64; 4];
    for i in 0..4 {
      let mut carry = 0u128;
      for j in 0..(4 - i) {
        let cur = acc[i + j] as u128 + (x[i] as u128) * (y[j] as u128) + carry;
        acc[i + j] = cur as u64;
        carry = cur >> 64;
      }
    }
    Self::reduce(Self::from_limbs(&acc))
  }

  fn mul(&self, s: &[u8; 32]) -> Option<[u8; 32]> {
    (!self.is_zero(s)).then_some(*s)
  }

  fn point_add(&self, p: &[u8; 32], q: &[u8; 32]) -> Option<[u8; 32]> {
    let sum = Self::add(p, q);
    (sum != [0u8; 32]).then_some(sum)
  }

  fn encode_point_compressed(&self, p: &[u8; 32]) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = 0x02;
    out[1..].copy_from_slice(p);
    out
  }

  fn decode_point_compressed(&self, bytes: &[u8; 33]) -> Option<[u8; 32]> {
    let mut p = [0u8; 32];
    p.copy_from_slice(&bytes[1..]);
    (bytes[0] == 0x02 && p[0] & 0x80 == 0 && p != [0u8; 32]).then_some(p)
  }
}
