//! Minimal BIP-32 helper functions:
//! - ser32(i):    big-endian u32 (4 bytes)
//! - hash160(b):  RIPEMD160(SHA256(b))
//! - hmac_split:  HMAC-SHA512 output split into (I_L, I_R)

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

/// ser32(i): 4-byte big-endian serialization of a 32-bit integer
pub fn ser32(i: u32) -> [u8; 4] {
  i.to_be_bytes()
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
  let mid = Sha256::digest(data);
  let out = Ripemd160::digest(mid);
  let mut r = [0u8; 20];
  r.copy_from_slice(&out);
  r
}

/// First four bytes of hash160(serP(P)).
pub fn fingerprint(ser_p: &[u8; 33]) -> [u8; 4] {
  let h160 = hash160(ser_p);
  [h160[0], h160[1], h160[2], h160[3]]
}

/// I = HMAC-SHA512(key, data), split into (I_L, I_R).
pub fn hmac_split(key: &[u8], data: &[u8]) -> ([u8; 32], [u8; 32]) {
  let mut mac = HmacSha512::new_from_slice(key).expect("HMAC can take key of any size");
  mac.update(data);
  let i = mac.finalize().into_bytes();

  let mut il = [0u8; 32];
  il.copy_from_slice(&i[..32]);
  let mut ir = [0u8; 32];
  ir.copy_from_slice(&i[32..]);
  (il, ir)
}

#[cfg(test)]
mod tests {
  use super::*;
  use hex::ToHex;

  #[test]
  fn test_ser32() {
    assert_eq!(ser32(0xDEAD_BEEF), [0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(ser32(0), [0, 0, 0, 0]);
    assert_eq!(ser32(1), [0, 0, 0, 1]);
  }

  #[test]
  fn hash160_of_empty_input() {
    // RIPEMD160(SHA256(""))
    assert_eq!(
      hash160(b"").encode_hex::<String>(),
      "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
    );
  }

  #[test]
  fn hmac_split_matches_rfc4231_case_2() {
    let (il, ir) = hmac_split(b"Jefe", b"what do ya want for nothing?");
    assert_eq!(
      il.encode_hex::<String>(),
      "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554"
    );
    assert_eq!(
      ir.encode_hex::<String>(),
      "9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
    );
  }
}
