//! Extended key text encoding and network version bytes.

use crate::bip32::error::Bip32Error;

/// Length of a serialized extended key before text encoding.
pub const PAYLOAD_LEN: usize = 78;

/// Turns the 78-byte extended key payload into text and back.
pub trait TextCodec {
  fn encode(&self, payload: &[u8; PAYLOAD_LEN]) -> String;

  /// Fails with `InvalidBase58` on checksum errors or a payload that is not 78 bytes.
  fn decode(&self, text: &str) -> Result<[u8; PAYLOAD_LEN], Bip32Error>;
}

/// Base58 with a 4-byte double-SHA256 checksum.
#[derive(Clone, Copy, Debug, Default)]
pub struct Base58Check;

impl TextCodec for Base58Check {
  fn encode(&self, payload: &[u8; PAYLOAD_LEN]) -> String {
    bs58::encode(payload).with_check().into_string()
  }

  fn decode(&self, text: &str) -> Result<[u8; PAYLOAD_LEN], Bip32Error> {
    let data = bs58::decode(text.trim())
      .with_check(None)
      .into_vec()
      .map_err(|_| Bip32Error::InvalidBase58)?;
    data.try_into().map_err(|_| Bip32Error::InvalidBase58)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
  Mainnet,
  Testnet,
  /// Other chains' version bytes
  Custom { public: u32, private: u32 },
}

impl Network {
  /// (public, private) version prefixes
  pub fn versions(self) -> (u32, u32) {
    match self {
      // xpub/xprv
      Network::Mainnet => (0x0488_B21E, 0x0488_ADE4),
      // tpub/tprv
      Network::Testnet => (0x0435_87CF, 0x0435_8394),
      Network::Custom { public, private } => (public, private),
    }
  }

  pub fn version(self, as_private: bool) -> u32 {
    let (public, private) = self.versions();
    if as_private {
      private
    } else {
      public
    }
  }

  /// Map a version prefix back to (network, is_private), checking `known` in order.
  pub fn from_version(v: u32, known: &[Network]) -> Result<(Network, bool), Bip32Error> {
    known
      .iter()
      .find_map(|&net| match net.versions() {
        (public, _) if public == v => Some((net, false)),
        (_, private) if private == v => Some((net, true)),
        _ => None,
      })
      .ok_or(Bip32Error::BadVersion(v))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_known_versions() {
    let known = [Network::Mainnet, Network::Testnet];
    assert_eq!(
      Network::from_version(0x0488_ADE4, &known),
      Ok((Network::Mainnet, true))
    );
    assert_eq!(
      Network::from_version(0x0435_87CF, &known),
      Ok((Network::Testnet, false))
    );
    assert_eq!(
      Network::from_version(0xDEAD_BEEF, &known),
      Err(Bip32Error::BadVersion(0xDEAD_BEEF))
    );
  }

  #[test]
  fn custom_versions() {
    let ltc = Network::Custom {
      public: 0x019D_A462,
      private: 0x019D_9CFE,
    };
    assert_eq!(ltc.version(true), 0x019D_9CFE);
    assert_eq!(Network::from_version(0x019D_A462, &[ltc]), Ok((ltc, false)));
  }

  #[test]
  fn base58check_rejects_wrong_length_and_checksum() {
    let short = bs58::encode([0u8; 77]).with_check().into_string();
    assert_eq!(Base58Check.decode(&short), Err(Bip32Error::InvalidBase58));

    let good = Base58Check.encode(&[7u8; PAYLOAD_LEN]);
    assert_eq!(Base58Check.decode(&good), Ok([7u8; PAYLOAD_LEN]));

    let mut chars: Vec<char> = good.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == '2' { '3' } else { '2' };
    let corrupted: String = chars.into_iter().collect();
    assert_eq!(Base58Check.decode(&corrupted), Err(Bip32Error::InvalidBase58));
  }
}
