use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bip32Error {
  /// Hardened derivation, private-child derivation or as-private serialization on a public node
  #[error("operation needs a private key but the node only holds a public key")]
  PublicPrivateMismatch,
  /// Child index does not fit in 31 bits
  #[error("child index {0} out of range (must be below 2^31)")]
  IndexOutOfRange(u32),
  /// I_L out of range (or zero) for master
  #[error("seed produced an invalid master key, pick another seed")]
  InvalidSeed,
  /// No valid child key left between the requested index and 2^31
  #[error("invalid child key (I_L out of range, zero scalar or point at infinity)")]
  InvalidDerivedKey,
  /// Parent already sits at depth 255
  #[error("cannot derive below depth 255")]
  MaxDepthExceeded,
  /// parse failure
  #[error("invalid derivation path: {0}")]
  BadPath(String),
  /// Base58Check decode failed or payload malformed
  #[error("base58check decode failed or payload is not 78 bytes")]
  InvalidBase58,
  /// Version prefix not recognized
  #[error("unrecognized extended key version {0:#010x}")]
  BadVersion(u32),
  /// Key data field malformed (bad prefix byte, scalar out of range or invalid point)
  #[error("key data field malformed - bad prefix or invalid pub/priv key bytes")]
  BadKeyData,
  /// BIP-32 requires that depth = 0 (master) implies parent fingerprint = 0 and child number = 0
  #[error("bip-32 requires that depth = 0 (master) implies parent fingerprint = 0 and child number = 0")]
  InvalidRootFields,
}

pub type Result<T> = std::result::Result<T, Bip32Error>;
