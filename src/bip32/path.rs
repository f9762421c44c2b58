//! Derivation paths.
//!
//! - `ChildNumber`:    one path element, "5" or "5H" (also `'`, `p`, `h`)
//! - `DerivationPath`: "m/0H/1/2'/2", optionally suffixed with ".pub"
//! - `PathSpec`:       "0H-2H/0-4,1/7.pub" - ranges and comma separated alternatives

use std::fmt;
use std::str::FromStr;

use crate::bip32::error::Bip32Error;

pub const HARDENED_OFFSET: u32 = 0x8000_0000;

const PUB_SUFFIX: &str = ".pub";

/// A single path element (index + hardened bit)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChildNumber {
  index: u32, // full value, including hardened bit if set
}

impl ChildNumber {
  /// `index` must be below 2^31; the hardened bit is set from `hardened`.
  pub fn new(index: u32, hardened: bool) -> Result<Self, Bip32Error> {
    if index >= HARDENED_OFFSET {
      return Err(Bip32Error::IndexOutOfRange(index));
    }
    let v = if hardened {
      index | HARDENED_OFFSET
    } else {
      index
    };
    Ok(ChildNumber { index: v })
  }

  pub fn is_hardened(&self) -> bool {
    self.index >= HARDENED_OFFSET
  }

  /// Index without the hardened bit.
  pub fn index(&self) -> u32 {
    self.index & !HARDENED_OFFSET
  }

  /// ser32 value, hardened bit included.
  pub fn number(&self) -> u32 {
    self.index
  }
}

impl From<u32> for ChildNumber {
  fn from(raw: u32) -> Self {
    ChildNumber { index: raw }
  }
}

impl fmt::Display for ChildNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_hardened() {
      write!(f, "{}H", self.index())
    } else {
      write!(f, "{}", self.index())
    }
  }
}

/// Split a hardened marker off the end of a path element.
fn strip_hardened(elem: &str) -> (&str, bool) {
  match elem.strip_suffix(['\'', 'p', 'h', 'H']) {
    Some(num) => (num, true),
    None => (elem, false),
  }
}

fn parse_index(num_str: &str, elem: &str) -> Result<u32, Bip32Error> {
  if num_str.is_empty() || !num_str.bytes().all(|b| b.is_ascii_digit()) {
    return Err(Bip32Error::BadPath(elem.to_string()));
  }
  // all digits, so a failed parse can only mean overflow
  let n: u64 = num_str.parse().unwrap_or(u64::MAX);
  u32::try_from(n)
    .ok()
    .filter(|&n| n < HARDENED_OFFSET)
    .ok_or(Bip32Error::IndexOutOfRange(n.min(u32::MAX as u64) as u32))
}

impl FromStr for ChildNumber {
  type Err = Bip32Error;

  fn from_str(elem: &str) -> Result<Self, Self::Err> {
    let (num_str, hardened) = strip_hardened(elem);
    ChildNumber::new(parse_index(num_str, elem)?, hardened)
  }
}

/// Drop the optional leading "m"/"M" and split on '/'. "" and "m" give no components.
fn components(s: &str) -> Vec<&str> {
  if s.is_empty() {
    return Vec::new();
  }
  let mut comps: Vec<&str> = s.split('/').collect();
  if comps[0] == "m" || comps[0] == "M" {
    comps.remove(0);
  }
  comps
}

/// A parsed path: child numbers applied left to right, plus the ".pub" flag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DerivationPath {
  children: Vec<ChildNumber>,
  public: bool,
}

impl DerivationPath {
  pub fn new(children: Vec<ChildNumber>, public: bool) -> Self {
    DerivationPath { children, public }
  }

  pub fn children(&self) -> &[ChildNumber] {
    &self.children
  }

  /// True if the path ended in ".pub": the result is stripped to its public half.
  pub fn is_public(&self) -> bool {
    self.public
  }

  pub fn is_empty(&self) -> bool {
    self.children.is_empty()
  }
}

/// Parse "1H/5/2", "m/0'/1.pub", "" -> DerivationPath
impl FromStr for DerivationPath {
  type Err = Bip32Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let (s, public) = match s.strip_suffix(PUB_SUFFIX) {
      Some(rest) => (rest, true),
      None => (s, false),
    };
    let children = components(s)
      .into_iter()
      .map(ChildNumber::from_str)
      .collect::<Result<Vec<_>, _>>()?;
    Ok(DerivationPath { children, public })
  }
}

impl fmt::Display for DerivationPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("m")?;
    for cn in &self.children {
      write!(f, "/{cn}")?;
    }
    if self.public {
      f.write_str(PUB_SUFFIX)?;
    }
    Ok(())
  }
}

/* ------------------------- Ranged path specs ------------------------- */

/// Inclusive range of child numbers sharing one hardened flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ChildRange {
  start: u32,
  end: u32,
  hardened: bool,
}

impl ChildRange {
  fn len(&self) -> usize {
    (self.end - self.start) as usize + 1
  }

  fn nth(&self, n: usize) -> ChildNumber {
    ChildNumber::from(if self.hardened {
      (self.start + n as u32) | HARDENED_OFFSET
    } else {
      self.start + n as u32
    })
  }
}

impl FromStr for ChildRange {
  type Err = Bip32Error;

  /// "3", "3H", "0-4", "0H-4", "0-4H" (marker on either bound hardens the range)
  fn from_str(elem: &str) -> Result<Self, Self::Err> {
    let Some((lo, hi)) = elem.split_once('-') else {
      let cn = ChildNumber::from_str(elem)?;
      return Ok(ChildRange {
        start: cn.index(),
        end: cn.index(),
        hardened: cn.is_hardened(),
      });
    };
    let (lo_num, lo_h) = strip_hardened(lo);
    let (hi_num, hi_h) = strip_hardened(hi);
    let start = parse_index(lo_num, elem)?;
    let end = parse_index(hi_num, elem)?;
    if start > end {
      return Err(Bip32Error::BadPath(elem.to_string()));
    }
    Ok(ChildRange {
      start,
      end,
      hardened: lo_h || hi_h,
    })
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SubpathSpec {
  ranges: Vec<ChildRange>,
  public: bool,
  count: usize,
}

impl SubpathSpec {
  /// `None` if the Cartesian product has more than `usize::MAX` paths.
  fn new(ranges: Vec<ChildRange>, public: bool) -> Option<Self> {
    let count = ranges
      .iter()
      .try_fold(1usize, |acc, r| acc.checked_mul(r.len()))?;
    Some(SubpathSpec {
      ranges,
      public,
      count,
    })
  }

  /// The `n`th path of the Cartesian product, last component varying fastest.
  fn nth(&self, mut n: usize) -> DerivationPath {
    let mut children = vec![ChildNumber::from(0); self.ranges.len()];
    for (slot, range) in children.iter_mut().zip(&self.ranges).rev() {
      *slot = range.nth(n % range.len());
      n /= range.len();
    }
    DerivationPath::new(children, self.public)
  }
}

/// A ranged path specification such as "1H/0-3,1H/5H-6H.pub".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathSpec {
  subpaths: Vec<SubpathSpec>,
  len: usize,
}

impl PathSpec {
  /// Lazily expand into concrete paths, in order.
  pub fn paths(&self) -> impl Iterator<Item = DerivationPath> + '_ {
    self
      .subpaths
      .iter()
      .flat_map(|sp| (0..sp.count).map(move |n| sp.nth(n)))
  }

  pub fn into_paths(self) -> impl Iterator<Item = DerivationPath> {
    self
      .subpaths
      .into_iter()
      .flat_map(|sp| (0..sp.count).map(move |n| sp.nth(n)))
  }

  /// Number of concrete paths the spec expands to.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl FromStr for PathSpec {
  type Err = Bip32Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let too_large = || Bip32Error::BadPath(format!("{s}: expands to too many paths"));
    let subpaths = s
      .trim()
      .split(',')
      .map(|sub| -> Result<SubpathSpec, Bip32Error> {
        let sub = sub.trim();
        let (sub, public) = match sub.strip_suffix(PUB_SUFFIX) {
          Some(rest) => (rest, true),
          None => (sub, false),
        };
        let ranges = components(sub)
          .into_iter()
          .map(ChildRange::from_str)
          .collect::<Result<Vec<_>, _>>()?;
        SubpathSpec::new(ranges, public).ok_or_else(too_large)
      })
      .collect::<Result<Vec<_>, Bip32Error>>()?;
    let len = subpaths
      .iter()
      .try_fold(0usize, |acc, sp| acc.checked_add(sp.count))
      .ok_or_else(too_large)?;
    Ok(PathSpec { subpaths, len })
  }
}
