use std::fmt::{self, Debug, Display};
use std::net::IpAddr;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use itertools::izip;
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::consts::ID_LEN;

/// A 256-bit node identifier, big-endian.
///
/// Lexicographic byte order coincides with the numeric order of the
/// big-endian integer, so the derived `Ord` is the distance order.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Id(pub [u8; ID_LEN]);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdError {
    #[error("node ids are 64 hex characters")]
    InvalidHexId,
}

impl Id {
    pub const ZERO: Id = Id([0; ID_LEN]);
    pub const MAX: Id = Id([0xff; ID_LEN]);

    pub fn from_endpoint(ip: IpAddr, port: u16) -> Id {
        Self::from_endpoint_with_extras(ip, port, &[])
    }

    /// Canonical endpoint derivation: SHA-256 over a version byte (1),
    /// a family byte (4 or 6), the 16-byte address (IPv4-mapped for v4),
    /// the big-endian port and any extra discriminator bytes.
    pub fn from_endpoint_with_extras(ip: IpAddr, port: u16, extras: &[u8]) -> Id {
        let (family, ip16) = match ip {
            IpAddr::V4(v4) => (4u8, v4.to_ipv6_mapped()),
            IpAddr::V6(v6) => (6u8, v6),
        };
        let mut hasher = Sha256::new();
        hasher.update([1u8, family]);
        hasher.update(ip16.octets());
        hasher.update(port.to_be_bytes());
        hasher.update(extras);
        Id(hasher.finalize().into())
    }

    /// Maps a storage key into id space.
    pub fn for_key(key: &[u8]) -> Id {
        Id(Sha256::digest(key).into())
    }

    pub fn from_hex(s: &str) -> Result<Id, IdError> {
        if s.len() != ID_LEN * 2 {
            return Err(IdError::InvalidHexId);
        }
        let mut res = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut res).map_err(|_| IdError::InvalidHexId)?;
        Ok(Id(res))
    }

    /// The 64-char lowercase canonical form used on the wire.
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_short_hex(&self) -> String {
        let hex_id = hex::encode(self.0);
        hex_id.trim_start_matches('0').to_owned()
    }

    pub fn leading_zeros(&self) -> u32 {
        let mut res = 0u32;
        for x in self.0 {
            if x == 0 {
                res += 8;
            } else {
                res += x.leading_zeros();
                break;
            }
        }
        res
    }

    /// Bit `i`, counting from the most significant bit.
    pub fn bit(&self, i: u32) -> bool {
        (self.0[(i / 8) as usize] >> (7 - (i % 8))) & 1 == 1
    }

    /// The next id, wrapping at the top of the space.
    pub fn succ(&self) -> Id {
        let mut res = self.0;
        for byte in res.iter_mut().rev() {
            let (v, overflow) = byte.overflowing_add(1);
            *byte = v;
            if !overflow {
                break;
            }
        }
        Id(res)
    }

    /// `(a + b) >> 1` with a 257-bit intermediate, so the sum cannot
    /// overflow the id space.
    pub fn avg_floor(a: &Id, b: &Id) -> Id {
        let mut sum = [0u8; ID_LEN];
        let mut carry = 0u16;
        for i in (0..ID_LEN).rev() {
            let s = a.0[i] as u16 + b.0[i] as u16 + carry;
            sum[i] = s as u8;
            carry = s >> 8;
        }
        let mut res = [0u8; ID_LEN];
        let mut rem = carry as u8;
        for i in 0..ID_LEN {
            res[i] = (rem << 7) | (sum[i] >> 1);
            rem = sum[i] & 1;
        }
        Id(res)
    }
}

impl BitXor for Id {
    type Output = Id;

    fn bitxor(self, rhs: Id) -> Id {
        let mut res = Id::ZERO;
        for (r, a, b) in izip!(&mut res.0, &self.0, &rhs.0) {
            *r = a ^ b;
        }
        res
    }
}

impl BitAnd for Id {
    type Output = Id;

    fn bitand(self, rhs: Id) -> Id {
        let mut res = Id::ZERO;
        for (r, a, b) in izip!(&mut res.0, &self.0, &rhs.0) {
            *r = a & b;
        }
        res
    }
}

impl BitOr for Id {
    type Output = Id;

    fn bitor(self, rhs: Id) -> Id {
        let mut res = Id::ZERO;
        for (r, a, b) in izip!(&mut res.0, &self.0, &rhs.0) {
            *r = a | b;
        }
        res
    }
}

impl Not for Id {
    type Output = Id;

    fn not(self) -> Id {
        let mut res = self;
        for x in res.0.iter_mut() {
            *x = !*x;
        }
        res
    }
}

impl Distribution<Id> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Id {
        let mut res = [0u8; ID_LEN];
        rng.fill_bytes(&mut res);
        Id(res)
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.as_short_hex()).finish()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_short_hex())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Id {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Id {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Id, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Id::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A contiguous id interval, inclusive at both ends.
///
/// Inclusive bounds keep the full space `[ZERO, MAX]` representable in
/// 256 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdRange {
    pub start: Id,
    pub end: Id,
}

impl IdRange {
    pub const FULL: IdRange = IdRange {
        start: Id::ZERO,
        end: Id::MAX,
    };

    pub fn contains(&self, id: &Id) -> bool {
        self.start <= *id && *id <= self.end
    }

    /// Split at the midpoint `(start + end) >> 1`.
    pub fn halves(&self) -> (IdRange, IdRange) {
        let mid = Id::avg_floor(&self.start, &self.end);
        (
            IdRange {
                start: self.start,
                end: mid,
            },
            IdRange {
                start: mid.succ(),
                end: self.end,
            },
        )
    }

    /// Uniform id inside the range. Bucket ranges are always
    /// power-of-two aligned, so the differing bits form a low mask.
    pub fn random_within<R: Rng + ?Sized>(&self, rng: &mut R) -> Id {
        let mask = self.start ^ self.end;
        let random: Id = rng.gen();
        self.start | (random & mask)
    }
}
