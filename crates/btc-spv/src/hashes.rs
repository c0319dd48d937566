//! Hash types and the double-SHA-256 primitive.
//!
//! Bitcoin byte order comes in two conventions. The raw sha256d output
//! ("internal" order) is what the protocol concatenates and compares on the
//! wire; block explorers and this store use the byte-reversed ("display")
//! order. The newtypes here hold display-order bytes, so a child header's
//! `prev_blockhash` compares directly against the parent's computed block
//! hash; `from_internal_byte_array` is the only reversal boundary.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Double SHA-256 over `data`, in internal (non-reversed) byte order.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

macro_rules! hash_newtype {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; 32]);

        impl $name {
            /// The all-zero hash, used as the vacancy sentinel.
            pub const ZERO: Self = Self([0u8; 32]);

            /// Wraps display-order bytes.
            pub const fn from_byte_array(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Wraps a raw sha256d output, reversing it into display order.
            pub fn from_internal_byte_array(mut bytes: [u8; 32]) -> Self {
                bytes.reverse();
                Self(bytes)
            }

            /// The display-order bytes.
            pub const fn to_byte_array(self) -> [u8; 32] {
                self.0
            }

            /// Borrows the display-order bytes.
            pub const fn as_byte_array(&self) -> &[u8; 32] {
                &self.0
            }

            /// The internal-order (wire) bytes.
            pub fn to_internal_byte_array(self) -> [u8; 32] {
                let mut bytes = self.0;
                bytes.reverse();
                bytes
            }

            /// True for the all-zero sentinel.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Parses display-order hex.
            pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(hex, &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let hex = String::deserialize(deserializer)?;
                Self::from_hex(&hex).map_err(D::Error::custom)
            }
        }
    };
}

hash_newtype! {
    /// A block hash in display (reversed) byte order.
    BlockHash
}

hash_newtype! {
    /// The root of a block's transaction merkle tree, in display (reversed)
    /// byte order.
    TxMerkleNode
}
