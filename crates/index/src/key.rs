//! Composite keys emitted by map functions.
//!
//! A key is an ordered list of opaque byte-string components. The shapes a
//! caller may pass are fixed by the `From` impls below; anything else does not
//! convert into a `Key` and is rejected at compile time. A task should stick
//! to one shape: the codec only sees components, and mixing shapes for the
//! same logical value is not supported.

use crate::codec;
use alloc::string::String;
use alloc::vec::Vec;
use mapfold_core::Result;

/// An emitted index key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// The null key. Has zero components.
    Null,
    /// A single raw byte string.
    Bytes(Vec<u8>),
    /// A single text string.
    Text(String),
    /// A path of raw byte strings.
    BytesList(Vec<Vec<u8>>),
    /// A path of text strings.
    TextList(Vec<String>),
}

impl Key {
    /// Returns the components in order.
    pub fn components(&self) -> Vec<&[u8]> {
        match self {
            Key::Null => Vec::new(),
            Key::Bytes(b) => alloc::vec![b.as_slice()],
            Key::Text(s) => alloc::vec![s.as_bytes()],
            Key::BytesList(list) => list.iter().map(|b| b.as_slice()).collect(),
            Key::TextList(list) => list.iter().map(|s| s.as_bytes()).collect(),
        }
    }

    /// Returns the number of components.
    pub fn len(&self) -> usize {
        match self {
            Key::Null => 0,
            Key::Bytes(_) | Key::Text(_) => 1,
            Key::BytesList(list) => list.len(),
            Key::TextList(list) => list.len(),
        }
    }

    /// Returns true for a key without components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encodes the key as a stored index key carrying `seq`.
    pub fn encode(&self, seq: u64) -> Result<Vec<u8>> {
        codec::encode(&self.components(), seq)
    }

    /// Encodes the key as a scan prefix / reduce node key.
    pub fn encode_prefix(&self) -> Result<Vec<u8>> {
        codec::encode_prefix(&self.components())
    }
}

impl Default for Key {
    fn default() -> Self {
        Key::Null
    }
}

impl From<()> for Key {
    fn from(_: ()) -> Self {
        Key::Null
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Key::Bytes(value)
    }
}

impl From<&[u8]> for Key {
    fn from(value: &[u8]) -> Self {
        Key::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(value: &[u8; N]) -> Self {
        Key::Bytes(value.to_vec())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(String::from(value))
    }
}

impl From<Vec<Vec<u8>>> for Key {
    fn from(value: Vec<Vec<u8>>) -> Self {
        Key::BytesList(value)
    }
}

impl From<Vec<&[u8]>> for Key {
    fn from(value: Vec<&[u8]>) -> Self {
        Key::BytesList(value.into_iter().map(|b| b.to_vec()).collect())
    }
}

impl From<Vec<String>> for Key {
    fn from(value: Vec<String>) -> Self {
        Key::TextList(value)
    }
}

impl From<Vec<&str>> for Key {
    fn from(value: Vec<&str>) -> Self {
        Key::TextList(value.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Key {
    fn from(value: &[&str]) -> Self {
        Key::TextList(value.iter().map(|s| String::from(*s)).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Key {
    fn from(value: [&str; N]) -> Self {
        Key::TextList(value.iter().map(|s| String::from(*s)).collect())
    }
}
