//! Value serialization for emitted values and aggregates.
//!
//! Values travel through the store as opaque bytes. `Codec` makes the
//! wire representation explicit: a mapping task encodes emitted values with it
//! and a reduce task decodes leaves and child aggregates with it. A decode
//! failure is how a mismatched fold type surfaces.

use crate::error::{Error, Result};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts a value to and from its stored byte representation.
pub trait Codec: Sized {
    /// Serializes the value.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Deserializes a value previously produced by `encode`.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl Codec for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl Codec for String {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::codec(format!("invalid UTF-8: {}", e)))
    }
}

/// The empty value. Encodes to zero bytes.
impl Codec for () {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            Ok(())
        } else {
            Err(Error::codec(format!("expected empty value, got {} bytes", bytes.len())))
        }
    }
}

macro_rules! impl_codec_for_int {
    ($($ty:ty),*) => {
        $(
            impl Codec for $ty {
                fn encode(&self) -> Result<Vec<u8>> {
                    Ok(self.to_be_bytes().to_vec())
                }

                fn decode(bytes: &[u8]) -> Result<Self> {
                    let raw: [u8; core::mem::size_of::<$ty>()] = bytes.try_into().map_err(|_| {
                        Error::codec(format!(
                            "expected {} bytes for {}, got {}",
                            core::mem::size_of::<$ty>(),
                            stringify!($ty),
                            bytes.len()
                        ))
                    })?;
                    Ok(<$ty>::from_be_bytes(raw))
                }
            }
        )*
    };
}

impl_codec_for_int!(u32, i32, u64, i64);

/// Wrapper that stores any serde value as JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwraps the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> Codec for Json<T> {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}
