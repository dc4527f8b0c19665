//! # Value Codec
//!
//! Purpose: Turn typed values into the opaque payload bytes memcached stores,
//! and back again.
//!
//! ## Encodings
//! 1. **Raw**: `str`, `String`, `[u8]` and `Vec<u8>` pass through untouched.
//!    The `<bytes>` field of the storage command already frames the payload.
//! 2. **Fixed Width**: 8/16/32/64-bit integers are little-endian at their
//!    exact width. `isize`/`usize` travel as 64-bit.
//! 3. **Structured**: anything else goes through [`Json`], a serde wrapper
//!    backed by `serde_json`. Unencodable content is an error, never
//!    silently dropped.
//!
//! `decode(encode(v)) == v` holds for every implementation here.

use std::borrow::Cow;
use std::ops::{Deref, DerefMut};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Values that can be written as a memcached payload.
pub trait Encode {
    /// Produces the payload bytes, borrowing when the value already is bytes.
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError>;
}

/// Values that can be rebuilt from a memcached payload.
pub trait Decode: Sized {
    /// Reconstructs a value from payload bytes.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

impl Encode for [u8] {
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
        Ok(Cow::Borrowed(self))
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

impl Encode for str {
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl Encode for String {
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
        Ok(Cow::Borrowed(self.as_bytes()))
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
        (**self).encode()
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
        (**self).encode()
    }
}

// A decoded box is always a fresh allocation owned by the caller.
impl<T: Decode> Decode for Box<T> {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        T::decode(bytes).map(Box::new)
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes.try_into().map_err(|_| CodecError::Width {
        expected: N,
        actual: bytes.len(),
    })
}

macro_rules! fixed_width {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
                    Ok(Cow::Owned(self.to_le_bytes().to_vec()))
                }
            }

            impl Decode for $ty {
                fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
                    Ok(<$ty>::from_le_bytes(fixed(bytes)?))
                }
            }
        )*
    };
}

fixed_width!(i8, u8, i16, u16, i32, u32, i64, u64);

macro_rules! native_width {
    ($($ty:ty => $wide:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
                    Ok(Cow::Owned((*self as $wide).to_le_bytes().to_vec()))
                }
            }

            impl Decode for $ty {
                fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
                    Ok(<$wide>::from_le_bytes(fixed(bytes)?) as $ty)
                }
            }
        )*
    };
}

native_width!(isize => i64, usize => u64);

/// Structured values serialized through serde.
///
/// Wrap any `Serialize`/`DeserializeOwned` type to store it:
///
/// ```rust,ignore
/// client.set("user:1", &Json(User { name: "bob".into(), age: 32 }))?;
/// let user: Json<User> = client.get("user:1")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Consumes the wrapper and returns the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Json<T> {
    fn from(value: T) -> Self {
        Json(value)
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Serialize> Encode for Json<T> {
    fn encode(&self) -> Result<Cow<'_, [u8]>, CodecError> {
        Ok(Cow::Owned(serde_json::to_vec(&self.0)?))
    }
}

impl<T: DeserializeOwned> Decode for Json<T> {
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}
