//! Canonical field encoding used to compute object digests.
//!
//! Every hashed value appends a deterministic byte sequence to a caller-owned
//! buffer. The digest of an object is the Blake3 hash of the buffer after all
//! of its fields have been appended in a fixed order.
//!
//! # Byte layout
//!
//! - Strings: `VarInt(len)` followed by the UTF-8 bytes
//! - [`Amount`]: `VarInt(len)` followed by the minimal big-endian magnitude
//!   (zero has length 0)
//! - `u8`/`u16`/`u32`/`u64`: fixed width, little-endian
//! - [`Hash`]: the 32 raw bytes
//! - `Option<T>`: `0x00` for `None`, `0x01` followed by the value for `Some`
//! - Slices: `VarInt(count)` followed by each element
//!
//! `VarInt` uses one byte up to `0xFC`, then a `0xFD`/`0xFE`/`0xFF` marker
//! followed by a little-endian `u16`/`u32`/`u64`.

use crate::amount::Amount;
use crate::hash::{hash, Hash};

/// A value that can append its canonical encoding to a buffer.
///
/// Composite types implement this by calling [`hash_part`] on each of their
/// fields in a fixed order.
pub trait HashPart {
    fn hash_part(&self, buffer: &mut Vec<u8>);
}

/// Append the canonical encoding of `value` to `buffer`.
pub fn hash_part<T: HashPart + ?Sized>(value: &T, buffer: &mut Vec<u8>) {
    value.hash_part(buffer);
}

/// Digest an object by draining its canonical encoding into a fresh buffer.
pub fn hash_full<T: HashPart + ?Sized>(value: &T) -> Hash {
    let mut buffer = Vec::new();
    value.hash_part(&mut buffer);
    hash(&buffer)
}

/// Append a variable-length unsigned integer.
pub fn write_var_int(value: u64, buffer: &mut Vec<u8>) {
    if value <= 0xFC {
        buffer.push(value as u8);
    } else if value <= 0xFFFF {
        buffer.push(0xFD);
        buffer.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFFFF_FFFF {
        buffer.push(0xFE);
        buffer.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buffer.push(0xFF);
        buffer.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_var_bytes(bytes: &[u8], buffer: &mut Vec<u8>) {
    write_var_int(bytes.len() as u64, buffer);
    buffer.extend_from_slice(bytes);
}

impl HashPart for str {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        write_var_bytes(self.as_bytes(), buffer);
    }
}

impl HashPart for String {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        self.as_str().hash_part(buffer);
    }
}

macro_rules! impl_hash_part_le {
    ($($ty:ty),*) => {
        $(
            impl HashPart for $ty {
                fn hash_part(&self, buffer: &mut Vec<u8>) {
                    buffer.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_hash_part_le!(u8, u16, u32, u64);

impl HashPart for Amount {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        write_var_bytes(&self.to_bytes_be(), buffer);
    }
}

impl HashPart for Hash {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.as_bytes());
    }
}

impl<T: HashPart> HashPart for Option<T> {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        match self {
            None => buffer.push(0),
            Some(value) => {
                buffer.push(1);
                value.hash_part(buffer);
            }
        }
    }
}

impl<T: HashPart> HashPart for [T] {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        write_var_int(self.len() as u64, buffer);
        for item in self {
            item.hash_part(buffer);
        }
    }
}

impl<T: HashPart> HashPart for Vec<T> {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        self.as_slice().hash_part(buffer);
    }
}

impl<T: HashPart + ?Sized> HashPart for &T {
    fn hash_part(&self, buffer: &mut Vec<u8>) {
        (**self).hash_part(buffer);
    }
}
