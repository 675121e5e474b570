//! Chunk and element iteration over validated items.
//!
//! Two small engines drive everything here: [`ChunkIter`] steps through the
//! definite-length fragments of a (possibly chunked) string, [`ItemIter`]
//! steps over whole child items by measuring them with
//! [`item_len`](super::item_len). Both stop at a stored count or at the
//! break byte.

use super::{head_at, item_len, RawHead};
use crate::{wire::is_break, Cbor};
use std::{
    borrow::Cow,
    fmt::{Debug, Display, Formatter},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ChunkIter<'a> {
    bytes: &'a [u8],
    /// definite chunks left, or `None` to read until the break byte
    remaining: Option<u64>,
}

impl<'a> ChunkIter<'a> {
    fn next_chunk(&mut self) -> Option<&'a [u8]> {
        match self.remaining {
            Some(0) => return None,
            None if is_break(self.bytes[0]) => return None,
            _ => {}
        }
        let head = head_at(self.bytes, 0);
        let payload = head.arg.unwrap_or(0) as usize;
        let chunk = &self.bytes[head.len..head.len + payload];
        self.bytes = &self.bytes[head.len + payload..];
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        Some(chunk)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ItemIter<'a> {
    bytes: &'a [u8],
    /// child items left, or `None` to read until the break byte
    remaining: Option<u64>,
}

impl<'a> ItemIter<'a> {
    fn next_item(&mut self) -> Option<&'a Cbor> {
        match self.remaining {
            Some(0) => return None,
            None if is_break(self.bytes[0]) => return None,
            _ => {}
        }
        let (item, rest) = self.bytes.split_at(item_len(self.bytes));
        self.bytes = rest;
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        Some(Cbor::unchecked(item))
    }
}

/// Iterator yielding the fragments of a text string item.
///
/// Indefinite-length strings arrive in fragments; this iterator lets you
/// look at them one by one or join them into one allocation via
/// [`as_cow`](Self::as_cow).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StringIter<'a>(ChunkIter<'a>);

impl<'a> StringIter<'a> {
    /// `bytes` is the whole string item including its head.
    pub(crate) fn of_item(bytes: &'a [u8], head: RawHead) -> Self {
        Self(match head.arg {
            Some(_) => ChunkIter {
                bytes,
                remaining: Some(1),
            },
            None => ChunkIter {
                bytes: &bytes[1..],
                remaining: None,
            },
        })
    }

    /// Whether the wire encoding was indefinite-length.
    pub fn is_indefinite(&self) -> bool {
        self.0.remaining.is_none()
    }

    /// True for zero fragments; a multi-fragment string of empty fragments
    /// reports `false`.
    pub fn is_empty(&self) -> bool {
        let mut probe = self.0;
        probe.next_chunk().is_none()
    }

    /// Borrow the whole string, which works when there is at most one
    /// fragment and it is valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        let mut probe = self.0;
        let first = match probe.next_chunk() {
            None => return Some(""),
            Some(chunk) => chunk,
        };
        if probe.next_chunk().is_some() {
            return None;
        }
        std::str::from_utf8(first).ok()
    }

    /// The whole string, borrowed when possible. Fragments that are not
    /// valid UTF-8 (possible when the validator ran with UTF-8 checking
    /// disabled) are replaced lossily.
    pub fn as_cow(&self) -> Cow<'a, str> {
        match self.as_str() {
            Some(s) => Cow::Borrowed(s),
            None => {
                let mut joined = String::new();
                for piece in *self {
                    joined.push_str(&piece);
                }
                Cow::Owned(joined)
            }
        }
    }
}

impl<'a> Debug for StringIter<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("StringIter")
    }
}

impl<'a> Display for StringIter<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for piece in *self {
            f.write_str(&piece)?;
        }
        Ok(())
    }
}

impl<'a> Iterator for StringIter<'a> {
    /// Borrowed for valid UTF-8 fragments, owned with replacement
    /// characters otherwise.
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_chunk().map(String::from_utf8_lossy)
    }
}

impl<'a, S: AsRef<str>> PartialEq<S> for StringIter<'a> {
    fn eq(&self, other: &S) -> bool {
        let mut rest = other.as_ref();
        for piece in *self {
            match rest.strip_prefix(piece.as_ref()) {
                Some(r) => rest = r,
                None => return false,
            }
        }
        rest.is_empty()
    }
}

/// Iterator yielding the fragments of a byte string item.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BytesIter<'a>(ChunkIter<'a>);

impl<'a> BytesIter<'a> {
    /// `bytes` is the whole string item including its head.
    pub(crate) fn of_item(bytes: &'a [u8], head: RawHead) -> Self {
        Self(match head.arg {
            Some(_) => ChunkIter {
                bytes,
                remaining: Some(1),
            },
            None => ChunkIter {
                bytes: &bytes[1..],
                remaining: None,
            },
        })
    }

    /// Whether the wire encoding was indefinite-length.
    pub fn is_indefinite(&self) -> bool {
        self.0.remaining.is_none()
    }

    /// True for zero fragments; a multi-fragment string of empty fragments
    /// reports `false`.
    pub fn is_empty(&self) -> bool {
        let mut probe = self.0;
        probe.next_chunk().is_none()
    }

    /// Borrow the whole string, which works when there is at most one
    /// fragment.
    pub fn as_slice(&self) -> Option<&'a [u8]> {
        let mut probe = self.0;
        match (probe.next_chunk(), probe.next_chunk()) {
            (None, _) => Some(b""),
            (Some(chunk), None) => Some(chunk),
            _ => None,
        }
    }

    /// The whole string, borrowed when possible.
    pub fn as_cow(&self) -> Cow<'a, [u8]> {
        match self.as_slice() {
            Some(s) => Cow::Borrowed(s),
            None => Cow::Owned(self.to_vec()),
        }
    }

    /// The whole string in a fresh allocation.
    pub fn to_vec(self) -> Vec<u8> {
        let mut joined = Vec::new();
        for chunk in self {
            joined.extend_from_slice(chunk);
        }
        joined
    }
}

impl<'a> Debug for BytesIter<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("BytesIter")
    }
}

impl<'a> Display for BytesIter<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for chunk in *self {
            for byte in chunk {
                write!(f, "{:02x}", byte)?;
            }
        }
        Ok(())
    }
}

impl<'a> Iterator for BytesIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_chunk()
    }
}

impl<'a, S: AsRef<[u8]>> PartialEq<S> for BytesIter<'a> {
    fn eq(&self, other: &S) -> bool {
        let mut rest = other.as_ref();
        for chunk in *self {
            match rest.strip_prefix(chunk) {
                Some(r) => rest = r,
                None => return false,
            }
        }
        rest.is_empty()
    }
}

/// Iterator over the child items of an array.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArrayIter<'a>(ItemIter<'a>);

impl<'a> ArrayIter<'a> {
    /// `bytes` starts at the first child; `len` is `None` for indefinite
    /// length.
    pub(crate) fn over(bytes: &'a [u8], len: Option<u64>) -> Self {
        Self(ItemIter {
            bytes,
            remaining: len,
        })
    }

    /// Elements still to come, or `None` for indefinite-length encoding.
    pub fn size(&self) -> Option<u64> {
        self.0.remaining
    }
}

impl<'a> Debug for ArrayIter<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ArrayIter")
    }
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = &'a Cbor;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_item()
    }
}

/// Iterator over the key-value pairs of a map.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MapIter<'a>(ItemIter<'a>);

impl<'a> MapIter<'a> {
    /// `bytes` starts at the first key; `pairs` is `None` for indefinite
    /// length.
    pub(crate) fn over(bytes: &'a [u8], pairs: Option<u64>) -> Self {
        Self(ItemIter {
            bytes,
            remaining: pairs.map(|n| n * 2),
        })
    }

    /// Pairs still to come, or `None` for indefinite-length encoding.
    pub fn size(&self) -> Option<u64> {
        self.0.remaining.map(|n| n / 2)
    }
}

impl<'a> Debug for MapIter<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("MapIter")
    }
}

impl<'a> Iterator for MapIter<'a> {
    type Item = (&'a Cbor, &'a Cbor);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.0.next_item()?;
        let value = self.0.next_item()?;
        Some((key, value))
    }
}
