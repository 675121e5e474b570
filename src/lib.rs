#![doc = include_str!("../README.md")]

use std::{
    borrow::{Borrow, Cow},
    convert::TryFrom,
    fmt::{Debug, Display, Write},
    ops::Deref,
};

mod bigint;
pub mod constants;
mod decode;
mod diag;
mod encode;
mod error;
mod field;
mod mode;
mod options;
mod stream;
mod time;
mod validate;
mod validated;
mod value;
mod wire;

#[cfg(test)]
mod tests;

pub use bigint::Bignum;
pub use decode::{decode_struct, decode_struct_into, DecCtx, Decode, DecodeFields};
pub use diag::{diagnose, diagnose_first, diagnose_with, ByteStringBase, DiagOptions};
pub use encode::{encode_struct, Encode, EncodeFields, Encoder};
pub use error::{Error, Result, SemanticKind, SyntaxKind};
pub use field::{Field, FieldDirectory, FieldKey, FieldSpec, TypeShape};
pub use mode::{default_dec_mode, default_enc_mode, DecMode, EncMode};
pub use options::{
    BignumConvert, DecOptions, DupMapKey, EncOptions, IndefLength, InfConvert, NanConvert,
    ShortestFloat, SortMode, TimeMode, Utf8Mode,
};
pub use stream::{Decoder, PullDecoder};
pub use time::Timestamp;
pub use validate::{validate, validate_prefix, Limits, Valid};
pub use validated::{
    item::{CborType, ItemKind, TaggedItem},
    iter::{ArrayIter, BytesIter, MapIter, StringIter},
    tags::Tags,
};
pub use value::Value;
pub use wire::{is_break, read_head, write_head, Head, HeadArg};

#[cfg(feature = "derive")]
pub use cbor_codec_derive::{Decode, Encode};

use smallvec::SmallVec;

/// Encode a value with the default mode.
pub fn marshal<T: Encode + ?Sized>(value: &T) -> Result<CborOwned> {
    default_enc_mode().marshal(value)
}

/// Decode one item with the default mode.
pub fn unmarshal<T: decode::Decode>(bytes: &[u8]) -> Result<T> {
    default_dec_mode().unmarshal(bytes)
}

/// Decode the first item of a sequence with the default mode, returning the
/// remaining bytes.
pub fn unmarshal_first<T: decode::Decode>(bytes: &[u8]) -> Result<(T, &[u8])> {
    default_dec_mode().unmarshal_first(bytes)
}

/// Wrapper around a byte slice that encodes a well-formed CBOR item.
///
/// For details on the format see [RFC 8949](https://www.rfc-editor.org/rfc/rfc8949).
///
/// Bytes from the outside (e.g. from the network) should come in through
/// [`Cbor::checked`] or a [`DecMode`]; output of this crate's encoder can be
/// wrapped with [`unchecked`](Cbor::unchecked).
///
/// The Display implementation renders [diagnostic
/// notation](https://www.rfc-editor.org/rfc/rfc8949#section-8).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Cbor([u8]);

impl Debug for Cbor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut groups = 0;
        f.write_str("Cbor(")?;
        for chunk in self.0.chunks(4) {
            if groups > 0 {
                f.write_char(' ')?;
            } else {
                groups = 1;
            }
            for byte in chunk {
                write!(f, "{:02x}", byte)?;
            }
        }
        f.write_char(')')
    }
}

impl Display for Cbor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        diag::render_item(f, self.tagged_item(), &DiagOptions::default())
    }
}

impl AsRef<[u8]> for Cbor {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<'a> TryFrom<&'a [u8]> for &'a Cbor {
    type Error = Error;

    fn try_from(value: &'a [u8]) -> Result<Self> {
        Cbor::checked(value)
    }
}

impl ToOwned for Cbor {
    type Owned = CborOwned;

    fn to_owned(&self) -> Self::Owned {
        CborOwned::unchecked(&self.0)
    }
}

impl Cbor {
    /// Unconditionally cast the given byte slice as a CBOR item.
    ///
    /// No integrity checks are made; navigation may panic on malformed
    /// bytes. Treat data from unreliable sources with [`checked`](Self::checked).
    /// The results of this crate's encoder can safely be fed to this method.
    pub fn unchecked(bytes: &[u8]) -> &Self {
        unsafe { std::mem::transmute(bytes) }
    }

    /// Cast the given byte slice as a CBOR item if it is exactly one
    /// well-formed item under the default limits.
    pub fn checked(bytes: &[u8]) -> Result<&Self> {
        validate::validate(bytes, &Limits::default())?;
        Ok(Self::unchecked(bytes))
    }

    /// Split one well-formed item off the front of a byte sequence.
    pub fn checked_prefix(bytes: &[u8]) -> Result<(&Self, &[u8])> {
        let v = validate::validate_prefix(bytes, &Limits::default())?;
        Ok((Self::unchecked(&bytes[..v.len]), &bytes[v.len..]))
    }

    /// A view onto the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Decode into the dynamic [`Value`] representation using the default
    /// mode.
    pub fn decode(&self) -> Result<Value> {
        default_dec_mode().unmarshal(&self.0)
    }

    /// An iterator over the tags present on this item, outermost first.
    pub fn tags(&self) -> Tags<'_> {
        validated::tag_chain(self.as_slice()).0
    }

    /// The low-level encoding of this item, without its tags.
    pub fn kind(&self) -> ItemKind<'_> {
        ItemKind::new(self)
    }

    /// The low-level encoding of this item with its tags.
    pub fn tagged_item(&self) -> TaggedItem<'_> {
        TaggedItem::new(self)
    }
}

/// Owned variant of [`Cbor`].
///
/// Values up to 16 bytes (most scalars) are stored inline.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct CborOwned(SmallVec<[u8; 16]>);

impl Debug for CborOwned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(Borrow::<Cbor>::borrow(self), f)
    }
}

impl Display for CborOwned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(Borrow::<Cbor>::borrow(self), f)
    }
}

impl Borrow<Cbor> for CborOwned {
    fn borrow(&self) -> &Cbor {
        Cbor::unchecked(&self.0)
    }
}

impl AsRef<Cbor> for CborOwned {
    fn as_ref(&self) -> &Cbor {
        Cbor::unchecked(&self.0)
    }
}

impl AsRef<[u8]> for CborOwned {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for CborOwned {
    type Target = Cbor;

    fn deref(&self) -> &Self::Target {
        self.borrow()
    }
}

impl TryFrom<&[u8]> for CborOwned {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        Self::checked(value)
    }
}

impl CborOwned {
    /// Copy the bytes and wrap them without integrity checks.
    pub fn unchecked(bytes: impl Into<SmallVec<[u8; 16]>>) -> Self {
        Self(bytes.into())
    }

    /// Copy the bytes after checking that they are exactly one well-formed
    /// item under the default limits.
    pub fn checked(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        validate::validate(bytes, &Limits::default())?;
        Ok(Self::unchecked(bytes))
    }
}

impl Cbor {
    /// Convert borrowed or owned bytes without integrity checks.
    pub fn from_cow_unchecked(bytes: Cow<'_, [u8]>) -> Cow<'_, Cbor> {
        match bytes {
            Cow::Borrowed(b) => Cow::Borrowed(Cbor::unchecked(b)),
            Cow::Owned(v) => Cow::Owned(CborOwned::unchecked(v)),
        }
    }
}
