//! Value-to-bytes encoding.
//!
//! [`Encode`] is the dispatch seam: every supported host shape implements it
//! by driving the [`Encoder`] primitives. Struct impls are generated by
//! `#[derive(Encode)]` and route through the mode's field directory.

mod encoder;
mod float;

pub use encoder::Encoder;

use crate::{error::Result, field::TypeShape, value::Value, Bignum, Cbor, CborOwned, Timestamp};
use std::{
    any::TypeId,
    collections::{BTreeMap, HashMap},
    io::Write,
};

/// Types that can be encoded as a single CBOR data item.
///
/// Implementations are always invoked by the encoder with the value treated
/// as one item; write exactly one item's worth of bytes.
pub trait Encode {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()>;

    /// Whether `omitempty` skips this value: false, zero, the empty string
    /// or container, an absent option.
    fn is_empty_value(&self) -> bool {
        false
    }
}

/// Field access for derived structs: the static shape the directory is
/// built from, plus reaching the field named by `path` (indices through
/// flattened shapes) to encode or probe it.
pub trait EncodeFields {
    fn shape() -> &'static TypeShape
    where
        Self: Sized;
    fn encode_field<W: Write>(&self, path: &[u32], e: &mut Encoder<'_, W>) -> Result<()>;
    fn field_is_empty(&self, path: &[u32]) -> bool;
}

/// Encode a derived struct through its field directory: a map in the order
/// the mode's sort dial demands, or an array when the shape says `toarray`.
pub fn encode_struct<T, W>(value: &T, e: &mut Encoder<'_, W>) -> Result<()>
where
    T: EncodeFields + 'static,
    W: Write,
{
    let dir = e.mode().directory(TypeId::of::<T>(), T::shape)?;
    if dir.to_array {
        let mark = e.buffer_len();
        e.suppressed(|e| {
            e.array_head(dir.fields().len() as u64);
            for field in dir.fields() {
                value.encode_field(&field.path, e)?;
            }
            Ok(())
        })?;
        e.finish_item(mark)
    } else {
        let sort = e.mode().options().sort;
        let mut body = e.map_begin();
        for field in dir.sorted(sort) {
            if field.omit_empty && value.field_is_empty(&field.path) {
                continue;
            }
            e.map_pair(
                &mut body,
                |e| {
                    e.write_raw_bytes(&field.encoded_key);
                    Ok(())
                },
                |e| value.encode_field(&field.path, e),
            )?;
        }
        // the directory pre-sorts struct keys, no runtime sort needed
        e.map_finish(body, true)
    }
}

macro_rules! encode_unsigned {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
                    e.encode_u64(*self as u64)
                }

                fn is_empty_value(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}
encode_unsigned!(u16, u32, u64, usize);

macro_rules! encode_signed {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
                    e.encode_i64(*self as i64)
                }

                fn is_empty_value(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}
encode_signed!(i8, i16, i32, i64, isize);

impl Encode for bool {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_bool(*self)
    }

    fn is_empty_value(&self) -> bool {
        !*self
    }
}

impl Encode for f32 {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_f32(*self)
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Encode for f64 {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_f64(*self)
    }

    fn is_empty_value(&self) -> bool {
        *self == 0.0
    }
}

impl Encode for str {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_str(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for String {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_str(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for [u8] {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_bytes(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for Vec<u8> {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_bytes(self)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_bytes(self)
    }

    fn is_empty_value(&self) -> bool {
        N == 0
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.array_head(self.len() as u64);
        for item in self {
            item.encode(e)?;
        }
        Ok(())
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        self.as_slice().encode(e)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        self.as_slice().encode(e)
    }

    fn is_empty_value(&self) -> bool {
        N == 0
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        match self {
            Some(value) => value.encode(e),
            None => e.encode_null(),
        }
    }

    fn is_empty_value(&self) -> bool {
        self.is_none()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        (**self).encode(e)
    }

    fn is_empty_value(&self) -> bool {
        (**self).is_empty_value()
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        (**self).encode(e)
    }

    fn is_empty_value(&self) -> bool {
        (**self).is_empty_value()
    }
}

impl<K: Encode, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        let mut body = e.map_begin();
        for (k, v) in self {
            e.map_pair(&mut body, |e| k.encode(e), |e| v.encode(e))?;
        }
        e.map_finish(body, false)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        let mut body = e.map_begin();
        for (k, v) in self {
            e.map_pair(&mut body, |e| k.encode(e), |e| v.encode(e))?;
        }
        e.map_finish(body, false)
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl Encode for Bignum {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_bignum(self)
    }
}

impl Encode for Timestamp {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_timestamp(self)
    }
}

impl Encode for Cbor {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_raw(self)
    }
}

impl Encode for CborOwned {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        e.encode_raw(self)
    }
}

impl Encode for Value {
    fn encode<W: Write>(&self, e: &mut Encoder<'_, W>) -> Result<()> {
        match self {
            Value::Bool(b) => e.encode_bool(*b),
            Value::Int(x) => e.encode_i64(*x),
            Value::Uint(x) => e.encode_u64(*x),
            Value::Float(x) => e.encode_f64(*x),
            Value::Bytes(b) => e.encode_bytes(b),
            Value::Text(s) => e.encode_str(s),
            Value::Array(items) => {
                e.array_head(items.len() as u64);
                for item in items {
                    item.encode(e)?;
                }
                Ok(())
            }
            Value::Map(pairs) => {
                let mut body = e.map_begin();
                for (k, v) in pairs {
                    e.map_pair(&mut body, |e| k.encode(e), |e| v.encode(e))?;
                }
                e.map_finish(body, false)
            }
            Value::Tag(tag, inner) => {
                e.encode_tag(*tag)?;
                inner.encode(e)
            }
            Value::Simple(s) => e.encode_simple(*s),
            Value::Bignum(b) => e.encode_bignum(b),
            Value::Null => e.encode_null(),
            Value::Undefined => e.encode_undefined(),
        }
    }

    fn is_empty_value(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }
}
