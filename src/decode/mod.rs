//! Bytes-to-value decoding over validated input.
//!
//! [`Decode`] is the reflective face: decode into a caller-supplied type,
//! in place where the type supports it. [`Value`] decoding is the dynamic
//! face. Both walk [`TaggedItem`]s produced by the validated layer; the
//! pull-stream face lives in [`crate::stream`].
//!
//! Error policy inside one aggregate: the walk always completes, the first
//! per-element error is returned afterwards, and everything decoded before
//! and after the fault stays in the target.

use crate::{
    constants::{TAG_BIGNUM_NEG, TAG_BIGNUM_POS, TAG_EPOCH, TAG_ISO8601},
    error::{Error, Result, SemanticKind},
    field::TypeShape,
    mode::DecMode,
    options::DupMapKey,
    validated::item::{ItemKind, TaggedItem},
    value::Value,
    Bignum, CborOwned, Timestamp,
};
use std::{
    any::TypeId,
    collections::{BTreeMap, HashMap, HashSet},
    hash::{BuildHasher, Hash},
};

/// Decoding context: the mode plus room for future per-call state.
pub struct DecCtx<'m> {
    mode: &'m DecMode,
}

impl<'m> DecCtx<'m> {
    pub(crate) fn new(mode: &'m DecMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &'m DecMode {
        self.mode
    }
}

/// Types that can be decoded from a single CBOR data item.
pub trait Decode: Sized {
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self>;

    /// Decode in place. Containers override this to reuse allocations and
    /// update existing entries; the default replaces the value.
    fn decode_into(&mut self, item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<()> {
        *self = Self::decode(item, ctx)?;
        Ok(())
    }
}

/// Field access for derived structs: the static shape the directory is
/// built from, plus reaching the field named by `path` to decode into it.
pub trait DecodeFields {
    fn shape() -> &'static TypeShape
    where
        Self: Sized;
    fn decode_field(
        &mut self,
        path: &[u32],
        item: TaggedItem<'_>,
        ctx: &DecCtx<'_>,
    ) -> Result<()>;
}

fn uint_from(item: TaggedItem<'_>, target: &'static str, max: u64) -> Result<u64> {
    match item.kind() {
        ItemKind::Pos(x) if x <= max => Ok(x),
        ItemKind::Pos(x) => Err(Error::Overflow {
            target_type: target,
            value: x as i128,
        }),
        kind => Err(Error::mismatch(kind.type_name(), target)),
    }
}

fn int_from(item: TaggedItem<'_>, target: &'static str, min: i64, max: i64) -> Result<i64> {
    let value = match item.kind() {
        ItemKind::Pos(x) => x as i128,
        ItemKind::Neg(x) => -1 - x as i128,
        kind => return Err(Error::mismatch(kind.type_name(), target)),
    };
    if value < min as i128 || value > max as i128 {
        return Err(Error::Overflow {
            target_type: target,
            value,
        });
    }
    Ok(value as i64)
}

macro_rules! decode_unsigned {
    ($($t:ty),*) => {
        $(
            impl Decode for $t {
                fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
                    uint_from(item, stringify!($t), <$t>::MAX as u64).map(|v| v as $t)
                }
            }
        )*
    };
}
decode_unsigned!(u8, u16, u32, u64, usize);

macro_rules! decode_signed {
    ($($t:ty),*) => {
        $(
            impl Decode for $t {
                fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
                    int_from(item, stringify!($t), <$t>::MIN as i64, <$t>::MAX as i64)
                        .map(|v| v as $t)
                }
            }
        )*
    };
}
decode_signed!(i8, i16, i32, i64, isize);

impl Decode for bool {
    fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
        match item.kind() {
            ItemKind::Bool(b) => Ok(b),
            kind => Err(Error::mismatch(kind.type_name(), "bool")),
        }
    }
}

impl Decode for f64 {
    fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
        match item.kind() {
            ItemKind::Float(f) => Ok(f),
            ItemKind::Pos(x) => Ok(x as f64),
            ItemKind::Neg(x) => Ok(-1.0 - x as f64),
            kind => Err(Error::mismatch(kind.type_name(), "f64")),
        }
    }
}

impl Decode for f32 {
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self> {
        let wide = f64::decode(item, ctx).map_err(|e| match e {
            Error::TypeMismatch { source_type, .. } => Error::mismatch(source_type, "f32"),
            other => other,
        })?;
        if wide.is_finite() && (wide > f32::MAX as f64 || wide < f32::MIN as f64) {
            return Err(Error::Overflow {
                target_type: "f32",
                value: wide as i128,
            });
        }
        Ok(wide as f32)
    }
}

impl Decode for String {
    fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
        match item.kind() {
            ItemKind::Str(s) => Ok(s.as_cow().into_owned()),
            kind => Err(Error::mismatch(kind.type_name(), "String")),
        }
    }
}

impl Decode for Vec<u8> {
    fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
        match item.kind() {
            ItemKind::Bytes(b) => Ok(b.to_vec()),
            kind => Err(Error::mismatch(kind.type_name(), "Vec<u8>")),
        }
    }

    fn decode_into(&mut self, item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<()> {
        match item.kind() {
            ItemKind::Bytes(b) => {
                self.clear();
                for chunk in b {
                    self.extend_from_slice(chunk);
                }
                Ok(())
            }
            kind => Err(Error::mismatch(kind.type_name(), "Vec<u8>")),
        }
    }
}

fn fill_seq<T: Decode>(out: &mut Vec<T>, item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<()> {
    let iter = match item.kind() {
        ItemKind::Array(a) => a,
        kind => return Err(Error::mismatch(kind.type_name(), "array")),
    };
    if let Some(size) = iter.size() {
        out.reserve(size.min(65536) as usize);
    }
    let mut first_err = None;
    for element in iter {
        match T::decode(element.tagged_item(), ctx) {
            Ok(v) => out.push(v),
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self> {
        let mut out = Vec::new();
        fill_seq(&mut out, item, ctx)?;
        Ok(out)
    }

    fn decode_into(&mut self, item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<()> {
        self.clear();
        fill_seq(self, item, ctx)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self> {
        match item.kind() {
            ItemKind::Null | ItemKind::Undefined => Ok(None),
            _ => T::decode(item, ctx).map(Some),
        }
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self> {
        T::decode(item, ctx).map(Box::new)
    }
}

/// Shared map fill: update semantics, duplicate detection on the encoded
/// key bytes, walk-to-completion error policy.
macro_rules! fill_map {
    ($map:expr, $item:expr, $ctx:expr, $target:literal) => {{
        let iter = match $item.kind() {
            ItemKind::Map(m) => m,
            kind => return Err(Error::mismatch(kind.type_name(), $target)),
        };
        let reject = $ctx.mode().options().dup_map_key == DupMapKey::Reject;
        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut first_err = None;
        let mut record = |e: Error, first_err: &mut Option<Error>| {
            if first_err.is_none() {
                *first_err = Some(e);
            }
        };
        for (index, (k, v)) in iter.enumerate() {
            if reject && !seen.insert(k.as_slice()) {
                record(Error::DuplicateMapKey { index }, &mut first_err);
                continue;
            }
            let key = match Decode::decode(k.tagged_item(), $ctx) {
                Ok(key) => key,
                Err(e) => {
                    record(e, &mut first_err);
                    continue;
                }
            };
            match Decode::decode(v.tagged_item(), $ctx) {
                Ok(value) => {
                    $map.insert(key, value);
                }
                Err(e) => record(e, &mut first_err),
            }
        }
        first_err.map_or(Ok(()), Err)
    }};
}

impl<K, V, S> Decode for HashMap<K, V, S>
where
    K: Decode + Eq + Hash,
    V: Decode,
    S: BuildHasher + Default,
{
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self> {
        let mut out = Self::default();
        out.decode_into(item, ctx)?;
        Ok(out)
    }

    fn decode_into(&mut self, item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<()> {
        fill_map!(self, item, ctx, "map")
    }
}

impl<K, V> Decode for BTreeMap<K, V>
where
    K: Decode + Ord,
    V: Decode,
{
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self> {
        let mut out = Self::new();
        out.decode_into(item, ctx)?;
        Ok(out)
    }

    fn decode_into(&mut self, item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<()> {
        fill_map!(self, item, ctx, "map")
    }
}

impl Decode for Bignum {
    fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
        match (item.tags().single(), item.kind()) {
            (Some(TAG_BIGNUM_POS), ItemKind::Bytes(b)) => {
                Ok(Bignum::from_unsigned_be_bytes(&b.as_cow()))
            }
            (Some(TAG_BIGNUM_NEG), ItemKind::Bytes(b)) => {
                Ok(Bignum::from_negative_be_bytes(&b.as_cow()))
            }
            (Some(TAG_BIGNUM_POS) | Some(TAG_BIGNUM_NEG), _) => Err(Error::Semantic {
                offset: 0,
                kind: SemanticKind::BignumContent,
            }),
            (None, ItemKind::Pos(x)) => Ok(Bignum::from_u64(x)),
            (None, ItemKind::Neg(x)) => Ok(Bignum::from_negative_be_bytes(&x.to_be_bytes())),
            (_, kind) => Err(Error::mismatch(kind.type_name(), "Bignum")),
        }
    }
}

impl Decode for Timestamp {
    fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
        let semantic = |kind| Error::Semantic { offset: 0, kind };
        match (item.tags().single(), item.kind()) {
            (None | Some(TAG_ISO8601), ItemKind::Str(s)) => {
                Timestamp::from_rfc3339(&s.as_cow())
                    .ok_or_else(|| Error::mismatch("text string", "Timestamp"))
            }
            (Some(TAG_ISO8601), _) => Err(semantic(SemanticKind::Tag0Content)),
            (None | Some(TAG_EPOCH), ItemKind::Pos(x)) => {
                Ok(Timestamp::new(x.min(i64::MAX as u64) as i64, 0, 0))
            }
            (None | Some(TAG_EPOCH), ItemKind::Neg(x)) => {
                Ok(Timestamp::new(-1 - x.min(i64::MAX as u64) as i64, 0, 0))
            }
            (None | Some(TAG_EPOCH), ItemKind::Float(f)) => Ok(Timestamp::from_epoch_f64(f)),
            (Some(TAG_EPOCH), _) => Err(semantic(SemanticKind::Tag1Content)),
            (_, kind) => Err(Error::mismatch(kind.type_name(), "Timestamp")),
        }
    }
}

impl Decode for CborOwned {
    fn decode(item: TaggedItem<'_>, _ctx: &DecCtx<'_>) -> Result<Self> {
        Ok(CborOwned::unchecked(item.cbor().as_slice()))
    }
}

impl Decode for Value {
    fn decode(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<Self> {
        let mut tags: Vec<u64> = item.tags().collect();
        let base = match (tags.last().copied(), item.kind()) {
            (Some(TAG_BIGNUM_POS), ItemKind::Bytes(b)) => {
                tags.pop();
                Value::Bignum(Bignum::from_unsigned_be_bytes(&b.as_cow()))
            }
            (Some(TAG_BIGNUM_NEG), ItemKind::Bytes(b)) => {
                tags.pop();
                Value::Bignum(Bignum::from_negative_be_bytes(&b.as_cow()))
            }
            (_, kind) => plain_value(kind, ctx)?,
        };
        Ok(tags
            .into_iter()
            .rev()
            .fold(base, |v, t| Value::Tag(t, Box::new(v))))
    }
}

fn plain_value(kind: ItemKind<'_>, ctx: &DecCtx<'_>) -> Result<Value> {
    Ok(match kind {
        ItemKind::Pos(x) => {
            if x <= i64::MAX as u64 {
                Value::Int(x as i64)
            } else {
                Value::Uint(x)
            }
        }
        ItemKind::Neg(x) => {
            if x <= i64::MAX as u64 {
                Value::Int(-1 - x as i64)
            } else {
                return Err(Error::Overflow {
                    target_type: "i64",
                    value: -1 - x as i128,
                });
            }
        }
        ItemKind::Float(f) => Value::Float(f),
        ItemKind::Str(s) => Value::Text(s.as_cow().into_owned()),
        ItemKind::Bytes(b) => Value::Bytes(b.to_vec()),
        ItemKind::Bool(b) => Value::Bool(b),
        ItemKind::Null => Value::Null,
        ItemKind::Undefined => Value::Undefined,
        ItemKind::Simple(s) => Value::Simple(s),
        ItemKind::Array(a) => {
            let mut out = Vec::new();
            let mut first_err = None;
            for element in a {
                match Value::decode(element.tagged_item(), ctx) {
                    Ok(v) => out.push(v),
                    Err(e) => {
                        if first_err.is_none() {
                            first_err = Some(e);
                        }
                    }
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
            Value::Array(out)
        }
        ItemKind::Map(m) => {
            let reject = ctx.mode().options().dup_map_key == DupMapKey::Reject;
            let mut pairs: Vec<(Value, Value)> = Vec::new();
            let mut first_err = None;
            let mut record = |e: Error, first_err: &mut Option<Error>| {
                if first_err.is_none() {
                    *first_err = Some(e);
                }
            };
            for (index, (k, v)) in m.enumerate() {
                let key = match Value::decode(k.tagged_item(), ctx) {
                    Ok(key) => key,
                    Err(e) => {
                        record(e, &mut first_err);
                        continue;
                    }
                };
                if !key.is_valid_map_key() {
                    record(
                        Error::mismatch(key.type_name(), "map key"),
                        &mut first_err,
                    );
                    continue;
                }
                let value = match Value::decode(v.tagged_item(), ctx) {
                    Ok(value) => value,
                    Err(e) => {
                        record(e, &mut first_err);
                        continue;
                    }
                };
                if let Some(existing) = pairs.iter_mut().find(|(pk, _)| *pk == key) {
                    if reject {
                        record(Error::DuplicateMapKey { index }, &mut first_err);
                    } else {
                        existing.1 = value;
                    }
                } else {
                    pairs.push((key, value));
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
            Value::Map(pairs)
        }
    })
}

/// Decode a derived struct, starting from its `Default` value.
pub fn decode_struct<T>(item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<T>
where
    T: DecodeFields + Default + 'static,
{
    let mut value = T::default();
    decode_struct_into(&mut value, item, ctx)?;
    Ok(value)
}

/// Decode a derived struct in place: map keys are looked up in the field
/// directory (exact first, then the unique case-insensitive match), unknown
/// keys are skipped, `toarray` shapes require an exact element count.
pub fn decode_struct_into<T>(value: &mut T, item: TaggedItem<'_>, ctx: &DecCtx<'_>) -> Result<()>
where
    T: DecodeFields + 'static,
{
    let dir = ctx.mode().directory(TypeId::of::<T>(), T::shape)?;
    if dir.to_array {
        let iter = match item.kind() {
            ItemKind::Array(a) => a,
            kind => return Err(Error::mismatch(kind.type_name(), dir.type_name)),
        };
        let fields = dir.fields();
        let mut first_err = None;
        let mut count = 0usize;
        for element in iter {
            if let Some(field) = fields.get(count) {
                if let Err(e) = value.decode_field(&field.path, element.tagged_item(), ctx) {
                    if first_err.is_none() {
                        first_err = Some(e.with_breadcrumb(dir.type_name, &field.key_name()));
                    }
                }
            }
            count += 1;
        }
        if count != fields.len() {
            return Err(Error::mismatch("array", dir.type_name));
        }
        first_err.map_or(Ok(()), Err)
    } else {
        let iter = match item.kind() {
            ItemKind::Map(m) => m,
            kind => return Err(Error::mismatch(kind.type_name(), dir.type_name)),
        };
        let reject = ctx.mode().options().dup_map_key == DupMapKey::Reject;
        // duplicate detection covers keys the struct does not declare, so it
        // runs on the encoded key bytes (like the map impls) before the
        // directory lookup; the per-field flags additionally catch repeats
        // that reach one field under differently spelled keys
        let mut seen_keys: HashSet<&[u8]> = HashSet::new();
        let mut seen_fields = vec![false; dir.fields().len()];
        let mut first_err = None;
        for (index, (k, v)) in iter.enumerate() {
            if reject && !seen_keys.insert(k.as_slice()) {
                if first_err.is_none() {
                    first_err = Some(Error::DuplicateMapKey { index });
                }
                continue;
            }
            let found = match k.kind() {
                ItemKind::Str(s) => dir.by_text_key(&s.as_cow()),
                ItemKind::Pos(x) if x <= i64::MAX as u64 => dir.by_int_key(x as i64),
                ItemKind::Neg(x) if x <= i64::MAX as u64 => dir.by_int_key(-1 - x as i64),
                _ => None,
            };
            let (field_index, field) = match found {
                Some(f) => f,
                None => continue,
            };
            if seen_fields[field_index] && reject {
                if first_err.is_none() {
                    first_err = Some(Error::DuplicateMapKey { index });
                }
                continue;
            }
            seen_fields[field_index] = true;
            if let Err(e) = value.decode_field(&field.path, v.tagged_item(), ctx) {
                if first_err.is_none() {
                    first_err = Some(e.with_breadcrumb(dir.type_name, &field.key_name()));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
