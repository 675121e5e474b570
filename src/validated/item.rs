use super::iter::{ArrayIter, BytesIter, MapIter, StringIter};
use super::tags::Tags;
use crate::{constants::*, Cbor};
use std::fmt::{Debug, Display, Formatter};

/// Classify an item by its initial byte (which the validator has accepted).
pub(crate) fn classify_initial(initial: u8) -> CborType {
    match initial >> 5 {
        MAJOR_POS => CborType::UnsignedInt,
        MAJOR_NEG => CborType::NegativeInt,
        MAJOR_BYTES => CborType::ByteString,
        MAJOR_STR => CborType::TextString,
        MAJOR_ARRAY => CborType::Array,
        MAJOR_MAP => CborType::Map,
        MAJOR_TAG => CborType::Tag,
        _ => match initial & 31 {
            LIT_FALSE | LIT_TRUE => CborType::Bool,
            LIT_NULL => CborType::Null,
            LIT_UNDEFINED => CborType::Undefined,
            LIT_FLOAT16 | LIT_FLOAT32 | LIT_FLOAT64 => CborType::Float,
            _ => CborType::Simple,
        },
    }
}

/// Coarse classification of a data item, as reported by the pull decoder and
/// carried in type errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CborType {
    UnsignedInt,
    NegativeInt,
    ByteString,
    TextString,
    Array,
    Map,
    Tag,
    Bool,
    Null,
    Undefined,
    Simple,
    Float,
}

impl Display for CborType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CborType::UnsignedInt => write!(f, "unsigned integer"),
            CborType::NegativeInt => write!(f, "negative integer"),
            CborType::ByteString => write!(f, "byte string"),
            CborType::TextString => write!(f, "text string"),
            CborType::Array => write!(f, "array"),
            CborType::Map => write!(f, "map"),
            CborType::Tag => write!(f, "tag"),
            CborType::Bool => write!(f, "boolean"),
            CborType::Null => write!(f, "null"),
            CborType::Undefined => write!(f, "undefined"),
            CborType::Simple => write!(f, "simple value"),
            CborType::Float => write!(f, "floating-point number"),
        }
    }
}

/// Low-level encoding of a CBOR item, without its tags.
///
/// You can obtain this representation from [`Cbor::kind`](crate::Cbor::kind)
/// or [`TaggedItem::kind`].
///
/// Beware of the `Neg` variant, which carries `-1 - x`.
#[derive(PartialEq, PartialOrd, Clone, Copy)]
pub enum ItemKind<'a> {
    Pos(u64),
    Neg(u64),
    Float(f64),
    Str(StringIter<'a>),
    Bytes(BytesIter<'a>),
    Bool(bool),
    Null,
    Undefined,
    Simple(u8),
    Array(ArrayIter<'a>),
    Map(MapIter<'a>),
}

impl<'a> ItemKind<'a> {
    pub fn new(cbor: &'a Cbor) -> Self {
        super::tagged_parts(cbor.as_slice()).1
    }

    /// The coarse type of this item (tags have already been stripped here).
    pub fn cbor_type(&self) -> CborType {
        match self {
            ItemKind::Pos(_) => CborType::UnsignedInt,
            ItemKind::Neg(_) => CborType::NegativeInt,
            ItemKind::Float(_) => CborType::Float,
            ItemKind::Str(_) => CborType::TextString,
            ItemKind::Bytes(_) => CborType::ByteString,
            ItemKind::Bool(_) => CborType::Bool,
            ItemKind::Null => CborType::Null,
            ItemKind::Undefined => CborType::Undefined,
            ItemKind::Simple(_) => CborType::Simple,
            ItemKind::Array(_) => CborType::Array,
            ItemKind::Map(_) => CborType::Map,
        }
    }

    /// Name used in type-mismatch errors.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            ItemKind::Pos(_) => "unsigned integer",
            ItemKind::Neg(_) => "negative integer",
            ItemKind::Float(_) => "float",
            ItemKind::Str(_) => "text string",
            ItemKind::Bytes(_) => "byte string",
            ItemKind::Bool(_) => "boolean",
            ItemKind::Null => "null",
            ItemKind::Undefined => "undefined",
            ItemKind::Simple(_) => "simple value",
            ItemKind::Array(_) => "array",
            ItemKind::Map(_) => "map",
        }
    }
}

impl<'a> Debug for ItemKind<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pos(arg0) => f.debug_tuple("Pos").field(arg0).finish(),
            Self::Neg(arg0) => f.debug_tuple("Neg").field(arg0).finish(),
            Self::Float(arg0) => f.debug_tuple("Float").field(arg0).finish(),
            Self::Str(arg0) => write!(f, "Str({})", arg0),
            Self::Bytes(arg0) => write!(f, "Bytes({})", arg0),
            Self::Bool(arg0) => f.debug_tuple("Bool").field(arg0).finish(),
            Self::Null => write!(f, "Null"),
            Self::Undefined => write!(f, "Undefined"),
            Self::Simple(arg0) => f.debug_tuple("Simple").field(arg0).finish(),
            Self::Array(arg0) => write!(f, "Array({:?})", arg0.size()),
            Self::Map(arg0) => write!(f, "Map({:?})", arg0.size()),
        }
    }
}

/// Representation of a possibly tagged CBOR data item.
///
/// You can obtain this using [`Cbor::tagged_item`](crate::Cbor::tagged_item).
/// It holds an iterable representation of the tags, a decoded [`ItemKind`]
/// and a reference to the underlying bytes for the whole item. Since all of
/// these are shallow references to existing data, this structure is `Copy`.
#[derive(Clone, Copy, PartialEq)]
pub struct TaggedItem<'a> {
    tags: Tags<'a>,
    kind: ItemKind<'a>,
    cbor: &'a Cbor,
}

impl<'a> Debug for TaggedItem<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaggedItem({:?}, {:?})", self.tags, self.kind)
    }
}

impl<'a> TaggedItem<'a> {
    pub fn new(cbor: &'a Cbor) -> Self {
        let (tags, kind) = super::tagged_parts(cbor.as_slice());
        Self { tags, kind, cbor }
    }

    /// An iterator over the tags of this item, outermost first.
    pub fn tags(&self) -> Tags<'a> {
        self.tags
    }

    /// A decoded form of the low-level representation of the CBOR item.
    pub fn kind(&self) -> ItemKind<'a> {
        self.kind
    }

    /// A reference to the underlying bytes from which this structure has
    /// been lifted.
    pub fn cbor(&self) -> &'a Cbor {
        self.cbor
    }
}
