use crate::CborType;
use std::{fmt, io, sync::Arc};
use thiserror::Error;

/// The exact malformation found by the well-formedness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyntaxKind {
    /// additional information 28–30 is reserved
    ReservedAdditionalInfo,
    /// two-byte encoding of simple values 0–31 is reserved
    InvalidSimpleValue(u8),
    /// break byte outside an indefinite-length container, or a map closed
    /// with an odd number of children
    UnexpectedBreak,
    /// the input ended in the middle of an item
    PrematureEof,
    /// chunk of an indefinite-length string is not a definite string of the
    /// same major type
    BadIndefiniteChunk,
    /// declared string length does not fit the host address space
    LengthOverflow,
    /// indefinite-length integers and tags are undefined
    IndefiniteIntegerOrTag,
    /// well-formed item followed by extra bytes
    TrailingData,
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxKind::ReservedAdditionalInfo => write!(f, "reserved additional information"),
            SyntaxKind::InvalidSimpleValue(n) => write!(f, "invalid simple value {}", n),
            SyntaxKind::UnexpectedBreak => write!(f, "unexpected break"),
            SyntaxKind::PrematureEof => write!(f, "unexpected end of input"),
            SyntaxKind::BadIndefiniteChunk => write!(f, "invalid indefinite-length chunk"),
            SyntaxKind::LengthOverflow => write!(f, "length overflows host size"),
            SyntaxKind::IndefiniteIntegerOrTag => {
                write!(f, "indefinite length on integer or tag")
            }
            SyntaxKind::TrailingData => write!(f, "trailing data after item"),
        }
    }
}

/// Well-formed bytes that violate a semantic rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SemanticKind {
    /// a text string holds invalid UTF-8
    InvalidUtf8,
    /// tag 0 content is not a text string
    Tag0Content,
    /// tag 1 content is not a number
    Tag1Content,
    /// tag 2/3 content is not a byte string
    BignumContent,
}

impl fmt::Display for SemanticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticKind::InvalidUtf8 => write!(f, "invalid UTF-8 in text string"),
            SemanticKind::Tag0Content => write!(f, "tag 0 not followed by a text string"),
            SemanticKind::Tag1Content => write!(f, "tag 1 not followed by a number"),
            SemanticKind::BignumContent => write!(f, "bignum tag not followed by a byte string"),
        }
    }
}

/// Errors produced by encoding, decoding, validation and diagnostics.
///
/// Every variant carries enough context to locate the fault: byte offsets for
/// malformed input, source/target type names for mismatches, the struct/field
/// breadcrumb where a reflective decode went wrong.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// malformed bytes
    #[error("{kind} at offset {offset}")]
    Syntax { offset: usize, kind: SyntaxKind },

    /// well-formed but invalid content
    #[error("{kind} at offset {offset}")]
    Semantic { offset: usize, kind: SemanticKind },

    /// the CBOR item cannot be placed into the requested target type
    #[error("cannot decode CBOR {source_type} into {target_type}{}", .breadcrumb.as_deref().map(|b| format!(" at {}", b)).unwrap_or_default())]
    TypeMismatch {
        source_type: &'static str,
        target_type: &'static str,
        breadcrumb: Option<String>,
    },

    /// value representable in CBOR but out of range of the chosen host type
    #[error("value {value} out of range for {target_type}")]
    Overflow {
        target_type: &'static str,
        value: i128,
    },

    /// the caller's value cannot be represented in CBOR
    #[error("unsupported type {type_name}")]
    UnsupportedType { type_name: &'static str },

    /// the decode target is not settable
    ///
    /// Rust's mutable references make this structurally unreachable in the
    /// slice and reader paths; the variant exists so bindings layered on top
    /// of the codec can report it.
    #[error("cannot decode into {target_type}")]
    InvalidUnmarshal { target_type: &'static str },

    /// a malformed field directory annotation on a derived struct
    #[error("invalid cbor annotation on {type_name}.{field}: {message}")]
    FieldTag {
        type_name: &'static str,
        field: &'static str,
        message: &'static str,
    },

    /// invalid option value or combination passed to `build()`
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),

    #[error("nesting depth exceeds the configured maximum of {max}")]
    MaxNestedLevel { max: usize },

    #[error("array of {len} elements exceeds the configured maximum of {max}")]
    MaxArrayElements { len: u64, max: u64 },

    #[error("map of {len} pairs exceeds the configured maximum of {max}")]
    MaxMapPairs { len: u64, max: u64 },

    /// indefinite-length item under a strict profile
    #[error("indefinite-length item at offset {offset} is forbidden")]
    IndefiniteLengthForbidden { offset: usize },

    /// second occurrence of a map key under the rejecting policy
    #[error("duplicate map key at pair index {index}")]
    DuplicateMapKey { index: usize },

    /// pull decoder: the item under the cursor is not of the requested type
    #[error("wrong type: next item is {actual}, caller asked for {expected}")]
    WrongType {
        actual: CborType,
        expected: CborType,
    },

    /// streaming encoder: chunk type does not match the open indefinite scope
    #[error("indefinite-length {expected} cannot accept {actual}")]
    IndefiniteChunkType {
        expected: CborType,
        actual: CborType,
    },

    /// streaming encoder: `end()` without an open indefinite scope
    #[error("no indefinite-length item is open")]
    EndOutsideIndefinite,

    /// streaming encoder: indefinite map closed with an odd number of items
    #[error("indefinite-length map closed with an odd number of items")]
    OddIndefiniteMap,

    /// clean end of a stream of items
    #[error("end of input")]
    EndOfInput,

    /// error from the underlying reader or writer
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),
}

impl Error {
    pub(crate) fn mismatch(source_type: &'static str, target_type: &'static str) -> Self {
        Error::TypeMismatch {
            source_type,
            target_type,
            breadcrumb: None,
        }
    }

    /// Attach a `Type.field` breadcrumb to a mismatch that has none yet.
    pub(crate) fn with_breadcrumb(self, type_name: &str, field: &str) -> Self {
        match self {
            Error::TypeMismatch {
                source_type,
                target_type,
                breadcrumb: None,
            } => Error::TypeMismatch {
                source_type,
                target_type,
                breadcrumb: Some(format!("{}.{}", type_name, field)),
            },
            other => other,
        }
    }

    /// Shift the offset of a syntax/semantic error by `base`, for errors
    /// produced on a sub-slice of the original input.
    pub(crate) fn rebase(self, base: usize) -> Self {
        match self {
            Error::Syntax { offset, kind } => Error::Syntax {
                offset: offset + base,
                kind,
            },
            Error::Semantic { offset, kind } => Error::Semantic {
                offset: offset + base,
                kind,
            },
            Error::IndefiniteLengthForbidden { offset } => {
                Error::IndefiniteLengthForbidden {
                    offset: offset + base,
                }
            }
            other => other,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
