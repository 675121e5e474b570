//! Navigation over bytes that have already passed the well-formedness check.
//! Everything in this module and below assumes valid CBOR input!
//!
//! The central primitive is [`item_len`]: an iterative walker that measures
//! one item without materializing it, driven by a stack of open-container
//! counters (the same shape as the validator, minus the checking). Chunk and
//! element iteration are built on top of it.

use self::iter::{ArrayIter, BytesIter, MapIter, StringIter};
use crate::{constants::*, wire::is_break, ItemKind};
use smallvec::SmallVec;

pub mod item;
pub mod iter;
pub mod tags;

use tags::Tags;

/// Head of a validated item: major type, argument (`None` for indefinite
/// length) and the head's byte length. No checking — the validator has
/// already accepted these bytes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawHead {
    pub major: u8,
    pub arg: Option<u64>,
    pub len: usize,
}

pub(crate) fn head_at(bytes: &[u8], offset: usize) -> RawHead {
    let initial = bytes[offset];
    let major = initial >> 5;
    let field = |n: usize| {
        let mut buf = [0u8; 8];
        buf[8 - n..].copy_from_slice(&bytes[offset + 1..offset + 1 + n]);
        u64::from_be_bytes(buf)
    };
    let (arg, len) = match initial & 31 {
        24 => (Some(field(1)), 2),
        25 => (Some(field(2)), 3),
        26 => (Some(field(4)), 5),
        27 => (Some(field(8)), 9),
        INDEFINITE_SIZE => (None, 1),
        small => (Some(small as u64), 1),
    };
    RawHead { major, arg, len }
}

/// Encoded length of the item starting at `bytes[0]`.
///
/// Containers are crossed iteratively: each open container contributes a
/// pending-children counter (`None` for indefinite length, closed by the
/// break byte), tags count as containers of one.
pub(crate) fn item_len(bytes: &[u8]) -> usize {
    let mut offset = 0usize;
    let mut open: SmallVec<[Option<u64>; 8]> = SmallVec::new();
    loop {
        if is_break(bytes[offset]) {
            open.pop();
            offset += 1;
        } else {
            let head = head_at(bytes, offset);
            offset += head.len;
            match head.major {
                MAJOR_BYTES | MAJOR_STR => match head.arg {
                    Some(payload) => offset += payload as usize,
                    None => {
                        while !is_break(bytes[offset]) {
                            let chunk = head_at(bytes, offset);
                            offset += chunk.len + chunk.arg.unwrap_or(0) as usize;
                        }
                        offset += 1;
                    }
                },
                MAJOR_TAG => {
                    open.push(Some(1));
                    continue;
                }
                MAJOR_ARRAY | MAJOR_MAP => {
                    let children = match head.arg {
                        Some(n) if head.major == MAJOR_MAP => Some(n * 2),
                        other => other,
                    };
                    if children != Some(0) {
                        open.push(children);
                        continue;
                    }
                }
                _ => {}
            }
        }
        // one item (or a whole container) just ended; settle the parents
        loop {
            match open.last_mut() {
                None => return offset,
                Some(None) => break,
                Some(Some(pending)) => {
                    *pending -= 1;
                    if *pending > 0 {
                        break;
                    }
                    open.pop();
                }
            }
        }
    }
}

/// Split an item into its tag chain and the bytes of the inner item.
pub(crate) fn tag_chain(bytes: &[u8]) -> (Tags<'_>, &[u8]) {
    let mut offset = 0usize;
    while bytes[offset] >> 5 == MAJOR_TAG {
        offset += head_at(bytes, offset).len;
    }
    (Tags::new(&bytes[..offset]), &bytes[offset..])
}

/// Read a float item of any of the three widths at `bytes[0]`.
pub(crate) fn float(bytes: &[u8]) -> f64 {
    let bits = head_at(bytes, 0).arg.unwrap_or(0);
    match bytes[0] & 31 {
        LIT_FLOAT16 => half::f16::from_bits(bits as u16).to_f64(),
        LIT_FLOAT32 => f32::from_bits(bits as u32) as f64,
        _ => f64::from_bits(bits),
    }
}

fn item(bytes: &[u8]) -> ItemKind {
    let head = head_at(bytes, 0);
    let body = &bytes[head.len..];
    match head.major {
        MAJOR_POS => ItemKind::Pos(head.arg.unwrap_or(0)),
        MAJOR_NEG => ItemKind::Neg(head.arg.unwrap_or(0)),
        MAJOR_BYTES => ItemKind::Bytes(BytesIter::of_item(bytes, head)),
        MAJOR_STR => ItemKind::Str(StringIter::of_item(bytes, head)),
        MAJOR_ARRAY => ItemKind::Array(ArrayIter::over(body, head.arg)),
        MAJOR_MAP => ItemKind::Map(MapIter::over(body, head.arg)),
        MAJOR_TAG => item(body),
        _ => match bytes[0] & 31 {
            LIT_FALSE => ItemKind::Bool(false),
            LIT_TRUE => ItemKind::Bool(true),
            LIT_NULL => ItemKind::Null,
            LIT_UNDEFINED => ItemKind::Undefined,
            LIT_FLOAT16 | LIT_FLOAT32 | LIT_FLOAT64 => ItemKind::Float(float(bytes)),
            LIT_SIMPLE => ItemKind::Simple(bytes[1]),
            small => ItemKind::Simple(small),
        },
    }
}

/// Split an item into its tag chain and the kind of the inner item.
pub(crate) fn tagged_parts(bytes: &[u8]) -> (Tags<'_>, ItemKind<'_>) {
    let (tags, inner) = tag_chain(bytes);
    (tags, item(inner))
}
