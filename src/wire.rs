//! Head encoding and decoding — the initial byte plus its 0/1/2/4/8-byte
//! big-endian argument.

use crate::{
    constants::*,
    error::{Error, Result, SyntaxKind},
};

/// Argument carried by an item head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadArg {
    /// inline or follow-up argument value
    Value(u64),
    /// AI = 31 on a string, array or map
    Indefinite,
    /// the 0xff stop byte
    Break,
}

/// A decoded item head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    pub major: u8,
    pub arg: HeadArg,
    /// bytes consumed by the head
    pub len: usize,
}

/// True iff the byte is the break sentinel terminating an indefinite item.
pub fn is_break(byte: u8) -> bool {
    byte == STOP_BYTE
}

/// The head for `arg` in the smallest of the five encodings (preferred
/// serialization), as a fixed buffer plus its filled length.
pub(crate) fn head_bytes(major: u8, arg: u64) -> ([u8; 9], usize) {
    let mut buf = [0u8; 9];
    if arg < 24 {
        buf[0] = major << 5 | arg as u8;
        (buf, 1)
    } else if arg < 0x100 {
        buf[0] = major << 5 | 24;
        buf[1] = arg as u8;
        (buf, 2)
    } else if arg < 0x1_0000 {
        buf[0] = major << 5 | 25;
        buf[1..3].copy_from_slice(&(arg as u16).to_be_bytes());
        (buf, 3)
    } else if arg < 0x1_0000_0000 {
        buf[0] = major << 5 | 26;
        buf[1..5].copy_from_slice(&(arg as u32).to_be_bytes());
        (buf, 5)
    } else {
        buf[0] = major << 5 | 27;
        buf[1..9].copy_from_slice(&arg.to_be_bytes());
        (buf, 9)
    }
}

/// Write the head for `arg` in the smallest of the five encodings
/// (preferred serialization). Returns the number of bytes written.
pub fn write_head(out: &mut Vec<u8>, major: u8, arg: u64) -> usize {
    let (buf, len) = head_bytes(major, arg);
    out.extend_from_slice(&buf[..len]);
    len
}

pub fn write_indefinite(out: &mut Vec<u8>, major: u8) {
    out.push(major << 5 | INDEFINITE_SIZE);
}

pub(crate) fn write_break(out: &mut Vec<u8>) {
    out.push(STOP_BYTE);
}

/// Read the head starting at `bytes[offset]`.
///
/// Rejects reserved additional information (28–30), indefinite length on
/// integers and tags, and the reserved two-byte encoding of simple values
/// 0–31. AI = 31 is reported as [`HeadArg::Indefinite`] (or
/// [`HeadArg::Break`] for major type 7) and left to the caller to place in
/// context.
pub fn read_head(bytes: &[u8], offset: usize) -> Result<Head> {
    let eof = |at: usize| Error::Syntax {
        offset: at,
        kind: SyntaxKind::PrematureEof,
    };
    let initial = *bytes.get(offset).ok_or_else(|| eof(offset))?;
    let major = initial >> 5;
    let ai = initial & 31;
    match ai {
        0..=23 => Ok(Head {
            major,
            arg: HeadArg::Value(ai as u64),
            len: 1,
        }),
        24 => {
            let b = *bytes.get(offset + 1).ok_or_else(|| eof(bytes.len()))?;
            if major == MAJOR_LIT && b < 32 {
                return Err(Error::Syntax {
                    offset,
                    kind: SyntaxKind::InvalidSimpleValue(b),
                });
            }
            Ok(Head {
                major,
                arg: HeadArg::Value(b as u64),
                len: 2,
            })
        }
        25 => {
            let v = be_arg(bytes, offset, 2)?;
            Ok(Head {
                major,
                arg: HeadArg::Value(v),
                len: 3,
            })
        }
        26 => {
            let v = be_arg(bytes, offset, 4)?;
            Ok(Head {
                major,
                arg: HeadArg::Value(v),
                len: 5,
            })
        }
        27 => {
            let v = be_arg(bytes, offset, 8)?;
            Ok(Head {
                major,
                arg: HeadArg::Value(v),
                len: 9,
            })
        }
        28..=30 => Err(Error::Syntax {
            offset,
            kind: SyntaxKind::ReservedAdditionalInfo,
        }),
        _ => match major {
            MAJOR_LIT => Ok(Head {
                major,
                arg: HeadArg::Break,
                len: 1,
            }),
            MAJOR_BYTES | MAJOR_STR | MAJOR_ARRAY | MAJOR_MAP => Ok(Head {
                major,
                arg: HeadArg::Indefinite,
                len: 1,
            }),
            _ => Err(Error::Syntax {
                offset,
                kind: SyntaxKind::IndefiniteIntegerOrTag,
            }),
        },
    }
}

fn be_arg(bytes: &[u8], offset: usize, n: usize) -> Result<u64> {
    let end = offset + 1 + n;
    if end > bytes.len() {
        return Err(Error::Syntax {
            offset: bytes.len(),
            kind: SyntaxKind::PrematureEof,
        });
    }
    let mut v = 0u64;
    for &b in &bytes[offset + 1..end] {
        v = v << 8 | b as u64;
    }
    Ok(v)
}
