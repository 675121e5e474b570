//! Well-formedness checking.
//!
//! The walker materializes nothing and never recurses: container and tag
//! nesting lives on an explicit frame stack so hostile inputs hit the
//! configured nesting cap instead of the native stack.

use crate::{
    constants::*,
    error::{Error, Result, SemanticKind, SyntaxKind},
    wire::{read_head, HeadArg},
};
use smallvec::SmallVec;

/// Caps and strictness switches applied while walking.
#[derive(Debug, Clone)]
pub struct Limits {
    /// combined array/map/tag nesting allowed, range [4, 65535]
    pub max_nested_levels: usize,
    /// elements allowed in one array, range [16, 2^31 - 1]
    pub max_array_elements: u64,
    /// pairs allowed in one map, range [16, 2^31 - 1]
    pub max_map_pairs: u64,
    /// verify that text strings hold valid UTF-8
    pub check_utf8: bool,
    /// accept indefinite-length strings, arrays and maps
    pub allow_indefinite: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_nested_levels: 32,
            max_array_elements: 131072,
            max_map_pairs: 131072,
            check_utf8: true,
            allow_indefinite: true,
        }
    }
}

/// Successful validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valid {
    /// encoded length of the item
    pub len: usize,
    /// deepest array/map/tag nesting observed
    pub max_depth: usize,
}

enum Frame {
    Array { remaining: u64 },
    Map { remaining: u64 },
    IndefArray { children: u64 },
    IndefMap { children: u64 },
    Chunks { major: u8 },
    Tag,
}

/// Check that `bytes` is exactly one well-formed item.
pub fn validate(bytes: &[u8], limits: &Limits) -> Result<Valid> {
    let v = validate_prefix(bytes, limits)?;
    if v.len != bytes.len() {
        return Err(Error::Syntax {
            offset: v.len,
            kind: SyntaxKind::TrailingData,
        });
    }
    Ok(v)
}

/// Check that `bytes` starts with a well-formed item; trailing bytes are the
/// caller's business (sequence processing).
pub fn validate_prefix(bytes: &[u8], limits: &Limits) -> Result<Valid> {
    let mut stack: SmallVec<[Frame; 16]> = SmallVec::new();
    let mut pos = 0usize;
    let mut depth = 0usize;
    let mut max_depth = 0usize;

    // cap check for entering one more level of array/map/tag nesting
    let enter = |depth: usize, max_depth: &mut usize| -> Result<()> {
        if depth + 1 > limits.max_nested_levels {
            return Err(Error::MaxNestedLevel {
                max: limits.max_nested_levels,
            });
        }
        *max_depth = (*max_depth).max(depth + 1);
        Ok(())
    };

    loop {
        let head = read_head(bytes, pos)?;

        if let Some(Frame::Chunks { major }) = stack.last() {
            let major = *major;
            match head.arg {
                HeadArg::Break => {
                    stack.pop();
                    pos += 1;
                    // the chunked string itself is now one complete item
                }
                HeadArg::Value(len) if head.major == major => {
                    pos = consume_string(bytes, pos, head.len, len, major, limits)?;
                    continue;
                }
                _ => {
                    return Err(Error::Syntax {
                        offset: pos,
                        kind: SyntaxKind::BadIndefiniteChunk,
                    })
                }
            }
        } else {
            match head.arg {
                HeadArg::Break => match stack.last() {
                    Some(Frame::IndefArray { .. }) => {
                        stack.pop();
                        depth -= 1;
                        pos += 1;
                    }
                    Some(Frame::IndefMap { children }) => {
                        if children % 2 != 0 {
                            return Err(Error::Syntax {
                                offset: pos,
                                kind: SyntaxKind::UnexpectedBreak,
                            });
                        }
                        stack.pop();
                        depth -= 1;
                        pos += 1;
                    }
                    _ => {
                        return Err(Error::Syntax {
                            offset: pos,
                            kind: SyntaxKind::UnexpectedBreak,
                        })
                    }
                },
                HeadArg::Indefinite => {
                    if !limits.allow_indefinite {
                        return Err(Error::IndefiniteLengthForbidden { offset: pos });
                    }
                    match head.major {
                        MAJOR_BYTES | MAJOR_STR => {
                            stack.push(Frame::Chunks { major: head.major });
                            pos += 1;
                            continue;
                        }
                        MAJOR_ARRAY => {
                            enter(depth, &mut max_depth)?;
                            depth += 1;
                            stack.push(Frame::IndefArray { children: 0 });
                            pos += 1;
                            continue;
                        }
                        _ => {
                            enter(depth, &mut max_depth)?;
                            depth += 1;
                            stack.push(Frame::IndefMap { children: 0 });
                            pos += 1;
                            continue;
                        }
                    }
                }
                HeadArg::Value(arg) => match head.major {
                    MAJOR_POS | MAJOR_NEG | MAJOR_LIT => pos += head.len,
                    MAJOR_BYTES | MAJOR_STR => {
                        pos = consume_string(bytes, pos, head.len, arg, head.major, limits)?;
                    }
                    MAJOR_TAG => {
                        enter(depth, &mut max_depth)?;
                        depth += 1;
                        stack.push(Frame::Tag);
                        pos += head.len;
                        continue;
                    }
                    MAJOR_ARRAY => {
                        if arg > limits.max_array_elements {
                            return Err(Error::MaxArrayElements {
                                len: arg,
                                max: limits.max_array_elements,
                            });
                        }
                        enter(depth, &mut max_depth)?;
                        pos += head.len;
                        if arg > 0 {
                            depth += 1;
                            stack.push(Frame::Array { remaining: arg });
                            continue;
                        }
                    }
                    _ => {
                        if arg > limits.max_map_pairs {
                            return Err(Error::MaxMapPairs {
                                len: arg,
                                max: limits.max_map_pairs,
                            });
                        }
                        let children = arg.checked_mul(2).ok_or(Error::Syntax {
                            offset: pos,
                            kind: SyntaxKind::LengthOverflow,
                        })?;
                        enter(depth, &mut max_depth)?;
                        pos += head.len;
                        if arg > 0 {
                            depth += 1;
                            stack.push(Frame::Map {
                                remaining: children,
                            });
                            continue;
                        }
                    }
                },
            }
        }

        // one item has just been completed; unwind tags and filled containers
        loop {
            match stack.last_mut() {
                None => {
                    return Ok(Valid {
                        len: pos,
                        max_depth,
                    })
                }
                Some(Frame::Tag) => {
                    stack.pop();
                    depth -= 1;
                }
                Some(Frame::Array { remaining }) | Some(Frame::Map { remaining }) => {
                    *remaining -= 1;
                    if *remaining == 0 {
                        stack.pop();
                        depth -= 1;
                    } else {
                        break;
                    }
                }
                Some(Frame::IndefArray { children }) => {
                    *children += 1;
                    if *children > limits.max_array_elements {
                        return Err(Error::MaxArrayElements {
                            len: *children,
                            max: limits.max_array_elements,
                        });
                    }
                    break;
                }
                Some(Frame::IndefMap { children }) => {
                    *children += 1;
                    if *children > limits.max_map_pairs.saturating_mul(2) {
                        return Err(Error::MaxMapPairs {
                            len: (*children + 1) / 2,
                            max: limits.max_map_pairs,
                        });
                    }
                    break;
                }
                Some(Frame::Chunks { .. }) => unreachable!("items never complete inside chunks"),
            }
        }
    }
}

fn consume_string(
    bytes: &[u8],
    pos: usize,
    head_len: usize,
    len: u64,
    major: u8,
    limits: &Limits,
) -> Result<usize> {
    if len > isize::MAX as u64 {
        return Err(Error::Syntax {
            offset: pos,
            kind: SyntaxKind::LengthOverflow,
        });
    }
    let start = pos + head_len;
    let end = match start.checked_add(len as usize) {
        Some(end) if end <= bytes.len() => end,
        _ => {
            return Err(Error::Syntax {
                offset: bytes.len(),
                kind: SyntaxKind::PrematureEof,
            })
        }
    };
    if major == MAJOR_STR && limits.check_utf8 {
        if let Err(e) = std::str::from_utf8(&bytes[start..end]) {
            return Err(Error::Semantic {
                offset: start + e.valid_up_to(),
                kind: SemanticKind::InvalidUtf8,
            });
        }
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(bytes: &[u8]) -> Valid {
        validate(bytes, &Limits::default()).unwrap()
    }

    fn err(bytes: &[u8]) -> Error {
        validate(bytes, &Limits::default()).unwrap_err()
    }

    #[test]
    fn scalars() {
        assert_eq!(ok(&[0x00]).len, 1);
        assert_eq!(ok(&[0x18, 0x18]).len, 2);
        assert_eq!(ok(&[0xf5]).len, 1);
        assert_eq!(ok(&[0xf9, 0x7e, 0x00]).len, 3);
        assert_eq!(ok(&[0x43, 1, 2, 3]).len, 4);
    }

    #[test]
    fn depth_reporting() {
        assert_eq!(ok(&[0x01]).max_depth, 0);
        assert_eq!(ok(&[0x80]).max_depth, 1);
        assert_eq!(ok(&[0x81, 0x81, 0x01]).max_depth, 2);
        // tags charge the depth budget too
        assert_eq!(ok(&[0xc1, 0x01]).max_depth, 1);
        assert_eq!(ok(&[0xc1, 0xc1, 0x81, 0x01]).max_depth, 3);
    }

    #[test]
    fn nesting_cap() {
        let mut deep = vec![0x81u8; 32];
        deep.push(0x01);
        assert!(validate(&deep, &Limits::default()).is_ok());
        let mut too_deep = vec![0x81u8; 33];
        too_deep.push(0x01);
        assert!(matches!(
            validate(&too_deep, &Limits::default()).unwrap_err(),
            Error::MaxNestedLevel { max: 32 }
        ));
    }

    #[test]
    fn element_caps() {
        let limits = Limits {
            max_array_elements: 16,
            max_map_pairs: 16,
            ..Limits::default()
        };
        let mut arr = vec![0x91u8];
        arr.extend_from_slice(&[0x00; 17]);
        assert!(matches!(
            validate(&arr, &limits).unwrap_err(),
            Error::MaxArrayElements { len: 17, max: 16 }
        ));
        // indefinite arrays are counted as they grow
        let mut arr = vec![0x9fu8];
        arr.extend_from_slice(&[0x00; 17]);
        arr.push(0xff);
        assert!(matches!(
            validate(&arr, &limits).unwrap_err(),
            Error::MaxArrayElements { len: 17, max: 16 }
        ));
        let err = validate(&[0xb9, 0x00, 0x11], &limits).unwrap_err();
        assert!(matches!(err, Error::MaxMapPairs { len: 17, max: 16 }));
    }

    #[test]
    fn indefinite_forms() {
        assert_eq!(ok(&[0x5f, 0x42, 1, 2, 0x43, 3, 4, 5, 0xff]).len, 9);
        assert_eq!(ok(&[0x7f, 0x61, b'a', 0xff]).len, 4);
        assert_eq!(ok(&[0x9f, 0x01, 0x02, 0xff]).len, 4);
        assert_eq!(ok(&[0xbf, 0x61, b'a', 0x01, 0xff]).len, 5);
        assert_eq!(ok(&[0x5f, 0xff]).len, 2);
    }

    #[test]
    fn indefinite_forbidden() {
        let limits = Limits {
            allow_indefinite: false,
            ..Limits::default()
        };
        for input in [
            &[0x5f, 0x41, 1, 0xff][..],
            &[0x7f, 0x61, b'a', 0xff][..],
            &[0x9f, 0xff][..],
            &[0xbf, 0xff][..],
        ] {
            assert!(matches!(
                validate(input, &limits).unwrap_err(),
                Error::IndefiniteLengthForbidden { offset: 0 }
            ));
        }
    }

    #[test]
    fn utf8_policy() {
        let bad = &[0x62, 0xff, 0xfe];
        assert!(matches!(
            err(bad),
            Error::Semantic {
                offset: 1,
                kind: SemanticKind::InvalidUtf8
            }
        ));
        let lax = Limits {
            check_utf8: false,
            ..Limits::default()
        };
        assert!(validate(bad, &lax).is_ok());
        // chunks are checked individually
        assert!(matches!(
            err(&[0x7f, 0x62, 0xff, 0xfe, 0xff]),
            Error::Semantic {
                kind: SemanticKind::InvalidUtf8,
                ..
            }
        ));
    }

    #[test]
    fn rfc8949_appendix_g_ill_formed() {
        // end of input in a head
        for input in [
            &[0x18][..],
            &[0x19][..],
            &[0x1a][..],
            &[0x1b][..],
            &[0x19, 0x01][..],
            &[0x1a, 0x01, 0x02][..],
            &[0x1b, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07][..],
        ] {
            assert!(matches!(
                err(input),
                Error::Syntax {
                    kind: SyntaxKind::PrematureEof,
                    ..
                }
            ));
        }
        // definite strings with too few bytes
        for input in [&[0x41][..], &[0x61][..], &[0x5a, 0, 0, 0, 2, 0x01][..]] {
            assert!(matches!(
                err(input),
                Error::Syntax {
                    kind: SyntaxKind::PrematureEof,
                    ..
                }
            ));
        }
        // containers and tags with missing children
        for input in [
            &[0x81][..],
            &[0x82, 0x01][..],
            &[0xa1][..],
            &[0xa1, 0x01][..],
            &[0xc0][..],
            &[0x9f][..],
            &[0x9f, 0x01][..],
            &[0xbf, 0x01, 0x02][..],
            &[0x5f, 0x41, 0x01][..],
        ] {
            assert!(matches!(
                err(input),
                Error::Syntax {
                    kind: SyntaxKind::PrematureEof,
                    ..
                }
            ));
        }
        // reserved additional information
        for input in [&[0x1c][..], &[0x1d][..], &[0x1e][..], &[0x3c][..], &[0xfc][..]] {
            assert!(matches!(
                err(input),
                Error::Syntax {
                    kind: SyntaxKind::ReservedAdditionalInfo,
                    ..
                }
            ));
        }
        // reserved two-byte simple values
        for second in [0x00u8, 0x18, 0x1f] {
            assert!(matches!(
                err(&[0xf8, second]),
                Error::Syntax {
                    kind: SyntaxKind::InvalidSimpleValue(_),
                    ..
                }
            ));
        }
        // indefinite length on integers and tags
        for input in [&[0x1f][..], &[0x3f][..], &[0xdf][..]] {
            assert!(matches!(
                err(input),
                Error::Syntax {
                    kind: SyntaxKind::IndefiniteIntegerOrTag,
                    ..
                }
            ));
        }
        // break in the wrong place
        for input in [
            &[0xff][..],
            &[0x81, 0xff][..],
            &[0x82, 0x00, 0xff][..],
            &[0xa1, 0xff][..],
            &[0xa1, 0x00, 0xff][..],
            &[0xc0, 0xff][..],
            &[0xbf, 0x00, 0xff][..],
        ] {
            assert!(matches!(
                err(input),
                Error::Syntax {
                    kind: SyntaxKind::UnexpectedBreak,
                    ..
                }
            ));
        }
        // chunk of the wrong kind inside an indefinite string
        for input in [
            &[0x5f, 0x00, 0xff][..],
            &[0x5f, 0x21, 0xff][..],
            &[0x5f, 0x61, b'a', 0xff][..],
            &[0x5f, 0x80, 0xff][..],
            &[0x5f, 0x5f, 0x41, 0x01, 0xff, 0xff][..],
            &[0x7f, 0x41, 0x01, 0xff][..],
        ] {
            assert!(matches!(
                err(input),
                Error::Syntax {
                    kind: SyntaxKind::BadIndefiniteChunk,
                    ..
                }
            ));
        }
    }

    #[test]
    fn trailing_data() {
        assert!(matches!(
            err(&[0x01, 0x02]),
            Error::Syntax {
                offset: 1,
                kind: SyntaxKind::TrailingData
            }
        ));
        let v = validate_prefix(&[0x01, 0x02], &Limits::default()).unwrap();
        assert_eq!(v.len, 1);
    }

    #[test]
    fn offsets_point_at_fault() {
        assert!(matches!(
            err(&[0x82, 0x00, 0x1c]),
            Error::Syntax {
                offset: 2,
                kind: SyntaxKind::ReservedAdditionalInfo
            }
        ));
        assert!(matches!(
            err(&[0x82, 0x00, 0xff]),
            Error::Syntax {
                offset: 2,
                kind: SyntaxKind::UnexpectedBreak
            }
        ));
    }
}
