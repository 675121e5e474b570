//! Pull-style decoding: the caller drives consumption one item at a time.
//!
//! [`PullDecoder`] works over a byte slice and can hand out borrows of the
//! input. [`Decoder`] works over any [`Read`] and buffers exactly one item
//! at a time. Both validate before consuming and hold on to the first
//! validator or I/O error: once faulted, every further call returns it.

use crate::{
    decode::{DecCtx, Decode},
    error::{Error, Result, SemanticKind, SyntaxKind},
    mode::DecMode,
    validate::{validate_prefix, Limits},
    validated::{self, item::classify_initial},
    wire::{read_head, Head, HeadArg},
    Cbor, CborOwned, CborType,
};
use std::io::{self, Read};

/// Pull decoder over a byte slice.
///
/// `next_type` peeks; the typed reads either consume one whole item, or
/// return [`Error::WrongType`] without moving, or surface the (sticky)
/// validator error. Indefinite-length strings and containers are rejected
/// by this API and skipped, so the caller can continue behind them.
pub struct PullDecoder<'a> {
    input: &'a [u8],
    pos: usize,
    validated_until: usize,
    limits: Limits,
    fault: Option<Error>,
}

impl<'a> PullDecoder<'a> {
    /// A pull decoder with the default limits.
    pub fn new(input: &'a [u8]) -> Self {
        Self::with_limits(input, Limits::default())
    }

    pub(crate) fn with_limits(input: &'a [u8], limits: Limits) -> Self {
        Self {
            input,
            pos: 0,
            validated_until: 0,
            limits,
            fault: None,
        }
    }

    /// Total bytes consumed so far.
    pub fn num_bytes_decoded(&self) -> usize {
        self.pos
    }

    /// Validate up to the end of the next item if that has not happened yet.
    /// `false` means a clean end of input.
    fn prepare(&mut self) -> Result<bool> {
        if let Some(e) = &self.fault {
            return Err(e.clone());
        }
        if self.pos == self.input.len() {
            return Ok(false);
        }
        if self.pos < self.validated_until {
            return Ok(true);
        }
        match validate_prefix(&self.input[self.pos..], &self.limits) {
            Ok(v) => {
                self.validated_until = self.pos + v.len;
                Ok(true)
            }
            Err(e) => {
                let e = e.rebase(self.pos);
                self.fault = Some(e.clone());
                Err(e)
            }
        }
    }

    fn head(&self) -> Head {
        read_head(self.input, self.pos).expect("head was validated")
    }

    fn advance_item(&mut self) {
        self.pos += validated::item_len(&self.input[self.pos..]);
    }

    /// The type of the next item, without advancing. `None` at the end of
    /// the input.
    pub fn next_type(&mut self) -> Result<Option<CborType>> {
        if !self.prepare()? {
            return Ok(None);
        }
        Ok(Some(classify_initial(self.input[self.pos])))
    }

    fn expect(&mut self, expected: CborType) -> Result<Head> {
        if !self.prepare()? {
            return Err(Error::EndOfInput);
        }
        let actual = classify_initial(self.input[self.pos]);
        if actual != expected {
            return Err(Error::WrongType { actual, expected });
        }
        Ok(self.head())
    }

    /// Reject (and step over) an indefinite-length item.
    fn definite_arg(&mut self, head: Head) -> Result<u64> {
        match head.arg {
            HeadArg::Value(v) => Ok(v),
            _ => {
                let offset = self.pos;
                self.advance_item();
                Err(Error::IndefiniteLengthForbidden { offset })
            }
        }
    }

    fn uint(&mut self, target: &'static str, max: u64) -> Result<u64> {
        let head = self.expect(CborType::UnsignedInt)?;
        let value = match head.arg {
            HeadArg::Value(v) => v,
            _ => unreachable!("integers have no indefinite form"),
        };
        if value > max {
            return Err(Error::Overflow {
                target_type: target,
                value: value as i128,
            });
        }
        self.pos += head.len;
        Ok(value)
    }

    fn int(&mut self, target: &'static str, min: i128, max: i128) -> Result<i64> {
        if !self.prepare()? {
            return Err(Error::EndOfInput);
        }
        let actual = classify_initial(self.input[self.pos]);
        let head = self.head();
        let arg = match head.arg {
            HeadArg::Value(v) => v,
            _ => 0,
        };
        let value = match actual {
            CborType::UnsignedInt => arg as i128,
            CborType::NegativeInt => -1 - arg as i128,
            _ => {
                return Err(Error::WrongType {
                    actual,
                    expected: CborType::NegativeInt,
                })
            }
        };
        if value < min || value > max {
            return Err(Error::Overflow {
                target_type: target,
                value,
            });
        }
        self.pos += head.len;
        Ok(value as i64)
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.uint("u8", u8::MAX as u64).map(|v| v as u8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.uint("u16", u16::MAX as u64).map(|v| v as u16)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.uint("u32", u32::MAX as u64).map(|v| v as u32)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.uint("u64", u64::MAX)
    }

    pub fn i8(&mut self) -> Result<i8> {
        self.int("i8", i8::MIN as i128, i8::MAX as i128).map(|v| v as i8)
    }

    pub fn i16(&mut self) -> Result<i16> {
        self.int("i16", i16::MIN as i128, i16::MAX as i128)
            .map(|v| v as i16)
    }

    pub fn i32(&mut self) -> Result<i32> {
        self.int("i32", i32::MIN as i128, i32::MAX as i128)
            .map(|v| v as i32)
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.int("i64", i64::MIN as i128, i64::MAX as i128)
    }

    pub fn bool(&mut self) -> Result<bool> {
        let head = self.expect(CborType::Bool)?;
        let value = self.input[self.pos] & 31 == crate::constants::LIT_TRUE;
        self.pos += head.len;
        Ok(value)
    }

    pub fn null(&mut self) -> Result<()> {
        let head = self.expect(CborType::Null)?;
        self.pos += head.len;
        Ok(())
    }

    pub fn f64(&mut self) -> Result<f64> {
        let head = self.expect(CborType::Float)?;
        let value = validated::float(&self.input[self.pos..]);
        self.pos += head.len;
        Ok(value)
    }

    pub fn f32(&mut self) -> Result<f32> {
        let head = self.expect(CborType::Float)?;
        let value = validated::float(&self.input[self.pos..]);
        if value.is_finite() && (value > f32::MAX as f64 || value < f32::MIN as f64) {
            return Err(Error::Overflow {
                target_type: "f32",
                value: value as i128,
            });
        }
        self.pos += head.len;
        Ok(value as f32)
    }

    /// Borrow a definite-length text string from the input.
    pub fn str(&mut self) -> Result<&'a str> {
        let head = self.expect(CborType::TextString)?;
        let len = self.definite_arg(head)? as usize;
        let start = self.pos + head.len;
        let s = std::str::from_utf8(&self.input[start..start + len]).map_err(|e| {
            Error::Semantic {
                offset: start + e.valid_up_to(),
                kind: SemanticKind::InvalidUtf8,
            }
        })?;
        self.pos = start + len;
        Ok(s)
    }

    /// Borrow a definite-length byte string from the input.
    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let head = self.expect(CborType::ByteString)?;
        let len = self.definite_arg(head)? as usize;
        let start = self.pos + head.len;
        self.pos = start + len;
        Ok(&self.input[start..start + len])
    }

    /// Enter a definite-length array, returning its element count. The
    /// elements are then read individually.
    pub fn array_head(&mut self) -> Result<u64> {
        let head = self.expect(CborType::Array)?;
        let len = self.definite_arg(head)?;
        self.pos += head.len;
        Ok(len)
    }

    /// Enter a definite-length map, returning its pair count.
    pub fn map_head(&mut self) -> Result<u64> {
        let head = self.expect(CborType::Map)?;
        let len = self.definite_arg(head)?;
        self.pos += head.len;
        Ok(len)
    }

    /// Consume a tag head, returning the tag number; the content follows.
    pub fn tag_number(&mut self) -> Result<u64> {
        let head = self.expect(CborType::Tag)?;
        let tag = match head.arg {
            HeadArg::Value(v) => v,
            _ => unreachable!("tags have no indefinite form"),
        };
        self.pos += head.len;
        Ok(tag)
    }

    /// Copy the next item's encoded bytes.
    pub fn raw(&mut self) -> Result<CborOwned> {
        self.raw_zero_copy().map(|c| CborOwned::unchecked(c.as_slice()))
    }

    /// Borrow the next item's encoded bytes from the input.
    pub fn raw_zero_copy(&mut self) -> Result<&'a Cbor> {
        if !self.prepare()? {
            return Err(Error::EndOfInput);
        }
        let start = self.pos;
        self.advance_item();
        Ok(Cbor::unchecked(&self.input[start..self.pos]))
    }

    /// Step over the next item without materializing it.
    pub fn skip(&mut self) -> Result<()> {
        if !self.prepare()? {
            return Err(Error::EndOfInput);
        }
        self.advance_item();
        Ok(())
    }

    /// Declared byte length for strings, element count for arrays, pair
    /// count for maps. Errors on indefinite-length and size-less items.
    pub fn next_size(&mut self) -> Result<u64> {
        if !self.prepare()? {
            return Err(Error::EndOfInput);
        }
        let actual = classify_initial(self.input[self.pos]);
        match actual {
            CborType::ByteString | CborType::TextString | CborType::Array | CborType::Map => {
                match self.head().arg {
                    HeadArg::Value(v) => Ok(v),
                    _ => Err(Error::IndefiniteLengthForbidden { offset: self.pos }),
                }
            }
            _ => Err(Error::WrongType {
                actual,
                expected: CborType::Array,
            }),
        }
    }
}

/// Item-at-a-time decoder over a reader.
///
/// Bytes are buffered until one whole item has arrived, validated under the
/// mode's limits, then decoded. Reads interrupted by
/// [`io::ErrorKind::Interrupted`] are retried without consuming anything;
/// any other I/O or validator error is sticky.
pub struct Decoder<'m, R> {
    mode: &'m DecMode,
    reader: R,
    buf: Vec<u8>,
    start: usize,
    read_total: usize,
    eof: bool,
    fault: Option<Error>,
}

impl<'m, R: Read> Decoder<'m, R> {
    pub(crate) fn new(mode: &'m DecMode, reader: R) -> Self {
        Self {
            mode,
            reader,
            buf: Vec::new(),
            start: 0,
            read_total: 0,
            eof: false,
            fault: None,
        }
    }

    /// Total bytes consumed as decoded items.
    pub fn num_bytes_read(&self) -> usize {
        self.read_total
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Buffer, validate and consume the next item, returning its range in
    /// the buffer.
    fn next_item(&mut self) -> Result<(usize, usize)> {
        if let Some(e) = &self.fault {
            return Err(e.clone());
        }
        loop {
            if self.buf.len() > self.start {
                match validate_prefix(&self.buf[self.start..], self.mode.limits()) {
                    Ok(v) => {
                        let start = self.start;
                        self.start += v.len;
                        self.read_total += v.len;
                        return Ok((start, start + v.len));
                    }
                    Err(Error::Syntax {
                        kind: SyntaxKind::PrematureEof,
                        ..
                    }) if !self.eof => {}
                    Err(e) => {
                        let e = e.rebase(self.read_total);
                        self.fault = Some(e.clone());
                        return Err(e);
                    }
                }
            } else if self.eof {
                return Err(Error::EndOfInput);
            }
            if self.eof {
                let e = Error::Syntax {
                    offset: self.read_total + (self.buf.len() - self.start),
                    kind: SyntaxKind::PrematureEof,
                };
                self.fault = Some(e.clone());
                return Err(e);
            }
            if self.start > 8192 && self.start * 2 > self.buf.len() {
                self.buf.drain(..self.start);
                self.start = 0;
            }
            if let Err(e) = self.fill() {
                self.fault = Some(e.clone());
                return Err(e);
            }
        }
    }

    /// Decode the next item from the stream.
    pub fn decode<T: Decode>(&mut self) -> Result<T> {
        let mode = self.mode;
        let (start, end) = self.next_item()?;
        let cbor = Cbor::unchecked(&self.buf[start..end]);
        T::decode(cbor.tagged_item(), &DecCtx::new(mode))
    }

    /// Step over the next item.
    pub fn skip(&mut self) -> Result<()> {
        self.next_item().map(|_| ())
    }

    /// Copy the next item's encoded bytes.
    pub fn raw(&mut self) -> Result<CborOwned> {
        let (start, end) = self.next_item()?;
        Ok(CborOwned::unchecked(&self.buf[start..end]))
    }
}
