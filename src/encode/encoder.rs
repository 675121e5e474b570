use super::{float, Encode};
use crate::{
    constants::*,
    error::{Error, Result},
    mode::EncMode,
    options::{BignumConvert, IndefLength, SortMode, TimeMode},
    validated::item::classify_initial,
    wire::{head_bytes, write_break, write_head, write_indefinite},
    Bignum, Cbor, CborType, Timestamp,
};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Bytes,
    Text,
    Array,
    Map,
}

impl ScopeKind {
    fn cbor_type(self) -> CborType {
        match self {
            ScopeKind::Bytes => CborType::ByteString,
            ScopeKind::Text => CborType::TextString,
            ScopeKind::Array => CborType::Array,
            ScopeKind::Map => CborType::Map,
        }
    }
}

struct Scope {
    kind: ScopeKind,
    count: u64,
    mark: usize,
}

/// In-progress map region: where it starts in the buffer and the
/// `(key_end, pair_end)` offsets of each pair written so far.
pub(crate) struct MapBody {
    start: usize,
    bounds: Vec<(usize, usize)>,
}

/// A streaming CBOR encoder over an [`io::Write`] sink.
///
/// Values go in through [`encode`](Self::encode); the indefinite-length
/// streaming entry points are `begin_*`/[`end`](Self::end). Bytes are
/// buffered until a top-level item completes, so a failed encode emits
/// nothing.
pub struct Encoder<'m, W: Write> {
    mode: &'m EncMode,
    sink: W,
    out: Vec<u8>,
    scopes: Vec<Scope>,
    suppress: u32,
    flush_items: bool,
}

impl<'m> Encoder<'m, io::Sink> {
    /// An encoder that keeps everything in its buffer; used by `marshal`.
    pub(crate) fn buffered(mode: &'m EncMode) -> Self {
        let mut enc = Self::new(mode, io::sink());
        enc.flush_items = false;
        enc
    }
}

impl<'m, W: Write> Encoder<'m, W> {
    pub(crate) fn new(mode: &'m EncMode, sink: W) -> Self {
        Self {
            mode,
            sink,
            out: mode.take_scratch(),
            scopes: Vec::new(),
            suppress: 0,
            flush_items: true,
        }
    }

    pub(crate) fn mode(&self) -> &'m EncMode {
        self.mode
    }

    pub(crate) fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    pub(crate) fn buffer_len(&self) -> usize {
        self.out.len()
    }

    /// Encode one complete value.
    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) -> Result<()> {
        let mark = self.out.len();
        self.suppress += 1;
        let r = value.encode(self);
        self.suppress -= 1;
        if let Err(e) = r {
            self.out.truncate(mark);
            return Err(e);
        }
        self.item_written(mark)
    }

    /// Write any buffered bytes to the sink and flush it.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.write_all(&self.out)?;
        self.out.clear();
        self.sink.flush()?;
        Ok(())
    }

    /// Open an indefinite-length byte string; subsequent items must be byte
    /// strings and become its chunks.
    pub fn begin_byte_string(&mut self) -> Result<()> {
        self.begin(ScopeKind::Bytes, MAJOR_BYTES)
    }

    /// Open an indefinite-length text string; subsequent items must be text
    /// strings and become its chunks.
    pub fn begin_text_string(&mut self) -> Result<()> {
        self.begin(ScopeKind::Text, MAJOR_STR)
    }

    /// Open an indefinite-length array.
    pub fn begin_array(&mut self) -> Result<()> {
        self.begin(ScopeKind::Array, MAJOR_ARRAY)
    }

    /// Open an indefinite-length map; it must receive an even number of
    /// items before [`end`](Self::end).
    pub fn begin_map(&mut self) -> Result<()> {
        self.begin(ScopeKind::Map, MAJOR_MAP)
    }

    fn begin(&mut self, kind: ScopeKind, major: u8) -> Result<()> {
        if self.mode.options().indef_length == IndefLength::Forbidden {
            return Err(Error::IndefiniteLengthForbidden {
                offset: self.out.len(),
            });
        }
        if let Some(scope) = self.scopes.last() {
            if matches!(scope.kind, ScopeKind::Bytes | ScopeKind::Text) {
                return Err(Error::IndefiniteChunkType {
                    expected: scope.kind.cbor_type(),
                    actual: kind.cbor_type(),
                });
            }
        }
        let mark = self.out.len();
        write_indefinite(&mut self.out, major);
        self.scopes.push(Scope {
            kind,
            count: 0,
            mark,
        });
        Ok(())
    }

    /// Close the innermost open indefinite-length item.
    pub fn end(&mut self) -> Result<()> {
        let scope = self.scopes.pop().ok_or(Error::EndOutsideIndefinite)?;
        if scope.kind == ScopeKind::Map && scope.count % 2 != 0 {
            self.scopes.push(scope);
            return Err(Error::OddIndefiniteMap);
        }
        write_break(&mut self.out);
        self.item_written(scope.mark)
    }

    pub fn encode_u64(&mut self, value: u64) -> Result<()> {
        let mark = self.out.len();
        write_head(&mut self.out, MAJOR_POS, value);
        self.item_written(mark)
    }

    pub fn encode_i64(&mut self, value: i64) -> Result<()> {
        let mark = self.out.len();
        if value < 0 {
            write_head(&mut self.out, MAJOR_NEG, (-1 - value) as u64);
        } else {
            write_head(&mut self.out, MAJOR_POS, value as u64);
        }
        self.item_written(mark)
    }

    pub fn encode_bool(&mut self, value: bool) -> Result<()> {
        let mark = self.out.len();
        self.out
            .push(MAJOR_LIT << 5 | if value { LIT_TRUE } else { LIT_FALSE });
        self.item_written(mark)
    }

    pub fn encode_null(&mut self) -> Result<()> {
        let mark = self.out.len();
        self.out.push(MAJOR_LIT << 5 | LIT_NULL);
        self.item_written(mark)
    }

    pub fn encode_undefined(&mut self) -> Result<()> {
        let mark = self.out.len();
        self.out.push(MAJOR_LIT << 5 | LIT_UNDEFINED);
        self.item_written(mark)
    }

    /// Simple values 0–19 and 32–255; 24–31 are reserved on the wire.
    pub fn encode_simple(&mut self, value: u8) -> Result<()> {
        if (24..=31).contains(&value) {
            return Err(Error::UnsupportedType {
                type_name: "reserved simple value",
            });
        }
        let mark = self.out.len();
        if value < 24 {
            self.out.push(MAJOR_LIT << 5 | value);
        } else {
            self.out.push(MAJOR_LIT << 5 | LIT_SIMPLE);
            self.out.push(value);
        }
        self.item_written(mark)
    }

    pub fn encode_f64(&mut self, value: f64) -> Result<()> {
        let mark = self.out.len();
        float::write_f64(&mut self.out, value, self.mode.options());
        self.item_written(mark)
    }

    pub fn encode_f32(&mut self, value: f32) -> Result<()> {
        let mark = self.out.len();
        float::write_f32(&mut self.out, value, self.mode.options());
        self.item_written(mark)
    }

    pub fn encode_str(&mut self, value: &str) -> Result<()> {
        let mark = self.out.len();
        write_head(&mut self.out, MAJOR_STR, value.len() as u64);
        self.out.extend_from_slice(value.as_bytes());
        self.item_written(mark)
    }

    pub fn encode_bytes(&mut self, value: &[u8]) -> Result<()> {
        let mark = self.out.len();
        write_head(&mut self.out, MAJOR_BYTES, value.len() as u64);
        self.out.extend_from_slice(value);
        self.item_written(mark)
    }

    /// Write a tag head; the next encoded item becomes its content.
    pub fn encode_tag(&mut self, tag: u64) -> Result<()> {
        if self.suppress == 0 {
            if let Some(scope) = self.scopes.last() {
                if matches!(scope.kind, ScopeKind::Bytes | ScopeKind::Text) {
                    return Err(Error::IndefiniteChunkType {
                        expected: scope.kind.cbor_type(),
                        actual: CborType::Tag,
                    });
                }
            }
        }
        write_head(&mut self.out, MAJOR_TAG, tag);
        Ok(())
    }

    /// Encode a timestamp according to the mode's time representation.
    pub fn encode_timestamp(&mut self, t: &Timestamp) -> Result<()> {
        let mark = self.out.len();
        let time = self.mode.options().time;
        let wrap = self.mode.options().time_tag;
        let text = match time {
            TimeMode::Rfc3339 => Some(t.to_rfc3339(false)),
            TimeMode::Rfc3339Nano => Some(t.to_rfc3339(true)),
            _ => None,
        };
        match time {
            TimeMode::Rfc3339 | TimeMode::Rfc3339Nano => {
                let s = text.flatten().ok_or(Error::UnsupportedType {
                    type_name: "timestamp outside the RFC 3339 range",
                })?;
                if wrap {
                    write_head(&mut self.out, MAJOR_TAG, TAG_ISO8601);
                }
                write_head(&mut self.out, MAJOR_STR, s.len() as u64);
                self.out.extend_from_slice(s.as_bytes());
            }
            TimeMode::Unix | TimeMode::UnixDynamic if t.nanos() == 0 || time == TimeMode::Unix => {
                if wrap {
                    write_head(&mut self.out, MAJOR_TAG, TAG_EPOCH);
                }
                let secs = t.unix_epoch();
                if secs < 0 {
                    write_head(&mut self.out, MAJOR_NEG, (-1 - secs) as u64);
                } else {
                    write_head(&mut self.out, MAJOR_POS, secs as u64);
                }
            }
            _ => {
                if wrap {
                    write_head(&mut self.out, MAJOR_TAG, TAG_EPOCH);
                }
                float::write_f64(&mut self.out, t.epoch_micros_f64(), self.mode.options());
            }
        }
        self.item_written(mark)
    }

    /// Encode a big integer, shrinking to major type 0/1 when the mode
    /// allows it and the value fits.
    pub fn encode_bignum(&mut self, value: &Bignum) -> Result<()> {
        if self.mode.options().bignum_convert == BignumConvert::Shortest {
            if let Some(v) = value.to_u64() {
                return self.encode_u64(v);
            }
            if value.is_negative() && value.magnitude().len() <= 8 {
                let mut be = [0u8; 8];
                be[8 - value.magnitude().len()..].copy_from_slice(value.magnitude());
                let mark = self.out.len();
                write_head(&mut self.out, MAJOR_NEG, u64::from_be_bytes(be));
                return self.item_written(mark);
            }
        }
        let mark = self.out.len();
        let tag = if value.is_negative() {
            TAG_BIGNUM_NEG
        } else {
            TAG_BIGNUM_POS
        };
        write_head(&mut self.out, MAJOR_TAG, tag);
        write_head(&mut self.out, MAJOR_BYTES, value.magnitude().len() as u64);
        self.out.extend_from_slice(value.magnitude());
        self.item_written(mark)
    }

    /// Write an already-encoded item verbatim.
    pub fn encode_raw(&mut self, item: &Cbor) -> Result<()> {
        let mark = self.out.len();
        self.out.extend_from_slice(item.as_slice());
        self.item_written(mark)
    }

    pub(crate) fn suppressed<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.suppress += 1;
        let r = f(&mut *self);
        self.suppress -= 1;
        r
    }

    pub(crate) fn array_head(&mut self, len: u64) {
        write_head(&mut self.out, MAJOR_ARRAY, len);
    }

    pub(crate) fn write_raw_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub(crate) fn finish_item(&mut self, mark: usize) -> Result<()> {
        self.item_written(mark)
    }

    pub(crate) fn map_begin(&mut self) -> MapBody {
        MapBody {
            start: self.out.len(),
            bounds: Vec::new(),
        }
    }

    pub(crate) fn map_pair<FK, FV>(&mut self, body: &mut MapBody, key: FK, value: FV) -> Result<()>
    where
        FK: FnOnce(&mut Self) -> Result<()>,
        FV: FnOnce(&mut Self) -> Result<()>,
    {
        let pair_start = self.out.len();
        self.suppress += 1;
        let r: Result<usize> = (|| {
            key(&mut *self)?;
            let key_end = self.out.len();
            value(&mut *self)?;
            Ok(key_end)
        })();
        self.suppress -= 1;
        match r {
            Ok(key_end) => {
                body.bounds.push((key_end, self.out.len()));
                Ok(())
            }
            Err(e) => {
                self.out.truncate(pair_start);
                Err(e)
            }
        }
    }

    /// Close a map region: sort the pairs per the mode (unless the caller
    /// already emitted them in order), then splice in the definite head.
    pub(crate) fn map_finish(&mut self, body: MapBody, presorted: bool) -> Result<()> {
        if !presorted {
            self.sort_map_range(&body);
        }
        let (head, head_len) = head_bytes(MAJOR_MAP, body.bounds.len() as u64);
        self.out
            .splice(body.start..body.start, head[..head_len].iter().copied());
        self.item_written(body.start)
    }

    fn sort_map_range(&mut self, body: &MapBody) {
        let sort = self.mode.options().sort;
        if sort == SortMode::None || body.bounds.len() < 2 {
            return;
        }
        let mut pairs = Vec::with_capacity(body.bounds.len());
        let mut start = body.start;
        for &(key_end, pair_end) in &body.bounds {
            pairs.push((start, key_end, pair_end));
            start = pair_end;
        }
        let out = &self.out;
        let mut order: Vec<usize> = (0..pairs.len()).collect();
        order.sort_by(|&a, &b| {
            let ka = &out[pairs[a].0..pairs[a].1];
            let kb = &out[pairs[b].0..pairs[b].1];
            match sort {
                SortMode::LengthFirst => ka.len().cmp(&kb.len()).then_with(|| ka.cmp(kb)),
                _ => ka.cmp(kb),
            }
        });
        if order.iter().enumerate().all(|(i, &o)| i == o) {
            return;
        }
        let mut sorted = Vec::with_capacity(self.out.len() - body.start);
        for &i in &order {
            sorted.extend_from_slice(&self.out[pairs[i].0..pairs[i].2]);
        }
        self.out.truncate(body.start);
        self.out.extend_from_slice(&sorted);
    }

    /// Bookkeeping after one complete item landed in the buffer at `mark`:
    /// feed the innermost indefinite scope, or flush a finished top-level
    /// item to the sink.
    fn item_written(&mut self, mark: usize) -> Result<()> {
        if self.suppress > 0 {
            return Ok(());
        }
        match self.scopes.last_mut() {
            None => {
                if self.flush_items {
                    if let Err(e) = self.sink.write_all(&self.out) {
                        return Err(e.into());
                    }
                    self.out.clear();
                }
                Ok(())
            }
            Some(scope) => {
                if matches!(scope.kind, ScopeKind::Bytes | ScopeKind::Text) {
                    let initial = self.out[mark];
                    let actual = classify_initial(initial);
                    let definite = initial & 31 != INDEFINITE_SIZE;
                    let expected = scope.kind.cbor_type();
                    if actual != expected || !definite {
                        self.out.truncate(mark);
                        return Err(Error::IndefiniteChunkType { expected, actual });
                    }
                }
                scope.count += 1;
                Ok(())
            }
        }
    }
}

impl<'m, W: Write> Drop for Encoder<'m, W> {
    fn drop(&mut self) {
        self.mode.return_scratch(std::mem::take(&mut self.out));
    }
}
