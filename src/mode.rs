//! Frozen encode/decode configurations.
//!
//! A mode is built once from an options bundle and never mutated afterwards;
//! it may be shared freely across threads. Field directories are built on
//! first use of a type and cached for the mode's lifetime; encode scratch
//! buffers are pooled per mode.

use crate::{
    decode::{DecCtx, Decode},
    encode::{Encode, Encoder},
    error::Result,
    field::{DirectoryCache, FieldDirectory, TypeShape},
    options::{DecOptions, EncOptions},
    stream::{Decoder, PullDecoder},
    validate::{self, Limits},
    Cbor, CborOwned,
};
use std::{
    any::TypeId,
    io::{Read, Write},
    sync::{Arc, Mutex, OnceLock},
};

/// An immutable encoder configuration.
pub struct EncMode {
    opts: EncOptions,
    dirs: DirectoryCache,
    pool: Mutex<Vec<Vec<u8>>>,
}

impl std::fmt::Debug for EncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncMode").field("opts", &self.opts).finish()
    }
}

impl EncMode {
    pub(crate) fn new(opts: EncOptions) -> Self {
        Self {
            opts,
            dirs: DirectoryCache::default(),
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &EncOptions {
        &self.opts
    }

    /// Encode one value into a fresh buffer. Nothing is produced on error.
    pub fn marshal<T: Encode + ?Sized>(&self, value: &T) -> Result<CborOwned> {
        let mut enc = Encoder::buffered(self);
        enc.encode(value)?;
        let buf = enc.take_output();
        let owned = CborOwned::unchecked(buf.as_slice());
        self.return_scratch(buf);
        Ok(owned)
    }

    /// A streaming encoder over the given sink. Completed top-level items
    /// are flushed to the sink as they finish.
    pub fn encoder<W: Write>(&self, sink: W) -> Encoder<'_, W> {
        Encoder::new(self, sink)
    }

    pub(crate) fn directory(
        &self,
        id: TypeId,
        shape: fn() -> &'static TypeShape,
    ) -> Result<Arc<FieldDirectory>> {
        self.dirs.get(id, shape)
    }

    pub(crate) fn take_scratch(&self) -> Vec<u8> {
        let mut buf = self
            .pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default();
        buf.clear();
        buf
    }

    pub(crate) fn return_scratch(&self, buf: Vec<u8>) {
        let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        if pool.len() < 8 {
            pool.push(buf);
        }
    }
}

/// An immutable decoder configuration.
#[derive(Debug)]
pub struct DecMode {
    opts: DecOptions,
    limits: Limits,
    dirs: DirectoryCache,
}

impl DecMode {
    pub(crate) fn new(opts: DecOptions) -> Self {
        let limits = opts.limits();
        Self {
            opts,
            limits,
            dirs: DirectoryCache::default(),
        }
    }

    pub fn options(&self) -> &DecOptions {
        &self.opts
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Check the bytes under this mode's limits and hand them back as a
    /// single validated item.
    pub fn parse<'a>(&self, bytes: &'a [u8]) -> Result<&'a Cbor> {
        validate::validate(bytes, &self.limits)?;
        Ok(Cbor::unchecked(bytes))
    }

    /// Like [`parse`](Self::parse), but accepts trailing bytes and returns
    /// them alongside the first item.
    pub fn parse_prefix<'a>(&self, bytes: &'a [u8]) -> Result<(&'a Cbor, &'a [u8])> {
        let v = validate::validate_prefix(bytes, &self.limits)?;
        Ok((Cbor::unchecked(&bytes[..v.len]), &bytes[v.len..]))
    }

    /// Decode one item into a value of type `T`.
    pub fn unmarshal<T: Decode>(&self, bytes: &[u8]) -> Result<T> {
        let cbor = self.parse(bytes)?;
        T::decode(cbor.tagged_item(), &DecCtx::new(self))
    }

    /// Decode the first item of a sequence, returning the remaining bytes.
    pub fn unmarshal_first<'a, T: Decode>(&self, bytes: &'a [u8]) -> Result<(T, &'a [u8])> {
        let (cbor, rest) = self.parse_prefix(bytes)?;
        let value = T::decode(cbor.tagged_item(), &DecCtx::new(self))?;
        Ok((value, rest))
    }

    /// Decode one item in place, reusing the target's allocations where the
    /// target type supports it.
    pub fn unmarshal_into<T: Decode>(&self, bytes: &[u8], target: &mut T) -> Result<()> {
        let cbor = self.parse(bytes)?;
        target.decode_into(cbor.tagged_item(), &DecCtx::new(self))
    }

    /// A pull decoder over a byte slice.
    pub fn pull<'a>(&self, bytes: &'a [u8]) -> PullDecoder<'a> {
        PullDecoder::with_limits(bytes, self.limits.clone())
    }

    /// An item-at-a-time decoder over a reader.
    pub fn decoder<R: Read>(&self, reader: R) -> Decoder<'_, R> {
        Decoder::new(self, reader)
    }

    pub(crate) fn directory(
        &self,
        id: TypeId,
        shape: fn() -> &'static TypeShape,
    ) -> Result<Arc<FieldDirectory>> {
        self.dirs.get(id, shape)
    }
}

static DEFAULT_ENC: OnceLock<EncMode> = OnceLock::new();
static DEFAULT_DEC: OnceLock<DecMode> = OnceLock::new();

/// The process-wide default encode mode (all options at their defaults).
pub fn default_enc_mode() -> &'static EncMode {
    DEFAULT_ENC.get_or_init(|| EncMode::new(EncOptions::default()))
}

/// The process-wide default decode mode (all options at their defaults).
pub fn default_dec_mode() -> &'static DecMode {
    DEFAULT_DEC.get_or_init(|| DecMode::new(DecOptions::default()))
}
