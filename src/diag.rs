//! Rendering to extended diagnostic notation (RFC 8949 §8).

use crate::{
    constants::{LIT_FLOAT16, LIT_FLOAT32},
    error::Result,
    validate::{validate_prefix, Limits},
    validated::{
        item::{ItemKind, TaggedItem},
        iter::BytesIter,
        tag_chain,
    },
    Cbor,
};
use data_encoding::{BASE32HEX_NOPAD, BASE32_NOPAD, BASE64URL_NOPAD};
use std::fmt::{self, Write};

/// Base used to render byte strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteStringBase {
    /// `h'12ab00'`
    #[default]
    Base16,
    /// `b32'CKVQA'`
    Base32,
    /// `h32'2ALG0'`
    Base32Hex,
    /// `b64'EqsA'`
    Base64Url,
}

/// Dials of the diagnostic printer.
#[derive(Debug, Clone, Default)]
pub struct DiagOptions {
    pub byte_string_base: ByteStringBase,
    /// blank-separate the bytes of `h'..'` output
    pub hex_whitespace: bool,
    /// render byte strings holding valid UTF-8 as `'text'`
    pub bytes_as_text: bool,
    /// render byte strings holding well-formed CBOR as `<<item>>`
    pub embedded_cbor: bool,
    /// suffix floats with `_1`/`_2`/`_3` for their encoded width
    pub float_precision: bool,
}

/// Render a byte sequence of CBOR items with default options, items
/// comma-separated.
pub fn diagnose(bytes: &[u8]) -> Result<String> {
    diagnose_with(bytes, &DiagOptions::default())
}

/// Render a byte sequence of CBOR items, comma-separated.
pub fn diagnose_with(bytes: &[u8], opts: &DiagOptions) -> Result<String> {
    let mut out = String::new();
    let mut rest = bytes;
    let mut first = true;
    while !rest.is_empty() {
        let (text, r) = diagnose_first(rest, opts)?;
        if !first {
            out.push_str(", ");
        }
        first = false;
        out.push_str(&text);
        rest = r;
    }
    Ok(out)
}

/// Render the first item of a sequence, returning the remaining bytes.
pub fn diagnose_first<'a>(bytes: &'a [u8], opts: &DiagOptions) -> Result<(String, &'a [u8])> {
    let v = validate_prefix(bytes, &Limits::default())?;
    let item = Cbor::unchecked(&bytes[..v.len]).tagged_item();
    let mut out = String::new();
    render_item(&mut out, item, opts).expect("writing to a String cannot fail");
    Ok((out, &bytes[v.len..]))
}

pub(crate) fn render_item<W: Write>(
    out: &mut W,
    item: TaggedItem<'_>,
    opts: &DiagOptions,
) -> fmt::Result {
    let mut parens = 0;
    for tag in item.tags() {
        write!(out, "{}(", tag)?;
        parens += 1;
    }
    match item.kind() {
        ItemKind::Pos(x) => write!(out, "{}", x)?,
        ItemKind::Neg(x) => write!(out, "{}", -1 - x as i128)?,
        ItemKind::Float(x) => {
            write_float(out, x)?;
            if opts.float_precision {
                let initial = tag_chain(item.cbor().as_slice()).1[0];
                let width = match initial & 31 {
                    LIT_FLOAT16 => "_1",
                    LIT_FLOAT32 => "_2",
                    _ => "_3",
                };
                out.write_str(width)?;
            }
        }
        ItemKind::Str(s) => {
            if s.is_indefinite() {
                if s.is_empty() {
                    write!(out, "\"\"_")?;
                } else {
                    write!(out, "(_")?;
                    let mut first = true;
                    for chunk in s {
                        if !first {
                            write!(out, ",")?;
                        }
                        first = false;
                        write!(out, " \"{}\"", chunk.escape_debug())?;
                    }
                    write!(out, ")")?;
                }
            } else {
                write!(out, "\"{}\"", s.as_cow().escape_debug())?;
            }
        }
        ItemKind::Bytes(b) => render_bytes(out, b, opts)?,
        ItemKind::Bool(b) => write!(out, "{}", b)?,
        ItemKind::Null => write!(out, "null")?,
        ItemKind::Undefined => write!(out, "undefined")?,
        ItemKind::Simple(s) => write!(out, "simple({})", s)?,
        ItemKind::Array(a) => {
            write!(out, "[")?;
            if a.size().is_none() {
                write!(out, "_ ")?;
            }
            let mut first = true;
            for element in a {
                if !first {
                    write!(out, ", ")?;
                }
                first = false;
                render_item(out, element.tagged_item(), opts)?;
            }
            write!(out, "]")?;
        }
        ItemKind::Map(m) => {
            write!(out, "{{")?;
            if m.size().is_none() {
                write!(out, "_ ")?;
            }
            let mut first = true;
            for (k, v) in m {
                if !first {
                    write!(out, ", ")?;
                }
                first = false;
                render_item(out, k.tagged_item(), opts)?;
                write!(out, ": ")?;
                render_item(out, v.tagged_item(), opts)?;
            }
            write!(out, "}}")?;
        }
    }
    for _ in 0..parens {
        write!(out, ")")?;
    }
    Ok(())
}

fn render_bytes<W: Write>(out: &mut W, bytes: BytesIter<'_>, opts: &DiagOptions) -> fmt::Result {
    if bytes.is_indefinite() {
        if bytes.is_empty() {
            return write!(out, "''_");
        }
        write!(out, "(_")?;
        let mut first = true;
        for chunk in bytes {
            if !first {
                write!(out, ",")?;
            }
            first = false;
            write!(out, " ")?;
            render_chunk(out, chunk, opts)?;
        }
        return write!(out, ")");
    }
    let data = bytes.as_cow();
    if opts.bytes_as_text {
        if let Ok(text) = std::str::from_utf8(&data) {
            return write!(out, "'{}'", text.escape_debug());
        }
    }
    if opts.embedded_cbor
        && !data.is_empty()
        && crate::validate::validate(&data, &Limits::default()).is_ok()
    {
        write!(out, "<<")?;
        render_item(out, Cbor::unchecked(&data).tagged_item(), opts)?;
        return write!(out, ">>");
    }
    render_chunk(out, &data, opts)
}

fn render_chunk<W: Write>(out: &mut W, data: &[u8], opts: &DiagOptions) -> fmt::Result {
    match opts.byte_string_base {
        ByteStringBase::Base16 => {
            write!(out, "h'")?;
            for (i, byte) in data.iter().enumerate() {
                if opts.hex_whitespace && i > 0 {
                    write!(out, " ")?;
                }
                write!(out, "{:02x}", byte)?;
            }
            write!(out, "'")
        }
        ByteStringBase::Base32 => write!(out, "b32'{}'", BASE32_NOPAD.encode(data)),
        ByteStringBase::Base32Hex => write!(out, "h32'{}'", BASE32HEX_NOPAD.encode(data)),
        ByteStringBase::Base64Url => write!(out, "b64'{}'", BASE64URL_NOPAD.encode(data)),
    }
}

fn write_float<W: Write>(out: &mut W, x: f64) -> fmt::Result {
    if x == f64::INFINITY {
        return write!(out, "Infinity");
    }
    if x == f64::NEG_INFINITY {
        return write!(out, "-Infinity");
    }
    if x.is_nan() {
        return write!(out, "NaN");
    }
    let s = if x != 0.0 && (x.abs() < 1e-6 || x.abs() > 1e16) {
        format!("{:e}", x)
    } else {
        format!("{}", x)
    };
    let e = s.find('e').unwrap_or(s.len());
    let (mantissa, exponent) = s.split_at(e);
    write!(out, "{}", mantissa)?;
    if !mantissa.contains('.') {
        write!(out, ".0")?;
    }
    write!(out, "{}", exponent)
}
