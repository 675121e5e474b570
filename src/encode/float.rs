//! The float pipeline: NaN policy, infinity policy, then shortest-width
//! shrinking with bit-exact round-trips.

use crate::options::{EncOptions, InfConvert, NanConvert, ShortestFloat};
use half::f16;

const F16_EXP: u16 = 0x7c00;
const F32_EXP: u32 = 0x7f80_0000;

fn emit16(out: &mut Vec<u8>, bits: u16) {
    out.push(0xf9);
    out.extend_from_slice(&bits.to_be_bytes());
}

fn emit32(out: &mut Vec<u8>, bits: u32) {
    out.push(0xfa);
    out.extend_from_slice(&bits.to_be_bytes());
}

fn emit64(out: &mut Vec<u8>, bits: u64) {
    out.push(0xfb);
    out.extend_from_slice(&bits.to_be_bytes());
}

/// Smallest width that carries this 64-bit NaN payload unchanged.
fn nan64_smallest(out: &mut Vec<u8>, bits: u64) {
    let sign = (bits >> 63) as u16;
    let mant = bits & ((1 << 52) - 1);
    if mant & ((1 << 42) - 1) == 0 && mant >> 42 != 0 {
        emit16(out, sign << 15 | F16_EXP | (mant >> 42) as u16);
    } else if mant & ((1 << 29) - 1) == 0 && mant >> 29 != 0 {
        emit32(
            out,
            ((bits >> 63) as u32) << 31 | F32_EXP | (mant >> 29) as u32,
        );
    } else {
        emit64(out, bits);
    }
}

fn nan32_smallest(out: &mut Vec<u8>, bits: u32) {
    let sign = (bits >> 31) as u16;
    let mant = bits & ((1 << 23) - 1);
    if mant & ((1 << 13) - 1) == 0 && mant >> 13 != 0 {
        emit16(out, sign << 15 | F16_EXP | (mant >> 13) as u16);
    } else {
        emit32(out, bits);
    }
}

fn shrink32(out: &mut Vec<u8>, v: f32, opts: &EncOptions) {
    if opts.shortest_float == ShortestFloat::Float16 {
        let h = f16::from_f32(v);
        if h.to_f32().to_bits() == v.to_bits() {
            emit16(out, h.to_bits());
            return;
        }
    }
    emit32(out, v.to_bits());
}

pub(crate) fn write_f64(out: &mut Vec<u8>, v: f64, opts: &EncOptions) {
    if v.is_nan() {
        match opts.nan_convert {
            NanConvert::Canonical7e00 => emit16(out, 0x7e00),
            NanConvert::None => emit64(out, v.to_bits()),
            NanConvert::ForceQuiet => nan64_smallest(out, v.to_bits() | 1 << 51),
            NanConvert::PreservePayload => nan64_smallest(out, v.to_bits()),
        }
    } else if v.is_infinite() {
        match opts.inf_convert {
            InfConvert::Float16 => emit16(out, if v > 0.0 { 0x7c00 } else { 0xfc00 }),
            InfConvert::None => emit64(out, v.to_bits()),
        }
    } else if opts.shortest_float == ShortestFloat::Float16 {
        let narrow = v as f32;
        if (narrow as f64).to_bits() == v.to_bits() {
            shrink32(out, narrow, opts);
        } else {
            emit64(out, v.to_bits());
        }
    } else {
        emit64(out, v.to_bits());
    }
}

pub(crate) fn write_f32(out: &mut Vec<u8>, v: f32, opts: &EncOptions) {
    if v.is_nan() {
        match opts.nan_convert {
            NanConvert::Canonical7e00 => emit16(out, 0x7e00),
            NanConvert::None => emit32(out, v.to_bits()),
            NanConvert::ForceQuiet => nan32_smallest(out, v.to_bits() | 1 << 22),
            NanConvert::PreservePayload => nan32_smallest(out, v.to_bits()),
        }
    } else if v.is_infinite() {
        match opts.inf_convert {
            InfConvert::Float16 => emit16(out, if v > 0.0 { 0x7c00 } else { 0xfc00 }),
            InfConvert::None => emit32(out, v.to_bits()),
        }
    } else {
        shrink32(out, v, opts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_with(v: f64, opts: &EncOptions) -> Vec<u8> {
        let mut out = Vec::new();
        write_f64(&mut out, v, opts);
        out
    }

    #[test]
    fn default_nan_is_canonical() {
        let opts = EncOptions::default();
        assert_eq!(f64_with(f64::NAN, &opts), vec![0xf9, 0x7e, 0x00]);
        assert_eq!(f64_with(-f64::NAN, &opts), vec![0xf9, 0x7e, 0x00]);
    }

    #[test]
    fn nan_payloads() {
        let opts = EncOptions {
            nan_convert: NanConvert::PreservePayload,
            ..EncOptions::default()
        };
        // quiet NaN with empty payload shrinks to f9 7e00
        let bits = 0x7ff8_0000_0000_0000u64;
        assert_eq!(f64_with(f64::from_bits(bits), &opts), vec![0xf9, 0x7e, 0x00]);
        // payload in the top 10 bits survives in 16 bits
        let bits = 0x7ff8_4000_0000_0000u64;
        assert_eq!(f64_with(f64::from_bits(bits), &opts), vec![0xf9, 0x7e, 0x01]);
        // payload needing 23 bits goes to 32
        let bits = 0x7ff8_0000_2000_0000u64;
        assert_eq!(
            f64_with(f64::from_bits(bits), &opts),
            vec![0xfa, 0x7f, 0xc0, 0x00, 0x01]
        );
        // payload using low bits stays at 64
        let bits = 0x7ff8_0000_0000_0001u64;
        assert_eq!(f64_with(f64::from_bits(bits), &opts).len(), 9);
    }

    #[test]
    fn force_quiet_sets_the_bit() {
        let opts = EncOptions {
            nan_convert: NanConvert::ForceQuiet,
            ..EncOptions::default()
        };
        // signaling NaN with a 10-bit payload becomes a quiet 16-bit NaN
        let bits = 0x7ff0_4000_0000_0000u64;
        assert_eq!(f64_with(f64::from_bits(bits), &opts), vec![0xf9, 0x7e, 0x01]);
    }

    #[test]
    fn infinities() {
        let opts = EncOptions::default();
        assert_eq!(f64_with(f64::INFINITY, &opts), vec![0xf9, 0x7c, 0x00]);
        assert_eq!(f64_with(f64::NEG_INFINITY, &opts), vec![0xf9, 0xfc, 0x00]);
        let opts = EncOptions {
            inf_convert: InfConvert::None,
            ..EncOptions::default()
        };
        assert_eq!(f64_with(f64::INFINITY, &opts).len(), 9);
    }

    #[test]
    fn shortest_float_shrinks_exactly() {
        let opts = EncOptions {
            shortest_float: ShortestFloat::Float16,
            ..EncOptions::default()
        };
        assert_eq!(f64_with(0.0, &opts), vec![0xf9, 0x00, 0x00]);
        assert_eq!(f64_with(-0.0, &opts), vec![0xf9, 0x80, 0x00]);
        assert_eq!(f64_with(1.0, &opts), vec![0xf9, 0x3c, 0x00]);
        assert_eq!(f64_with(1.5, &opts), vec![0xf9, 0x3e, 0x00]);
        assert_eq!(f64_with(65504.0, &opts), vec![0xf9, 0x7b, 0xff]);
        // 5.960464477539063e-8 is the smallest positive subnormal f16
        assert_eq!(f64_with(5.960464477539063e-8, &opts), vec![0xf9, 0x00, 0x01]);
        // f32 but not f16
        assert_eq!(
            f64_with(100000.0, &opts),
            vec![0xfa, 0x47, 0xc3, 0x50, 0x00]
        );
        assert_eq!(
            f64_with(3.4028234663852886e38, &opts),
            vec![0xfa, 0x7f, 0x7f, 0xff, 0xff]
        );
        // f64 only
        assert_eq!(f64_with(1.1, &opts).len(), 9);
        assert_eq!(f64_with(1.0e300, &opts).len(), 9);
    }

    #[test]
    fn no_shrinking_without_the_option() {
        let opts = EncOptions::default();
        assert_eq!(f64_with(1.0, &opts).len(), 9);
        let mut out = Vec::new();
        write_f32(&mut out, 1.0, &opts);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn shrinking_is_idempotent() {
        let opts = EncOptions {
            shortest_float: ShortestFloat::Float16,
            ..EncOptions::default()
        };
        for v in [0.0f64, 1.0, 1.5, -2.25, 65504.0, 100000.0, 1.1] {
            let once = f64_with(v, &opts);
            // decode the shrunk form and shrink again
            let decoded = match once[0] {
                0xf9 => f16::from_bits(u16::from_be_bytes([once[1], once[2]])).to_f64(),
                0xfa => {
                    f32::from_bits(u32::from_be_bytes([once[1], once[2], once[3], once[4]])) as f64
                }
                _ => f64::from_bits(u64::from_be_bytes(once[1..9].try_into().unwrap())),
            };
            assert_eq!(f64_with(decoded, &opts), once);
        }
    }
}
