//! Packed field encoding.
//!
//! Each value starts with a header byte: the top three bits select the kind,
//! bit 4 is the sign for integer kinds, and the low four bits carry the high
//! payload bits for integer kinds. A lone `0x00` byte encodes the value zero.
//!
//! ```text
//! kind  bits  bytes  encodes
//! ----------------------------------------------------------
//! 0     5     1      integers -15..=15
//! 1     13    2      integers -4095..=4095
//! 2     21    3      integers -1048575..=1048575
//! 3     29    4      integers -268435455..=268435455
//! 4     16    3      IEEE 754 half
//! 5     32    5      IEEE 754 single
//! 6     64    9      IEEE 754 double
//! ```
//!
//! Integer payloads are big-endian; float payloads are little-endian. The
//! byte form is the collection's only externally observable binary format.

use half::f16;

pub(crate) const MAX_FIELD_BYTES: usize = 9;

const MAX_INT5: u64 = 15;
const MAX_INT13: u64 = 4095;
const MAX_INT21: u64 = 1_048_575;
const MAX_INT29: u64 = 268_435_455;

/// Appends one encoded value to `dst`.
pub(crate) fn append_packed(dst: &mut Vec<u8>, value: f64) {
    if value == 0.0 {
        dst.push(0);
        return;
    }
    let whole = value as i64;
    if value == whole as f64 {
        let signed: u8 = if whole < 0 { 0x10 } else { 0 };
        let mag = whole.unsigned_abs();
        if mag <= MAX_INT5 {
            dst.push(signed | mag as u8);
            return;
        }
        if mag <= MAX_INT13 {
            dst.extend_from_slice(&[1 << 5 | signed | (mag >> 8) as u8, mag as u8]);
            return;
        }
        if mag <= MAX_INT21 {
            dst.extend_from_slice(&[
                2 << 5 | signed | (mag >> 16) as u8,
                (mag >> 8) as u8,
                mag as u8,
            ]);
            return;
        }
        if mag <= MAX_INT29 {
            dst.extend_from_slice(&[
                3 << 5 | signed | (mag >> 24) as u8,
                (mag >> 16) as u8,
                (mag >> 8) as u8,
                mag as u8,
            ]);
            return;
        }
        // too wide for the integer kinds
    }
    let single = value as f32;
    if value == single as f64 {
        let binary16 = f16::from_f32(single);
        if single == binary16.to_f32() {
            dst.push(4 << 5);
            dst.extend_from_slice(&binary16.to_le_bytes());
            return;
        }
        dst.push(5 << 5);
        dst.extend_from_slice(&single.to_le_bytes());
        return;
    }
    dst.push(6 << 5);
    dst.extend_from_slice(&value.to_le_bytes());
}

/// Reads one value, returning the remaining bytes. Empty input reads as zero.
pub(crate) fn read_packed(data: &[u8]) -> (&[u8], f64) {
    if data.is_empty() {
        return (data, 0.0);
    }
    if data[0] == 0 {
        return (&data[1..], 0.0);
    }
    let kind = data[0] >> 5;
    match kind {
        0..=3 => {
            let extra = kind as usize;
            let mut mag = (data[0] & 0xF) as u64;
            for &byte in &data[1..=extra] {
                mag = mag << 8 | byte as u64;
            }
            let mut value = mag as f64;
            if data[0] & 0x10 != 0 {
                value = -value;
            }
            (&data[extra + 1..], value)
        }
        4 => (
            &data[3..],
            f64::from(f16::from_le_bytes([data[1], data[2]]).to_f32()),
        ),
        5 => (
            &data[5..],
            f64::from(f32::from_le_bytes([data[1], data[2], data[3], data[4]])),
        ),
        6 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[1..9]);
            (&data[9..], f64::from_le_bytes(raw))
        }
        _ => unreachable!("invalid field data"),
    }
}

/// Advances past up to `count` values, returning the remaining bytes and the
/// number of values actually skipped.
pub(crate) fn skip_packed(data: &[u8], count: usize) -> (&[u8], usize) {
    let mut i = 0;
    let mut read = 0;
    while i < data.len() {
        if read >= count {
            return (&data[i..], read);
        }
        let kind = data[i] >> 5;
        i += match kind {
            0..=3 => kind as usize + 1,
            4 => 3,
            5 => 5,
            _ => 9,
        };
        read += 1;
    }
    (&data[data.len()..], read)
}

pub(crate) fn generate_packed(values: &[f64]) -> Vec<u8> {
    let mut dst = Vec::new();
    for &value in values {
        append_packed(&mut dst, value);
    }
    dst
}

/// Writes `value` at logical `index`, growing or splicing the buffer as
/// needed. Returns false when nothing changed.
pub(crate) fn set_field(buf: &mut Vec<u8>, index: usize, value: f64) -> bool {
    let (tail_len, read) = {
        let (rest, read) = skip_packed(buf, index);
        (rest.len(), read)
    };
    let offset = buf.len() - tail_len;

    if offset == buf.len() {
        // index is past the stored values
        if value == 0.0 {
            return false;
        }
        // pad the logical gap with zero-encoded slots
        buf.resize(buf.len() + (index - read), 0);
        append_packed(buf, value);
        return true;
    }

    let (next_len, current) = {
        let (rest, current) = read_packed(&buf[offset..]);
        (rest.len(), current)
    };
    if current == value {
        return false;
    }
    let end = buf.len() - next_len;

    let mut encoded = Vec::with_capacity(MAX_FIELD_BYTES);
    append_packed(&mut encoded, value);
    if encoded.len() == end - offset {
        buf[offset..end].copy_from_slice(&encoded);
    } else {
        buf.splice(offset..end, encoded);
    }
    true
}

pub(crate) fn for_each(buf: &[u8], count: Option<usize>, f: &mut impl FnMut(f64) -> bool) {
    let mut data = buf;
    match count {
        None => {
            while !data.is_empty() {
                let (rest, value) = read_packed(data);
                data = rest;
                if !f(value) {
                    return;
                }
            }
        }
        Some(n) => {
            for _ in 0..n {
                let (rest, value) = read_packed(data);
                data = rest;
                if !f(value) {
                    return;
                }
            }
        }
    }
}

pub(crate) fn get_field(buf: &[u8], index: usize) -> f64 {
    let (rest, read) = skip_packed(buf, index);
    if read == index && !rest.is_empty() {
        read_packed(rest).1
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn roundtrip(values: &[f64]) -> Vec<f64> {
        let buf = generate_packed(values);
        let mut out = Vec::new();
        let mut data = &buf[..];
        while !data.is_empty() {
            let (rest, value) = read_packed(data);
            data = rest;
            out.push(value);
        }
        out
    }

    #[test]
    fn test_zero_is_one_byte() {
        let mut dst = Vec::new();
        append_packed(&mut dst, 0.0);
        assert_eq!(dst, vec![0]);
        append_packed(&mut dst, -0.0);
        assert_eq!(dst, vec![0, 0]);
    }

    #[test]
    fn test_integer_kind_boundaries() {
        for (value, bytes) in [
            (0.0, 1),
            (15.0, 1),
            (-15.0, 1),
            (16.0, 2),
            (4095.0, 2),
            (-4095.0, 2),
            (4096.0, 3),
            (1_048_575.0, 3),
            (1_048_576.0, 4),
            (268_435_455.0, 4),
            (-268_435_455.0, 4),
            (268_435_456.0, 5), // spills into the binary32 kind
            (0.5, 3),
            (0.1, 9),
        ] {
            let mut dst = Vec::new();
            append_packed(&mut dst, value);
            assert_eq!(dst.len(), bytes, "encoded size of {value}");
            let (rest, decoded) = read_packed(&dst);
            assert!(rest.is_empty());
            assert_eq!(decoded, value, "round trip of {value}");
        }
    }

    #[test]
    fn test_codec_boundary_sequence() {
        let values = [
            0.0,
            15.0,
            16.0,
            4095.0,
            4096.0,
            268_435_455.0,
            0.5,
            1e30,
            -0.0,
        ];
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn test_float_kinds() {
        // exact in binary16
        let mut dst = Vec::new();
        append_packed(&mut dst, 0.25);
        assert_eq!(dst.len(), 3);
        // exact in binary32 only
        dst.clear();
        append_packed(&mut dst, f64::from(1.0_f32 / 3.0_f32));
        assert_eq!(dst.len(), 5);
        // needs binary64
        dst.clear();
        append_packed(&mut dst, std::f64::consts::PI);
        assert_eq!(dst.len(), 9);
        let (_, decoded) = read_packed(&dst);
        assert_eq!(decoded, std::f64::consts::PI);
    }

    #[test]
    fn test_skip_consumes_exact_prefix() {
        let values = [0.0, 1.0, -77.0, 0.5, 123456.0, 9.9, 0.0, 3e40];
        let buf = generate_packed(&values);

        let (rest, read) = skip_packed(&buf, 3);
        assert_eq!(read, 3);
        let mut remaining = Vec::new();
        let mut data = rest;
        while !data.is_empty() {
            let (r, v) = read_packed(data);
            data = r;
            remaining.push(v);
        }
        assert_eq!(remaining, values[3..]);

        let (rest, read) = skip_packed(&buf, 100);
        assert!(rest.is_empty());
        assert_eq!(read, values.len());
    }

    #[test]
    fn test_read_empty() {
        let (rest, value) = read_packed(&[]);
        assert!(rest.is_empty());
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_set_field_in_place_and_splice() {
        let mut buf = generate_packed(&[1.0, 2.0, 3.0]);
        // same encoded width: in-place
        assert!(set_field(&mut buf, 1, 7.0));
        assert_eq!(get_field(&buf, 1), 7.0);
        // wider encoding: splice
        assert!(set_field(&mut buf, 1, 123456.0));
        assert_eq!(get_field(&buf, 0), 1.0);
        assert_eq!(get_field(&buf, 1), 123456.0);
        assert_eq!(get_field(&buf, 2), 3.0);
        // narrower encoding: splice back down
        assert!(set_field(&mut buf, 1, 2.0));
        assert_eq!(buf, generate_packed(&[1.0, 2.0, 3.0]));
        // unchanged value
        assert!(!set_field(&mut buf, 1, 2.0));
    }

    #[test]
    fn test_set_field_past_end_pads_with_zeros() {
        let mut buf = generate_packed(&[1.0]);
        assert!(set_field(&mut buf, 3, 5.0));
        assert_eq!(buf, generate_packed(&[1.0, 0.0, 0.0, 5.0]));
        // zero past the end is a no-op
        let before = buf.clone();
        assert!(!set_field(&mut buf, 9, 0.0));
        assert_eq!(buf, before);
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let n = rng.gen_range(0..256);
            let values: Vec<f64> = (0..n)
                .map(|_| match rng.gen_range(0..9) {
                    0 => 0.0,
                    1 => rng.gen_range(-15..=15) as f64,
                    2 => rng.gen_range(-4095..=4095) as f64,
                    3 => rng.gen_range(-1_048_575..=1_048_575) as f64,
                    4 => rng.gen_range(-268_435_455..=268_435_455i64) as f64,
                    5 => 0.25,
                    6 => 0.75,
                    7 => f64::from(rng.gen::<f32>()),
                    _ => rng.gen::<f64>(),
                })
                .collect();
            assert_eq!(roundtrip(&values), values);

            let buf = generate_packed(&values);
            let half = values.len() / 2;
            let (rest, read) = skip_packed(&buf, half);
            assert_eq!(read, half);
            let (rest, read) = skip_packed(rest, values.len() - half);
            assert_eq!(read, values.len() - half);
            assert!(rest.is_empty());
        }
    }
}
