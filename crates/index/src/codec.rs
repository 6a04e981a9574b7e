//! Composite-key codec.
//!
//! Stored index keys sort byte-lexicographically by component count, then by
//! each component, then by sequence number.
//!
//! ```text
//! key    := count SEP (component SEP)* seq
//! prefix := count SEP (component SEP)*
//! count  := 4 lowercase hex digits
//! seq    := 16 lowercase hex digits
//! ```
//!
//! Each component is cut into 4-byte big-endian blocks; every block becomes 5
//! base-85 digits from `'*'..='~'`, a short final block being zero padded. One
//! marker byte from `'%'..=')'` closes the component and records how many bytes
//! of the final block are real (0 only for the empty component). Markers sort
//! below every digit and only appear last, so component encodings are
//! prefix-free and compare exactly like the raw bytes they encode.

use alloc::format;
use alloc::vec::Vec;
use mapfold_core::{Error, Result};

/// Byte written after the count field and after every component.
pub const SEPARATOR: u8 = b'!';

/// Width of the hexadecimal component count.
pub const COUNT_WIDTH: usize = 4;

/// Width of the hexadecimal sequence number suffix.
pub const SEQ_WIDTH: usize = 16;

/// Largest number of components a key may carry.
pub const MAX_COMPONENTS: usize = 0xFFFF;

const DIGIT_BASE: u8 = b'*';
const MARKER_BASE: u8 = b'%';
const BLOCK_DIGITS: usize = 5;
const HEX: &[u8; 16] = b"0123456789abcdef";

/// Encodes a stored index key.
pub fn encode<C: AsRef<[u8]>>(components: &[C], seq: u64) -> Result<Vec<u8>> {
    let mut out = encode_prefix(components)?;
    push_hex(&mut out, seq, SEQ_WIDTH);
    Ok(out)
}

/// Encodes the key of a reduce node, which is also the scan prefix of every
/// stored key with exactly these components.
pub fn encode_prefix<C: AsRef<[u8]>>(components: &[C]) -> Result<Vec<u8>> {
    join_prefix(components, false)
}

/// Encodes `components` as a scan prefix. With `deeper` the count field is one
/// larger, so the prefix matches keys nested one level below `components`.
pub fn join_prefix<C: AsRef<[u8]>>(components: &[C], deeper: bool) -> Result<Vec<u8>> {
    let count = components.len() + usize::from(deeper);
    if count > MAX_COMPONENTS {
        return Err(Error::key_encoding(format!(
            "key has {} components, at most {} are supported",
            count, MAX_COMPONENTS
        )));
    }

    let payload: usize = components.iter().map(|c| c.as_ref().len()).sum();
    let mut out = Vec::with_capacity(COUNT_WIDTH + 1 + payload * 5 / 4 + components.len() * 7 + SEQ_WIDTH);
    push_hex(&mut out, count as u64, COUNT_WIDTH);
    out.push(SEPARATOR);
    for component in components {
        encode_component(component.as_ref(), &mut out);
        out.push(SEPARATOR);
    }
    Ok(out)
}

/// Decodes a stored index key into its components and sequence number.
pub fn decode(bytes: &[u8]) -> Result<(Vec<Vec<u8>>, u64)> {
    let (components, rest) = decode_components(bytes)?;
    if rest.len() != SEQ_WIDTH {
        return Err(Error::key_encoding(format!(
            "expected {} sequence digits, found {} bytes",
            SEQ_WIDTH,
            rest.len()
        )));
    }
    let seq = parse_hex(rest)?;
    Ok((components, seq))
}

/// Decodes a key without sequence suffix (a reduce node key or the visible
/// part of an index key).
pub fn decode_prefix(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let (components, rest) = decode_components(bytes)?;
    if !rest.is_empty() {
        return Err(Error::key_encoding(format!(
            "{} trailing bytes after last component",
            rest.len()
        )));
    }
    Ok(components)
}

/// Splits a stored index key into its visible part and sequence number
/// without decoding the components.
pub fn split_seq(bytes: &[u8]) -> Result<(&[u8], u64)> {
    if bytes.len() < COUNT_WIDTH + 1 + SEQ_WIDTH {
        return Err(Error::key_encoding("key too short to carry a sequence number"));
    }
    let (visible, seq) = bytes.split_at(bytes.len() - SEQ_WIDTH);
    Ok((visible, parse_hex(seq)?))
}

fn encode_component(bytes: &[u8], out: &mut Vec<u8>) {
    let mut marker = 0u8;
    for chunk in bytes.chunks(4) {
        let mut block = [0u8; 4];
        block[..chunk.len()].copy_from_slice(chunk);
        push_block(u32::from_be_bytes(block), out);
        marker = chunk.len() as u8;
    }
    out.push(MARKER_BASE + marker);
}

fn push_block(mut value: u32, out: &mut Vec<u8>) {
    let mut digits = [0u8; BLOCK_DIGITS];
    for slot in digits.iter_mut().rev() {
        *slot = DIGIT_BASE + (value % 85) as u8;
        value /= 85;
    }
    out.extend_from_slice(&digits);
}

fn decode_components(bytes: &[u8]) -> Result<(Vec<Vec<u8>>, &[u8])> {
    if bytes.len() < COUNT_WIDTH + 1 {
        return Err(Error::key_encoding("key too short for component count"));
    }
    let count = parse_hex(&bytes[..COUNT_WIDTH])? as usize;
    if bytes[COUNT_WIDTH] != SEPARATOR {
        return Err(Error::key_encoding("missing separator after component count"));
    }

    let mut rest = &bytes[COUNT_WIDTH + 1..];
    let mut components = Vec::with_capacity(count);
    for index in 0..count {
        let (component, used) = decode_component(rest)?;
        if rest.get(used) != Some(&SEPARATOR) {
            return Err(Error::key_encoding(format!(
                "missing separator after component {}",
                index
            )));
        }
        components.push(component);
        rest = &rest[used + 1..];
    }
    Ok((components, rest))
}

/// Decodes one component, returning it with the number of bytes consumed
/// (including the marker).
fn decode_component(bytes: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let Some(&b) = bytes.get(pos) else {
            return Err(Error::key_encoding("component is not terminated"));
        };
        if (MARKER_BASE..MARKER_BASE + 5).contains(&b) {
            let tail = (b - MARKER_BASE) as usize;
            let blocks = pos / BLOCK_DIGITS;
            if (blocks == 0) != (tail == 0) {
                return Err(Error::key_encoding("length marker disagrees with block count"));
            }
            if tail > 0 {
                let keep = out.len() - 4 + tail;
                if out[keep..].iter().any(|&pad| pad != 0) {
                    return Err(Error::key_encoding("non-zero padding in final block"));
                }
                out.truncate(keep);
            }
            return Ok((out, pos + 1));
        }

        let digits = bytes
            .get(pos..pos + BLOCK_DIGITS)
            .ok_or_else(|| Error::key_encoding("truncated base-85 block"))?;
        let mut value: u64 = 0;
        for &d in digits {
            if !(DIGIT_BASE..DIGIT_BASE + 85).contains(&d) {
                return Err(Error::key_encoding(format!("invalid base-85 digit {:#04x}", d)));
            }
            value = value * 85 + u64::from(d - DIGIT_BASE);
        }
        let value = u32::try_from(value)
            .map_err(|_| Error::key_encoding("base-85 block exceeds 32 bits"))?;
        out.extend_from_slice(&value.to_be_bytes());
        pos += BLOCK_DIGITS;
    }
}

fn push_hex(out: &mut Vec<u8>, value: u64, width: usize) {
    for shift in (0..width).rev() {
        out.push(HEX[((value >> (shift * 4)) & 0xF) as usize]);
    }
}

fn parse_hex(digits: &[u8]) -> Result<u64> {
    let mut value: u64 = 0;
    for &d in digits {
        let nibble = match d {
            b'0'..=b'9' => d - b'0',
            b'a'..=b'f' => d - b'a' + 10,
            _ => return Err(Error::key_encoding(format!("invalid hex digit {:#04x}", d))),
        };
        value = (value << 4) | u64::from(nibble);
    }
    Ok(value)
}
