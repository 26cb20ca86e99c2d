//! Cursor primitives shared by every record decoder.
//!
//! All decoders in this crate operate on an explicit `&mut &[u8]` cursor
//! that advances by reslicing, so individual field decodes compose freely
//! and carry no hidden parser state.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::error::{IsoError, Result};

/// Take `count` raw bytes, advancing the cursor.
pub fn take_bytes<'a>(reader: &mut &'a [u8], count: usize) -> Result<&'a [u8]> {
    if reader.len() < count {
        return Err(IsoError::ImageCorrupt(format!(
            "record needs {} more bytes, buffer has {}",
            count,
            reader.len()
        )));
    }
    let (head, tail) = reader.split_at(count);
    *reader = tail;
    Ok(head)
}

/// Skip `count` bytes of fields this reader does not model.
pub fn skip_bytes(reader: &mut &[u8], count: usize) -> Result<()> {
    take_bytes(reader, count).map(|_| ())
}

/// Read one byte.
pub fn read_u8(reader: &mut &[u8]) -> Result<u8> {
    Ok(take_bytes(reader, 1)?[0])
}

/// Read a fixed-width identifier, stripping its trailing space padding.
pub fn read_padded_str(reader: &mut &[u8], width: usize) -> Result<String> {
    let raw = take_bytes(reader, width)?;
    Ok(String::from_utf8_lossy(raw)
        .trim_end_matches(' ')
        .to_string())
}

/// Read a 16-bit value stored little-endian then big-endian.
///
/// The format duplicates most integers in both byte orders as a
/// self-check; the two copies must agree.
pub fn read_u16_both(reader: &mut &[u8], field: &'static str) -> Result<u16> {
    let raw = take_bytes(reader, 4)?;
    let little = LittleEndian::read_u16(&raw[0..2]);
    let big = BigEndian::read_u16(&raw[2..4]);
    if little != big {
        return Err(both_endian_mismatch(field, u64::from(little), u64::from(big)));
    }
    Ok(little)
}

/// Read a 32-bit value stored little-endian then big-endian.
pub fn read_u32_both(reader: &mut &[u8], field: &'static str) -> Result<u32> {
    let raw = take_bytes(reader, 8)?;
    let little = LittleEndian::read_u32(&raw[0..4]);
    let big = BigEndian::read_u32(&raw[4..8]);
    if little != big {
        return Err(both_endian_mismatch(field, u64::from(little), u64::from(big)));
    }
    Ok(little)
}

/// Read a single little-endian u16.
pub fn read_u16_le(reader: &mut &[u8]) -> Result<u16> {
    Ok(LittleEndian::read_u16(take_bytes(reader, 2)?))
}

/// Read a single little-endian u32.
pub fn read_u32_le(reader: &mut &[u8]) -> Result<u32> {
    Ok(LittleEndian::read_u32(take_bytes(reader, 4)?))
}

/// Read a single big-endian u32.
pub fn read_u32_be(reader: &mut &[u8]) -> Result<u32> {
    Ok(BigEndian::read_u32(take_bytes(reader, 4)?))
}

fn both_endian_mismatch(field: &'static str, little: u64, big: u64) -> IsoError {
    IsoError::ImageCorrupt(format!(
        "both-endian mismatch in {}: little={}, big={}",
        field, little, big
    ))
}
