use std::cmp::min;

use super::{
    bitstream::BitStream,
    error::{QRError, QRResult},
    metadata::{ECLevel, Version},
};

// Byte mode framing constants
//------------------------------------------------------------------------------

const MODE_BYTE: u8 = 0b0100;

const MODE_BIT_LEN: usize = 4;

const TERMINATOR_BIT_LEN: usize = 4;

static PADDING_CODEWORDS: [u8; 2] = [0b1110_1100, 0b0001_0001];

// Encoder
//------------------------------------------------------------------------------

pub(crate) fn encode(data: &[u8], ec_level: ECLevel) -> QRResult<(BitStream, Version)> {
    let version = find_min_version(data.len(), ec_level)?;
    let bs = encode_with_version(data, ec_level, version)?;
    Ok((bs, version))
}

pub(crate) fn encode_with_version(
    data: &[u8],
    ec_level: ECLevel,
    version: Version,
) -> QRResult<BitStream> {
    let bit_capacity = version.data_bit_capacity(ec_level);
    let bit_len = MODE_BIT_LEN + version.char_count_bits() + (data.len() << 3);
    if bit_len > bit_capacity {
        return Err(QRError::PayloadTooLarge);
    }

    let mut bs = BitStream::new(bit_capacity);
    push_header(data.len(), version, &mut bs);
    push_byte_data(data, &mut bs);
    push_terminator(&mut bs);
    push_padding_bits(&mut bs);
    push_padding_codewords(&mut bs);
    Ok(bs)
}

// The framed size only changes where the count indicator widens, so it is
// recomputed at versions 1 and 10 alone
fn find_min_version(data_len: usize, ec_level: ECLevel) -> QRResult<Version> {
    let mut size = 0;
    for v in 1..=40 {
        let version = Version(v);
        if v == 1 || v == 10 {
            size = MODE_BIT_LEN + version.char_count_bits() + (data_len << 3);
        }
        if size <= version.data_bit_capacity(ec_level) {
            return Ok(version);
        }
    }
    Err(QRError::PayloadTooLarge)
}

// Writer for the framed payload
//------------------------------------------------------------------------------

fn push_header(char_count: usize, version: Version, out: &mut BitStream) {
    out.push_bits(MODE_BYTE, MODE_BIT_LEN);
    let len_bits = version.char_count_bits();
    debug_assert!(
        char_count < (1 << len_bits),
        "Char count exceeds indicator width: Char count {char_count}, Indicator bits {len_bits}"
    );
    out.push_bits(char_count as u16, len_bits);
}

fn push_byte_data(data: &[u8], out: &mut BitStream) {
    for &byte in data {
        out.push_bits(byte, 8);
    }
}

// Up to 4 zero bits, clipped if the capacity would be exceeded
fn push_terminator(out: &mut BitStream) {
    let bit_len = out.len();
    let bit_capacity = out.capacity();
    if bit_len < bit_capacity {
        let term_len = min(TERMINATOR_BIT_LEN, bit_capacity - bit_len);
        out.push_bits(0u8, term_len);
    }
}

fn push_padding_bits(out: &mut BitStream) {
    let offset = out.len() & 7;
    if offset > 0 {
        out.push_bits(0u8, 8 - offset);
    }
}

fn push_padding_codewords(out: &mut BitStream) {
    let offset = out.len() & 7;
    debug_assert!(offset == 0, "Bit offset should be zero before padding codewords: {offset}");

    let remain_byte_capacity = (out.capacity() - out.len()) >> 3;
    PADDING_CODEWORDS.iter().copied().cycle().take(remain_byte_capacity).for_each(|pc| {
        out.push_bits(pc, 8);
    });
}
