mod qr;

pub use qr::{Module, QR, QUIET_ZONE_WIDTH};

use std::ops::Deref;

use crate::common::{
    codec,
    ec::ecc,
    error::{QRError, QRResult},
    metadata::{ECLevel, Version},
};

// Builder
//------------------------------------------------------------------------------

pub struct QRBuilder<'a> {
    data: &'a [u8],
    version: Option<Version>,
    ec_level: Option<ECLevel>,
    overlay_scale: f64,
}

impl<'a> QRBuilder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, version: None, ec_level: None, overlay_scale: 0.0 }
    }

    pub fn data(&mut self, data: &'a [u8]) -> &mut Self {
        self.data = data;
        self
    }

    pub fn version(&mut self, version: Version) -> &mut Self {
        self.version = Some(version);
        self
    }

    pub fn ec_level(&mut self, ec_level: ECLevel) -> &mut Self {
        self.ec_level = Some(ec_level);
        self
    }

    pub fn overlay_scale(&mut self, overlay_scale: f64) -> &mut Self {
        self.overlay_scale = overlay_scale;
        self
    }
}

impl QRBuilder<'_> {
    pub fn build(&self) -> QRResult<QR> {
        if self.data.is_empty() {
            return Err(QRError::InvalidParameter);
        }
        if !(0.0..=1.0).contains(&self.overlay_scale) {
            return Err(QRError::InvalidParameter);
        }

        // An overlay eats into the symbol, so it bumps the default level up
        // to the strongest correction
        let ec_level = self
            .ec_level
            .unwrap_or(if self.overlay_scale > 0.0 { ECLevel::H } else { ECLevel::M });

        // Frame the payload to the exact data capacity
        let (encoded, version) = match self.version {
            Some(v) => (codec::encode_with_version(self.data, ec_level, v)?, v),
            None => codec::encode(self.data, ec_level)?,
        };

        // Split into blocks, compute per block ecc and interleave both
        let data_blocks = Self::blockify(encoded.data(), version, ec_level);
        let ecc_size_per_block = version.ecc_per_block(ec_level);
        let ecc_blocks = data_blocks.iter().map(|b| ecc(b, ecc_size_per_block)).collect::<Vec<_>>();

        let mut payload = Vec::with_capacity(version.total_codewords(ec_level));
        payload.extend(Self::interleave(&data_blocks));
        payload.extend(Self::interleave(&ecc_blocks));
        debug_assert!(
            payload.len() == version.total_codewords(ec_level),
            "Interleaved payload doesn't match total codewords: Payload {}, Total {}",
            payload.len(),
            version.total_codewords(ec_level)
        );

        // Construct the module grid
        let mut qr = QR::new(version, ec_level, self.overlay_scale);
        qr.draw_all_function_patterns();
        qr.draw_encoding_region(&payload);

        Ok(qr)
    }

    pub(crate) fn blockify(data: &[u8], version: Version, ec_level: ECLevel) -> Vec<&[u8]> {
        let block_count = version.block_count(ec_level);
        let total = data.len();

        debug_assert!(
            total == version.total_data_codewords(ec_level),
            "Data len doesn't match total data codewords: Data len {total}, Total {}",
            version.total_data_codewords(ec_level)
        );

        // The residue determines how many trailing blocks carry one extra
        // codeword
        let short_len = total / block_count;
        let residue = total % block_count;
        let split = short_len * (block_count - residue);

        let mut data_blocks = Vec::with_capacity(block_count);
        data_blocks.extend(data[..split].chunks(short_len));
        if residue > 0 {
            data_blocks.extend(data[split..].chunks(short_len + 1));
        }
        data_blocks
    }

    pub(crate) fn interleave<T: Copy, V: Deref<Target = [T]>>(blocks: &[V]) -> Vec<T> {
        let max_block_size = blocks.iter().map(|b| b.len()).max().expect("Blocks is empty");
        let total_size = blocks.iter().map(|b| b.len()).sum::<usize>();
        let mut res = Vec::with_capacity(total_size);
        for i in 0..max_block_size {
            for b in blocks {
                if i < b.len() {
                    res.push(b[i]);
                }
            }
        }
        res
    }
}

#[cfg(test)]
mod builder_tests {
    use test_case::test_case;

    use super::QRBuilder;
    use crate::common::{
        codec,
        ec::ecc,
        iter::EncRegionIter,
        metadata::{Color, ECLevel, Version},
    };
    use crate::builder::Module;

    #[test]
    fn test_blockify_single_block() {
        let data = (0u8..16).collect::<Vec<_>>();
        let blocks = QRBuilder::blockify(&data, Version(1), ECLevel::M);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], &*data);
    }

    // 46 codewords over 4 blocks leave a residue of 2, so the last two
    // blocks are one codeword longer
    #[test]
    fn test_blockify_residue() {
        let data = (0u8..46).collect::<Vec<_>>();
        let blocks = QRBuilder::blockify(&data, Version(5), ECLevel::H);
        let lens = blocks.iter().map(|b| b.len()).collect::<Vec<_>>();
        assert_eq!(lens, [11, 11, 12, 12]);
        assert_eq!(blocks[2][0], 22);
        assert_eq!(blocks.concat(), data);
    }

    #[test]
    fn test_interleave() {
        let blocks = vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9, 0]];
        let interleaved = QRBuilder::interleave(&blocks);
        let exp_interleaved = vec![1, 4, 7, 2, 5, 8, 3, 6, 9, 0];
        assert_eq!(interleaved, exp_interleaved);
    }

    // Zero ecc codewords take their slot in the stream like any other
    #[test]
    fn test_interleave_keeps_zero_codewords() {
        let blocks = vec![vec![0u8, 2], vec![0, 0]];
        assert_eq!(QRBuilder::interleave(&blocks), vec![0, 0, 2, 0]);
    }

    #[test]
    fn test_interleaved_len_matches_total_codewords() {
        for v in [1u8, 5, 10, 15, 27, 40] {
            for ec_level in [ECLevel::M, ECLevel::H] {
                let version = Version(v);
                let encoded = codec::encode_with_version(b"wren", ec_level, version).unwrap();
                let data_blocks = QRBuilder::blockify(encoded.data(), version, ec_level);
                let ecc_size = version.ecc_per_block(ec_level);
                let ecc_blocks =
                    data_blocks.iter().map(|b| ecc(b, ecc_size)).collect::<Vec<_>>();
                let total = QRBuilder::interleave(&data_blocks).len()
                    + QRBuilder::interleave(&ecc_blocks).len();
                assert_eq!(total, version.total_codewords(ec_level), "Version {v}");
            }
        }
    }

    // Bits land in placement order, inverted in every third column
    #[test]
    fn test_mask_consistency() {
        let data = b"mask check";
        let ec_level = ECLevel::M;
        let (encoded, version) = codec::encode(data, ec_level).unwrap();
        let data_blocks = QRBuilder::blockify(encoded.data(), version, ec_level);
        let ecc_size = version.ecc_per_block(ec_level);
        let ecc_blocks = data_blocks.iter().map(|b| ecc(b, ecc_size)).collect::<Vec<_>>();
        let mut payload = QRBuilder::interleave(&data_blocks);
        payload.extend(QRBuilder::interleave(&ecc_blocks));

        let qr = QRBuilder::new(data).build().unwrap();
        assert_eq!(qr.version(), version);

        let mut bits = payload
            .iter()
            .flat_map(|cw| (0..8).rev().map(move |i| (cw >> i) & 1 == 1));
        for (r, c) in EncRegionIter::new(version) {
            if let Module::Data(clr) = qr.get(r, c) {
                let bit = bits.next().unwrap();
                let expected = if c % 3 == 0 { !bit } else { bit };
                assert_eq!(clr == Color::Dark, expected, "Mismatch at ({r}, {c})");
            }
        }
        assert_eq!(bits.next(), None, "Payload bits left over after placement");
    }

    #[test_case("Hello, world!".to_string(), 1, ECLevel::M)]
    #[test_case("OK".to_string(), 1, ECLevel::H)]
    #[test_case("https://github.com/qrinlay".to_string(), 2, ECLevel::M)]
    #[test_case("qrinlay:0.1.0".to_string(), 2, ECLevel::H)]
    #[test_case("A11111111111111".repeat(7), 7, ECLevel::M)]
    #[test_case("1234567890".repeat(6), 7, ECLevel::H)]
    #[test_case("lorem ipsum ".repeat(16), 10, ECLevel::M)]
    #[test_case("1234567890".repeat(11), 10, ECLevel::H)]
    #[test_case("A111111111111111".repeat(60), 27, ECLevel::M)]
    #[test_case("1234567890".repeat(60), 27, ECLevel::H)]
    #[test_case("A111111111111111".repeat(140), 40, ECLevel::M)]
    #[test_case("1234567890".repeat(120), 40, ECLevel::H)]
    fn test_builder(data: String, version: u8, ec_level: ECLevel) {
        let version = Version::new(version).unwrap();
        let qr = QRBuilder::new(data.as_bytes())
            .version(version)
            .ec_level(ec_level)
            .build()
            .unwrap();

        let mut img = rqrr::PreparedImage::prepare(qr.render(8));
        let grids = img.detect_grids();
        assert_eq!(grids.len(), 1);
        let (meta, content) = grids[0].decode().unwrap();

        assert_eq!(*version as usize, meta.version.0);
        assert_eq!(data, content);
    }

    #[test]
    fn test_builder_empty_data() {
        use crate::common::error::QRError;
        assert_eq!(QRBuilder::new(b"").build().unwrap_err(), QRError::InvalidParameter);
    }

    #[test]
    fn test_builder_data_overflow() {
        use crate::common::error::QRError;
        let data = "1234567890".repeat(300);
        let err = QRBuilder::new(data.as_bytes()).ec_level(ECLevel::M).build().unwrap_err();
        assert_eq!(err, QRError::PayloadTooLarge);
    }

    #[test]
    fn test_builder_forced_version_too_small() {
        use crate::common::error::QRError;
        let err = QRBuilder::new(b"far too long for a version 1 symbol")
            .version(Version(1))
            .ec_level(ECLevel::M)
            .build()
            .unwrap_err();
        assert_eq!(err, QRError::PayloadTooLarge);
    }

    #[test]
    fn test_overlay_defaults_to_high_level() {
        let qr = QRBuilder::new(b"logo").overlay_scale(0.4).build().unwrap();
        assert_eq!(qr.ec_level(), ECLevel::H);

        let qr = QRBuilder::new(b"logo").build().unwrap();
        assert_eq!(qr.ec_level(), ECLevel::M);

        let qr =
            QRBuilder::new(b"logo").ec_level(ECLevel::M).overlay_scale(0.4).build().unwrap();
        assert_eq!(qr.ec_level(), ECLevel::M);
    }

    #[test]
    fn test_overlay_scale_out_of_range() {
        use crate::common::error::QRError;
        for scale in [-0.1, 1.1, f64::NAN] {
            let err = QRBuilder::new(b"logo").overlay_scale(scale).build().unwrap_err();
            assert_eq!(err, QRError::InvalidParameter, "Scale {scale}");
        }
    }
}
