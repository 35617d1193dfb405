use image::{GrayImage, Luma};
use itertools::iproduct;
use std::ops::Deref;

use crate::common::{
    iter::EncRegionIter,
    metadata::{Color, ECLevel, Version},
    version_db::{
        FORMAT_INFO_BIT_LEN, FORMAT_INFO_COORDS_MAIN, FORMAT_INFO_COORDS_SIDE, FORMAT_INFO_H,
        FORMAT_INFO_M, VERSION_INFO_BIT_LEN, VERSION_INFO_COORDS_BL, VERSION_INFO_COORDS_TR,
    },
};

// Module
//------------------------------------------------------------------------------

// Tags preserve provenance so that data placement can skip function
// patterns; rendering only looks at the color, with unset cells light
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Module {
    Unset,
    Finder(Color),
    Timing(Color),
    Alignment(Color),
    Format(Color),
    Version(Color),
    Data(Color),
}

impl Deref for Module {
    type Target = Color;
    fn deref(&self) -> &Self::Target {
        match self {
            Module::Unset => &Color::Light,
            Module::Finder(c)
            | Module::Timing(c)
            | Module::Alignment(c)
            | Module::Format(c)
            | Module::Version(c)
            | Module::Data(c) => c,
        }
    }
}

// QR type for builder
//------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct QR {
    version: Version,
    width: usize,
    ec_level: ECLevel,
    overlay_scale: f64,
    grid: Vec<Module>,
}

impl QR {
    pub(crate) fn new(version: Version, ec_level: ECLevel, overlay_scale: f64) -> Self {
        let width = version.width();
        Self {
            version,
            width,
            ec_level,
            overlay_scale,
            grid: vec![Module::Unset; width * width],
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn ec_level(&self) -> ECLevel {
        self.ec_level
    }

    pub fn metadata(&self) -> String {
        match self.overlay_size() {
            Some(side) => format!(
                "{{ Version: {}, Ec level: {:?}, Overlay: {side}x{side} }}",
                *self.version, self.ec_level
            ),
            None => {
                format!("{{ Version: {}, Ec level: {:?} }}", *self.version, self.ec_level)
            }
        }
    }

    pub fn count_dark_modules(&self) -> usize {
        self.grid.iter().filter(|&m| matches!(**m, Color::Dark)).count()
    }

    fn coord_to_index(&self, r: i16, c: i16) -> usize {
        let w = self.width as i16;
        debug_assert!(-w <= r && r < w, "row out of bounds: {r}");
        debug_assert!(-w <= c && c < w, "column out of bounds: {c}");

        let r = if r < 0 { r + w } else { r };
        let c = if c < 0 { c + w } else { c };
        (r * w + c) as _
    }

    pub fn get(&self, r: i16, c: i16) -> Module {
        self.grid[self.coord_to_index(r, c)]
    }

    fn set(&mut self, r: i16, c: i16, module: Module) {
        let index = self.coord_to_index(r, c);
        self.grid[index] = module;
    }

    pub fn dark(&self, r: i16, c: i16) -> bool {
        matches!(*self.get(r, c), Color::Dark)
    }

    #[cfg(test)]
    pub(crate) fn to_debug_str(&self) -> String {
        let w = self.width as i16;
        let mut res = String::with_capacity((w * (w + 1)) as usize);
        res.push('\n');
        for i in 0..w {
            for j in 0..w {
                let c = match self.get(i, j) {
                    Module::Unset => '.',
                    Module::Finder(Color::Dark) => 'f',
                    Module::Finder(Color::Light) => 'F',
                    Module::Timing(Color::Dark) => 't',
                    Module::Timing(Color::Light) => 'T',
                    Module::Alignment(Color::Dark) => 'a',
                    Module::Alignment(Color::Light) => 'A',
                    Module::Format(Color::Dark) => 'm',
                    Module::Format(Color::Light) => 'M',
                    Module::Version(Color::Dark) => 'v',
                    Module::Version(Color::Light) => 'V',
                    Module::Data(Color::Dark) => 'd',
                    Module::Data(Color::Light) => 'D',
                };
                res.push(c);
            }
            res.push('\n');
        }
        res
    }
}

#[cfg(test)]
mod qr_util_tests {
    use crate::builder::{Module, QR};
    use crate::common::metadata::{Color, ECLevel, Version};

    #[test]
    fn test_index_wrap() {
        let mut qr = QR::new(Version(1), ECLevel::M, 0.0);
        let w = qr.width as i16;
        qr.set(-1, -1, Module::Finder(Color::Dark));
        assert_eq!(qr.get(w - 1, w - 1), Module::Finder(Color::Dark));
        qr.set(0, 0, Module::Finder(Color::Dark));
        assert_eq!(qr.get(-w, -w), Module::Finder(Color::Dark));
    }

    #[test]
    #[should_panic]
    fn test_row_out_of_bound() {
        let qr = QR::new(Version(1), ECLevel::M, 0.0);
        let w = qr.width as i16;
        qr.get(w, 0);
    }

    #[test]
    #[should_panic]
    fn test_col_index_overwrap() {
        let qr = QR::new(Version(1), ECLevel::M, 0.0);
        let w = qr.width as i16;
        qr.get(0, -(w + 1));
    }
}

// Finder patterns
//------------------------------------------------------------------------------

impl QR {
    fn draw_finder_patterns(&mut self) {
        self.draw_finder_pattern_at(3, 3);
        self.draw_finder_pattern_at(3, -4);
        self.draw_finder_pattern_at(-4, 3);
    }

    // Draws the 7x7 concentric square together with the light separator on
    // the interior facing edges
    fn draw_finder_pattern_at(&mut self, r: i16, c: i16) {
        let (dr_left, dr_right) = if r > 0 { (-3, 4) } else { (-4, 3) };
        let (dc_top, dc_bottom) = if c > 0 { (-3, 4) } else { (-4, 3) };
        for i in dr_left..=dr_right {
            for j in dc_top..=dc_bottom {
                self.set(
                    r + i,
                    c + j,
                    match (i, j) {
                        (4 | -4, _) | (_, 4 | -4) => Module::Finder(Color::Light),
                        (3 | -3, _) | (_, 3 | -3) => Module::Finder(Color::Dark),
                        (2 | -2, _) | (_, 2 | -2) => Module::Finder(Color::Light),
                        _ => Module::Finder(Color::Dark),
                    },
                );
            }
        }
    }
}


// Timing patterns
//------------------------------------------------------------------------------

impl QR {
    fn draw_timing_patterns(&mut self) {
        let w = self.width as i16;
        self.draw_timing_line(6, 8, 6, w - 9);
        self.draw_timing_line(8, 6, w - 9, 6);
    }

    fn draw_timing_line(&mut self, r1: i16, c1: i16, r2: i16, c2: i16) {
        debug_assert!(r1 == r2 || c1 == c2, "Line is neither vertical nor horizontal");

        if r1 == r2 {
            for j in c1..=c2 {
                let m = if j & 1 == 0 {
                    Module::Timing(Color::Dark)
                } else {
                    Module::Timing(Color::Light)
                };
                self.set(r1, j, m);
            }
        } else {
            for i in r1..=r2 {
                let m = if i & 1 == 0 {
                    Module::Timing(Color::Dark)
                } else {
                    Module::Timing(Color::Light)
                };
                self.set(i, c1, m);
            }
        }
    }
}

#[cfg(test)]
mod timing_pattern_tests {
    use crate::builder::QR;
    use crate::common::metadata::{ECLevel, Version};

    #[test]
    fn test_timing_patterns() {
        let mut qr = QR::new(Version(1), ECLevel::M, 0.0);
        qr.draw_timing_patterns();
        assert_eq!(
            qr.to_debug_str(),
            "\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n\
             ........tTtTt........\n\
             .....................\n\
             ......t..............\n\
             ......T..............\n\
             ......t..............\n\
             ......T..............\n\
             ......t..............\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n\
             .....................\n"
        );
    }
}

// Alignment patterns
//------------------------------------------------------------------------------

impl QR {
    // The coordinate table is authoritative: every listed pair is placed
    // as-is, overlaps with finders never appear in it
    fn draw_alignment_patterns(&mut self) {
        for (r, c) in self.version.alignment_coords() {
            self.draw_alignment_pattern_at(r, c);
        }
    }

    fn draw_alignment_pattern_at(&mut self, r: i16, c: i16) {
        for i in -2..=2 {
            for j in -2..=2 {
                self.set(
                    r + i,
                    c + j,
                    match (i, j) {
                        (-2 | 2, _) | (_, -2 | 2) | (0, 0) => Module::Alignment(Color::Dark),
                        _ => Module::Alignment(Color::Light),
                    },
                )
            }
        }
    }
}


// All function patterns
//------------------------------------------------------------------------------

impl QR {
    pub(crate) fn draw_all_function_patterns(&mut self) {
        self.draw_finder_patterns();
        self.draw_timing_patterns();
        self.draw_alignment_patterns();
    }
}


// Format & version info
//------------------------------------------------------------------------------

impl QR {
    fn draw_format_info(&mut self) {
        // Pre-masked constants, chosen consistently with the fixed data mask
        let format_info = match self.ec_level {
            ECLevel::M => FORMAT_INFO_M,
            ECLevel::H => FORMAT_INFO_H,
        };
        self.draw_number(
            format_info,
            FORMAT_INFO_BIT_LEN,
            Module::Format(Color::Light),
            Module::Format(Color::Dark),
            &FORMAT_INFO_COORDS_MAIN,
        );
        self.draw_number(
            format_info,
            FORMAT_INFO_BIT_LEN,
            Module::Format(Color::Light),
            Module::Format(Color::Dark),
            &FORMAT_INFO_COORDS_SIDE,
        );
        // Dark module
        self.set(-8, 8, Module::Format(Color::Dark));
    }

    fn draw_version_info(&mut self) {
        if *self.version < 7 {
            return;
        }
        let version_info = self.version.info();
        self.draw_number(
            version_info,
            VERSION_INFO_BIT_LEN,
            Module::Version(Color::Light),
            Module::Version(Color::Dark),
            &VERSION_INFO_COORDS_BL,
        );
        self.draw_number(
            version_info,
            VERSION_INFO_BIT_LEN,
            Module::Version(Color::Light),
            Module::Version(Color::Dark),
            &VERSION_INFO_COORDS_TR,
        );
    }

    fn draw_number(
        &mut self,
        number: u32,
        bit_len: usize,
        off_color: Module,
        on_color: Module,
        coords: &[(i16, i16)],
    ) {
        let mut mask = 1 << (bit_len - 1);
        for (r, c) in coords {
            if number & mask == 0 {
                self.set(*r, *c, off_color);
            } else {
                self.set(*r, *c, on_color);
            }
            mask >>= 1;
        }
    }
}


// Encoding region
//------------------------------------------------------------------------------

impl QR {
    pub(crate) fn draw_encoding_region(&mut self, payload: &[u8]) {
        self.draw_format_info();
        self.draw_version_info();
        self.draw_codewords(payload);

        // Cells left over once the codewords run out are the remainder bits
        // and stay light
        debug_assert!(
            self.grid.iter().filter(|&&m| m == Module::Unset).count()
                == self.version.remainder_bits(),
            "Unset modules after placement should match the remainder bits"
        );
    }

    // Serpentine placement; the fixed mask inverts bits in every third
    // column as they land
    fn draw_codewords(&mut self, codewords: &[u8]) {
        let mut coords = EncRegionIter::new(self.version);
        for &codeword in codewords {
            for i in (0..8).rev() {
                let bit = (codeword >> i) & 1 == 1;
                let cell = coords.by_ref().find(|&(r, c)| self.get(r, c) == Module::Unset);
                match cell {
                    Some((r, c)) => {
                        let bit = if c % 3 == 0 { !bit } else { bit };
                        let module =
                            Module::Data(if bit { Color::Dark } else { Color::Light });
                        self.set(r, c, module);
                    }
                    None => panic!("Codeword stream overran the encoding region"),
                }
            }
        }
    }
}

// Raster sink
//------------------------------------------------------------------------------

// Light margin required around the symbol, in modules
pub const QUIET_ZONE_WIDTH: u32 = 4;

impl QR {
    pub fn render(&self, module_size: u32) -> GrayImage {
        let qz_size = QUIET_ZONE_WIDTH * module_size;
        let qr_size = self.width as u32 * module_size;
        let total_size = qz_size + qr_size + qz_size;

        let mut canvas = GrayImage::new(total_size, total_size);
        for (i, j) in iproduct!(0..total_size, 0..total_size) {
            if i < qz_size || i >= qz_size + qr_size || j < qz_size || j >= qz_size + qr_size {
                canvas.put_pixel(j, i, Luma([255]));
                continue;
            }
            let r = ((i - qz_size) / module_size) as i16;
            let c = ((j - qz_size) / module_size) as i16;
            let pixel = self.get(r, c).select(Luma([255]), Luma([0]));
            canvas.put_pixel(j, i, pixel);
        }

        canvas
    }

    pub fn to_str(&self, module_size: usize) -> String {
        let qz_size = QUIET_ZONE_WIDTH as usize * module_size;
        let qr_size = self.width * module_size;
        let total_size = qz_size + qr_size + qz_size;

        let mut canvas = String::with_capacity(total_size * (total_size + 1));
        for i in 0..total_size {
            for j in 0..total_size {
                if i < qz_size || i >= qz_size + qr_size || j < qz_size || j >= qz_size + qr_size
                {
                    canvas.push('█');
                    continue;
                }
                let r = ((i - qz_size) / module_size) as i16;
                let c = ((j - qz_size) / module_size) as i16;
                canvas.push(self.get(r, c).select('█', ' '));
            }
            canvas.push('\n');
        }

        canvas
    }

    // Maximum odd side length in modules available to a centered overlay.
    // The symbol area less the function patterns and one timing allowance is
    // scaled by the caller's factor; None when no overlay was requested or
    // the area degenerates
    pub fn overlay_size(&self) -> Option<usize> {
        if self.overlay_scale <= 0.0 {
            return None;
        }

        let w = self.width;
        let anchors = self.version.alignment_coords().len();
        let free = (w * w - 240 - 25 * anchors - 2 * w) as f64;
        let mut side = (free * self.overlay_scale).sqrt() as usize;
        if side & 1 == 0 {
            side = side.saturating_sub(1);
        }

        if side == 0 {
            None
        } else {
            Some(side)
        }
    }
}

#[cfg(test)]
mod raster_sink_tests {
    use crate::builder::{QRBuilder, QR};
    use crate::common::metadata::{ECLevel, Version};

    #[test]
    fn test_render_dimensions_include_quiet_zone() {
        let qr = QRBuilder::new(b"quiet zone").build().unwrap();
        let img = qr.render(2);
        let expected = (qr.width() as u32 + 8) * 2;
        assert_eq!(img.dimensions(), (expected, expected));
    }

    #[test]
    fn test_render_quiet_zone_is_light() {
        let qr = QRBuilder::new(b"quiet zone").build().unwrap();
        let img = qr.render(1);
        let (w, _) = img.dimensions();
        for k in 0..w {
            for edge in [0, 3, w - 4, w - 1] {
                assert_eq!(img.get_pixel(k, edge).0, [255]);
                assert_eq!(img.get_pixel(edge, k).0, [255]);
            }
        }
    }

    #[test]
    fn test_overlay_size() {
        assert_eq!(QR::new(Version(1), ECLevel::H, 1.0).overlay_size(), Some(11));
        assert_eq!(QR::new(Version(2), ECLevel::H, 1.0).overlay_size(), Some(17));
        assert_eq!(QR::new(Version(1), ECLevel::H, 0.25).overlay_size(), Some(5));
        assert_eq!(QR::new(Version(1), ECLevel::M, 0.0).overlay_size(), None);
        assert_eq!(QR::new(Version(1), ECLevel::H, 0.001).overlay_size(), None);
    }

    #[test]
    fn test_overlay_size_is_odd() {
        for v in [1u8, 7, 14, 25, 40] {
            for scale in [0.2, 0.5, 0.8, 1.0] {
                let qr = QR::new(Version(v), ECLevel::H, scale);
                if let Some(side) = qr.overlay_size() {
                    assert_eq!(side & 1, 1, "Version {v}, scale {scale}");
                    assert!(side < qr.width());
                }
            }
        }
    }
}
