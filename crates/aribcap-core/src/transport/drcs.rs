//! DRCS (downloadable glyph) data units

use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

/// Address of a DRCS glyph: set 0 is the two-byte set, 1..=15 one-byte sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrcsRef {
    pub set: u8,
    pub code: u16,
}

impl DrcsRef {
    /// Glyph in one of the one-byte sets DRCS-1..DRCS-15
    pub fn single(set: u8, code: u8) -> Self {
        Self {
            set,
            code: u16::from(code & 0x7F),
        }
    }

    /// Glyph in the two-byte set DRCS-0
    pub fn double(first: u8, second: u8) -> Self {
        Self {
            set: 0,
            code: (u16::from(first & 0x7F) << 8) | u16::from(second & 0x7F),
        }
    }
}

impl std::fmt::Display for DrcsRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DRCS-{}/{:04X}", self.set, self.code)
    }
}

/// Uncompressed glyph bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrcsPattern {
    /// Gradation depth minus two
    pub depth: u8,
    pub width: u8,
    pub height: u8,
    /// Row-major, MSB-first packed pixels
    pub data: Bytes,
}

impl DrcsPattern {
    pub fn bits_per_pixel(&self) -> u32 {
        bits_per_pixel(self.depth)
    }

    /// Gradation level of the pixel at `(x, y)`
    pub fn pixel(&self, x: u8, y: u8) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.bits_per_pixel() as usize;
        let bit = (usize::from(y) * usize::from(self.width) + usize::from(x)) * bpp;
        let mut value = 0u8;
        for i in 0..bpp {
            let byte = *self.data.get((bit + i) / 8)?;
            let set = (byte >> (7 - (bit + i) % 8)) & 1;
            value = (value << 1) | set;
        }
        Some(value)
    }
}

fn bits_per_pixel(depth: u8) -> u32 {
    let levels = u32::from(depth) + 2;
    32 - (levels - 1).leading_zeros()
}

/// Glyphs defined by the DRCS units of one caption statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrcsTable {
    patterns: HashMap<DrcsRef, DrcsPattern>,
}

impl DrcsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, drcs: &DrcsRef) -> Option<&DrcsPattern> {
        self.patterns.get(drcs)
    }

    pub fn insert(&mut self, drcs: DrcsRef, pattern: DrcsPattern) {
        self.patterns.insert(drcs, pattern);
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Parse a DRCS data unit into the table
    ///
    /// `two_byte` selects DRCS-0 addressing (data unit parameter 0x31).
    /// Compressed glyphs are skipped; a truncated unit keeps the glyphs read
    /// before the truncation and returns false.
    pub fn load(&mut self, data: &Bytes, two_byte: bool) -> bool {
        let Some((&number_of_code, mut rest)) = data.split_first() else {
            debug!("Empty DRCS unit");
            return false;
        };

        for _ in 0..number_of_code {
            let [c1, c2, number_of_font, ref tail @ ..] = *rest else {
                debug!("Truncated DRCS character code");
                return false;
            };
            rest = tail;

            let drcs = if two_byte {
                DrcsRef::double(c1, c2)
            } else if (0x41..=0x4F).contains(&c1) {
                DrcsRef::single(c1 - 0x40, c2)
            } else {
                debug!(set = c1, "Invalid one-byte DRCS set");
                return false;
            };

            for _ in 0..number_of_font {
                let [header, ref tail @ ..] = *rest else {
                    debug!("Truncated DRCS font header");
                    return false;
                };
                rest = tail;

                match header & 0x0F {
                    mode @ (0b0000 | 0b0001) => {
                        let [depth, width, height, ref tail @ ..] = *rest else {
                            debug!("Truncated DRCS pattern header");
                            return false;
                        };
                        let bits = u32::from(width) * u32::from(height) * bits_per_pixel(depth);
                        let len = bits.div_ceil(8) as usize;
                        if tail.len() < len {
                            debug!(drcs = %drcs, len, "Truncated DRCS pattern");
                            return false;
                        }
                        let offset = data.len() - tail.len();
                        rest = &tail[len..];

                        // only the first font of a code is kept
                        if self.patterns.contains_key(&drcs) {
                            continue;
                        }
                        let depth = if mode == 0b0000 { 0 } else { depth };
                        self.insert(
                            drcs,
                            DrcsPattern {
                                depth,
                                width,
                                height,
                                data: data.slice(offset..offset + len),
                            },
                        );
                    }
                    _ => {
                        let [_region_x, _region_y, l1, l2, ref tail @ ..] = *rest else {
                            debug!("Truncated compressed DRCS pattern");
                            return false;
                        };
                        let len = usize::from(u16::from_be_bytes([l1, l2]));
                        if tail.len() < len {
                            return false;
                        }
                        rest = &tail[len..];
                    }
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_pixel() {
        assert_eq!(bits_per_pixel(0), 1);
        assert_eq!(bits_per_pixel(1), 2);
        assert_eq!(bits_per_pixel(2), 2);
        assert_eq!(bits_per_pixel(3), 3);
    }

    #[test]
    fn test_load_one_byte_twotone() {
        // one code in DRCS-1 at 0x21, one 8x2 two-tone font
        let data = Bytes::from_static(&[
            0x01, 0x41, 0x21, 0x01, 0x00, 0x00, 0x08, 0x02, 0b1000_0001, 0xFF,
        ]);
        let mut table = DrcsTable::new();
        assert!(table.load(&data, false));

        let pattern = table.get(&DrcsRef::single(1, 0x21)).unwrap();
        assert_eq!((pattern.width, pattern.height), (8, 2));
        assert_eq!(pattern.pixel(0, 0), Some(1));
        assert_eq!(pattern.pixel(1, 0), Some(0));
        assert_eq!(pattern.pixel(7, 1), Some(1));
        assert_eq!(pattern.pixel(8, 0), None);
    }

    #[test]
    fn test_load_two_byte_multitone() {
        // DRCS-0 code 0x2121, depth 2 => 2 bits per pixel, 2x2 glyph
        let data = Bytes::from_static(&[
            0x01, 0x21, 0x21, 0x01, 0x01, 0x02, 0x02, 0x02, 0b1110_0100,
        ]);
        let mut table = DrcsTable::new();
        assert!(table.load(&data, true));

        let pattern = table.get(&DrcsRef::double(0x21, 0x21)).unwrap();
        assert_eq!(pattern.pixel(0, 0), Some(3));
        assert_eq!(pattern.pixel(1, 0), Some(2));
        assert_eq!(pattern.pixel(0, 1), Some(1));
        assert_eq!(pattern.pixel(1, 1), Some(0));
    }

    #[test]
    fn test_truncated_pattern_keeps_previous_codes() {
        let data = Bytes::from_static(&[
            0x02, 0x41, 0x21, 0x01, 0x00, 0x00, 0x08, 0x01, 0xFF, // complete
            0x41, 0x22, 0x01, 0x00, 0x00, 0x08, 0x08, 0xFF, // 8 bytes claimed, 1 present
        ]);
        let mut table = DrcsTable::new();
        assert!(!table.load(&data, false));
        assert_eq!(table.len(), 1);
    }
}
