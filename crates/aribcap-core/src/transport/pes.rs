//! Synchronized PES data packets carrying ARIB caption data groups
//!
//! Layout, outermost first:
//!
//! ```text
//! [PES header]                optional, only when the buffer starts with 00 00 01
//! data_identifier             0x80 caption, 0x81 superimpose
//! private_stream_id
//! PES_data_packet_header      low nibble gives its length
//! data_group                  id/version, link numbers, size, data, CRC16
//!   caption management        TMD, OTM, languages, data units
//!   caption statement         TMD, STM, data units
//! ```
//!
//! Framing problems yield `None`. A data unit parameter outside the
//! closed set of known units is an error: it means the stream uses a
//! bitstream variant this decoder does not understand.

use bytes::Bytes;
use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::{IResult, Parser};
use tracing::debug;

use crate::{Error, Result};

const UNIT_SEPARATOR: u8 = 0x1F;

/// Presentation time control mode (TMD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeControlMode {
    Free,
    RealTime,
    OffsetTime,
    Reserved,
}

impl TimeControlMode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => TimeControlMode::Free,
            0b01 => TimeControlMode::RealTime,
            0b10 => TimeControlMode::OffsetTime,
            _ => TimeControlMode::Reserved,
        }
    }
}

/// Synchronized PES data packet
#[derive(Debug, Clone, PartialEq)]
pub struct PesDataPacket {
    pub data_identifier: u8,
    pub private_stream_id: u8,
    pub group: DataGroup,
}

/// Caption data group
#[derive(Debug, Clone, PartialEq)]
pub struct DataGroup {
    /// Data group id (6 bits)
    pub id: u8,
    pub version: u8,
    pub link_number: u8,
    pub last_link_number: u8,
    pub data: Bytes,
}

impl DataGroup {
    /// Caption management data groups are ids 0x00 and 0x20 (group A/B)
    pub fn is_management(&self) -> bool {
        self.id & 0x0F == 0
    }

    /// 1-based caption language of a statement data group
    pub fn language_tag(&self) -> u8 {
        self.id & 0x0F
    }

    /// Parse the data group body as caption management or statement
    pub fn caption(&self) -> Result<Option<CaptionData>> {
        if self.is_management() {
            Ok(CaptionManagement::parse(&self.data)?.map(CaptionData::Management))
        } else {
            Ok(CaptionStatement::parse(&self.data)?.map(CaptionData::Statement))
        }
    }
}

/// Body of a caption data group
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionData {
    Management(CaptionManagement),
    Statement(CaptionStatement),
}

/// One language entry of caption management data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLanguage {
    /// 0-based language tag
    pub tag: u8,
    /// Display mode (DMF)
    pub display_mode: u8,
    /// Display condition, present for conditional display modes
    pub display_condition: Option<u8>,
    /// ISO 639-2 language code
    pub iso_639: String,
    /// Display format (plane size and direction)
    pub format: u8,
    /// Character coding (0 = 8-bit code)
    pub tcs: u8,
    pub rollup: bool,
}

/// Caption management data
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionManagement {
    pub tmd: TimeControlMode,
    /// Offset time in milliseconds
    pub otm: Option<u32>,
    pub languages: Vec<CaptionLanguage>,
    pub units: Vec<DataUnit>,
}

/// Caption statement data
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStatement {
    pub tmd: TimeControlMode,
    /// Presentation start time in milliseconds
    pub stm: Option<u32>,
    pub units: Vec<DataUnit>,
}

/// Data unit, closed set of ARIB unit parameters
#[derive(Debug, Clone, PartialEq)]
pub enum DataUnit {
    /// 0x20
    Statement(Bytes),
    /// 0x28
    Geometric(Bytes),
    /// 0x2C
    SynthesizedSound(Bytes),
    /// 0x30 (one-byte) / 0x31 (two-byte)
    Drcs { two_byte: bool, data: Bytes },
    /// 0x34
    Colormap(Bytes),
    /// 0x35
    Bitmap(Bytes),
}

/// Read a 5-byte BCD `HH MM SS mmm` time as milliseconds
pub fn read_bcd_millis(bytes: &[u8; 5]) -> u32 {
    let digit = |nibble: u8| u32::from(nibble.min(9));
    let pair = |b: u8| digit(b >> 4) * 10 + digit(b & 0x0F);
    let hours = pair(bytes[0]);
    let minutes = pair(bytes[1]);
    let seconds = pair(bytes[2]);
    let millis = digit(bytes[3] >> 4) * 100 + digit(bytes[3] & 0x0F) * 10 + digit(bytes[4] >> 4);
    ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis
}

fn bcd_time(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, raw) = take(5usize).parse(input)?;
    Ok((input, read_bcd_millis(&[raw[0], raw[1], raw[2], raw[3], raw[4]])))
}

/// Strip a leading MPEG PES header, if any
fn strip_pes_header(data: &[u8]) -> Option<usize> {
    if data.len() < 3 || data[..3] != [0x00u8, 0x00, 0x01] {
        return Some(0);
    }
    let stream_id = *data.get(3)?;
    // private_stream_2 has no optional header
    if stream_id == 0xBF {
        return (data.len() >= 6).then_some(6);
    }
    let header_data_length = usize::from(*data.get(8)?);
    let offset = 9 + header_data_length;
    (offset <= data.len()).then_some(offset)
}

fn data_group_header(input: &[u8]) -> IResult<&[u8], (u8, u8, u8, u16)> {
    let (input, id_version) = be_u8(input)?;
    let (input, link_number) = be_u8(input)?;
    let (input, last_link_number) = be_u8(input)?;
    let (input, size) = be_u16(input)?;
    Ok((input, (id_version, link_number, last_link_number, size)))
}

/// Parse the PES envelope down to its data group
pub fn parse_pes(data: &Bytes) -> Option<PesDataPacket> {
    let Some(start) = strip_pes_header(data) else {
        debug!(len = data.len(), "Truncated PES header");
        return None;
    };
    let body = &data[start..];

    let [data_identifier, private_stream_id, header, ref rest @ ..] = *body else {
        debug!(len = body.len(), "Truncated PES data packet header");
        return None;
    };
    let header_length = usize::from(header & 0x0F);
    if rest.len() < header_length {
        debug!(header_length, "Truncated PES data packet header");
        return None;
    }
    let group_bytes = &rest[header_length..];

    let Ok((remaining, (id_version, link_number, last_link_number, size))) =
        data_group_header(group_bytes)
    else {
        debug!("Truncated data group header");
        return None;
    };
    let size = usize::from(size);
    if remaining.len() < size {
        debug!(size, available = remaining.len(), "Truncated data group");
        return None;
    }
    let offset = data.len() - remaining.len();

    Some(PesDataPacket {
        data_identifier,
        private_stream_id,
        group: DataGroup {
            id: id_version >> 2,
            version: id_version & 0b11,
            link_number,
            last_link_number,
            data: data.slice(offset..offset + size),
        },
    })
}

/// Parse the data unit loop that ends both caption data forms
fn parse_data_units(data: &Bytes, offset: usize) -> Result<Option<Vec<DataUnit>>> {
    let Ok((rest, loop_length)) = be_u24::<_, nom::error::Error<&[u8]>>(&data[offset..]) else {
        debug!("Truncated data_unit_loop_length");
        return Ok(None);
    };
    let loop_length = loop_length as usize;
    if rest.len() < loop_length {
        debug!(loop_length, available = rest.len(), "Truncated data unit loop");
        return Ok(None);
    }

    let mut cursor = data.len() - rest.len();
    let end = cursor + loop_length;
    let mut units = Vec::new();

    while cursor < end {
        let Ok((body, (separator, parameter, size))) = unit_header(&data[cursor..end]) else {
            debug!(offset = cursor, "Truncated data unit header");
            return Ok(None);
        };
        if separator != UNIT_SEPARATOR {
            debug!(separator, "Invalid data unit separator");
            return Ok(None);
        }
        let size = size as usize;
        if body.len() < size {
            debug!(size, available = body.len(), "Truncated data unit");
            return Ok(None);
        }
        let start = end - body.len();
        let payload = data.slice(start..start + size);
        cursor = start + size;

        let unit = match parameter {
            0x20 => DataUnit::Statement(payload),
            0x28 => DataUnit::Geometric(payload),
            0x2C => DataUnit::SynthesizedSound(payload),
            0x30 => DataUnit::Drcs {
                two_byte: false,
                data: payload,
            },
            0x31 => DataUnit::Drcs {
                two_byte: true,
                data: payload,
            },
            0x34 => DataUnit::Colormap(payload),
            0x35 => DataUnit::Bitmap(payload),
            parameter => return Err(Error::UnknownDataUnit { parameter }),
        };
        units.push(unit);
    }

    Ok(Some(units))
}

fn unit_header(input: &[u8]) -> IResult<&[u8], (u8, u8, u32)> {
    let (input, separator) = be_u8(input)?;
    let (input, parameter) = be_u8(input)?;
    let (input, size) = be_u24(input)?;
    Ok((input, (separator, parameter, size)))
}

impl CaptionStatement {
    pub fn parse(data: &Bytes) -> Result<Option<Self>> {
        let Some((&flags, _)) = data.split_first() else {
            return Ok(None);
        };
        let tmd = TimeControlMode::from_bits(flags >> 6);
        let mut offset = 1;

        let stm = if matches!(tmd, TimeControlMode::RealTime | TimeControlMode::OffsetTime) {
            let Ok((_, stm)) = bcd_time(&data[offset..]) else {
                debug!("Truncated STM");
                return Ok(None);
            };
            offset += 5;
            Some(stm)
        } else {
            None
        };

        Ok(parse_data_units(data, offset)?.map(|units| CaptionStatement { tmd, stm, units }))
    }
}

impl CaptionManagement {
    pub fn parse(data: &Bytes) -> Result<Option<Self>> {
        let Some((&flags, _)) = data.split_first() else {
            return Ok(None);
        };
        let tmd = TimeControlMode::from_bits(flags >> 6);
        let mut input = &data[1..];

        let otm = if tmd == TimeControlMode::OffsetTime {
            let Ok((rest, otm)) = bcd_time(input) else {
                debug!("Truncated OTM");
                return Ok(None);
            };
            input = rest;
            Some(otm)
        } else {
            None
        };

        let Some((&num_languages, rest)) = input.split_first() else {
            debug!("Truncated num_languages");
            return Ok(None);
        };
        input = rest;

        let mut languages = Vec::with_capacity(usize::from(num_languages));
        for _ in 0..num_languages {
            let Some((&head, rest)) = input.split_first() else {
                debug!("Truncated caption language");
                return Ok(None);
            };
            input = rest;

            let display_mode = head & 0x0F;
            // receive mode "conditional" with a non-conditional playback mode
            let display_condition = if matches!(display_mode, 0b1100..=0b1110) {
                let Some((&dc, rest)) = input.split_first() else {
                    return Ok(None);
                };
                input = rest;
                Some(dc)
            } else {
                None
            };

            let [l1, l2, l3, format, ref rest @ ..] = *input else {
                debug!("Truncated caption language code");
                return Ok(None);
            };
            input = rest;

            languages.push(CaptionLanguage {
                tag: head >> 5,
                display_mode,
                display_condition,
                iso_639: [l1, l2, l3].iter().map(|&b| char::from(b)).collect(),
                format: format >> 4,
                tcs: (format >> 2) & 0b11,
                rollup: format & 0b11 == 0b01,
            });
        }

        let offset = data.len() - input.len();
        Ok(parse_data_units(data, offset)?.map(|units| CaptionManagement {
            tmd,
            otm,
            languages,
            units,
        }))
    }

    /// Language code of a 1-based caption language tag
    pub fn language(&self, language_tag: u8) -> Option<&str> {
        self.languages
            .iter()
            .find(|l| l.tag + 1 == language_tag)
            .map(|l| l.iso_639.as_str())
    }
}
