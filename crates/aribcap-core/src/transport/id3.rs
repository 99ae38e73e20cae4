//! ID3v2 timed-metadata extraction
//!
//! HLS streams commonly carry ARIB captions as ID3v2 tags, either as a
//! `PRIV` frame whose owner names the decoder or as a `TXXX` frame whose
//! description names the decoder and whose text is the base64 of the PES
//! data packet. Several tags may sit back to back in one buffer.
//!
//! Extraction is best-effort: any size field that points past the end of
//! its container stops the walk, and everything collected so far is kept.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use nom::bytes::complete::{tag, take};
use nom::number::complete::{be_u16, be_u8};
use nom::{IResult, Parser};
use tracing::{debug, trace};

use crate::types::RawSegment;

const HEADER_LEN: usize = 10;
const FRAME_HEADER_LEN: usize = 10;

const ENCODING_LATIN1: u8 = 0x00;
const ENCODING_UTF8: u8 = 0x03;

/// Decode a 4-byte synchsafe integer (7 significant bits per byte)
pub fn read_synchsafe(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

/// Encode a 28-bit value as a synchsafe integer
pub fn write_synchsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

fn synchsafe(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, raw) = take(4usize).parse(input)?;
    Ok((input, read_synchsafe([raw[0], raw[1], raw[2], raw[3]])))
}

/// `"ID3"`, version, flags, synchsafe tag size
fn tag_header(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, _) = tag(&b"ID3"[..]).parse(input)?;
    let (input, _version) = be_u16(input)?;
    let (input, _flags) = be_u8(input)?;
    synchsafe(input)
}

/// Frame id, synchsafe frame size, flags
fn frame_header(input: &[u8]) -> IResult<&[u8], ([u8; 4], u32)> {
    let (input, id) = take(4usize).parse(input)?;
    let (input, size) = synchsafe(input)?;
    let (input, _flags) = be_u16(input)?;
    Ok((input, ([id[0], id[1], id[2], id[3]], size)))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Split at the first NUL, dropping the terminator
fn split_nul(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let end = bytes.iter().position(|&b| b == 0)?;
    Some((&bytes[..end], &bytes[end + 1..]))
}

/// Extracts caption payloads addressed to one owner from ID3v2 tags
#[derive(Debug, Clone)]
pub struct Id3Extractor {
    owner: String,
}

impl Id3Extractor {
    /// Create an extractor accepting frames owned by `owner`
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    /// Walk every tag in `data` and collect the caption payloads in order
    pub fn extract(&self, pts: f64, data: &Bytes) -> Vec<RawSegment> {
        let mut segments = Vec::new();
        let mut begin = 0usize;

        while begin < data.len() {
            let Ok((_, tag_size)) = tag_header(&data[begin..]) else {
                debug!(offset = begin, "No ID3v2 header, stopping");
                break;
            };

            let frames_start = begin + HEADER_LEN;
            let tag_end = frames_start + tag_size as usize;
            if tag_end > data.len() {
                debug!(
                    offset = begin,
                    tag_size,
                    available = data.len() - frames_start,
                    "Truncated ID3v2 tag"
                );
                break;
            }

            self.walk_frames(pts, data, frames_start, tag_end, &mut segments);
            begin = tag_end;

            // ID3v2.4 footer mirrors the header with a reversed magic
            if data.len() - begin >= HEADER_LEN && &data[begin..begin + 3] == b"3DI" {
                begin += HEADER_LEN;
            }
        }

        segments
    }

    fn walk_frames(
        &self,
        pts: f64,
        data: &Bytes,
        start: usize,
        end: usize,
        segments: &mut Vec<RawSegment>,
    ) {
        let mut frame = start;

        while end - frame >= FRAME_HEADER_LEN {
            let Ok((_, (id, size))) = frame_header(&data[frame..end]) else {
                break;
            };
            if id[0] == 0 {
                // padding
                break;
            }

            let payload_start = frame + FRAME_HEADER_LEN;
            let payload_end = payload_start + size as usize;
            if payload_end > end {
                debug!(frame = %latin1(&id), size, "Truncated ID3v2 frame");
                break;
            }

            let payload = data.slice(payload_start..payload_end);
            let extracted = match &id {
                b"PRIV" => self.priv_payload(&payload),
                b"TXXX" => self.txxx_payload(&payload),
                _ => None,
            };
            if let Some(bytes) = extracted {
                segments.push(RawSegment::new(pts, bytes));
            }

            frame = payload_end;
        }
    }

    /// `owner NUL data`
    fn priv_payload(&self, payload: &Bytes) -> Option<Bytes> {
        let Some((owner, _)) = split_nul(payload) else {
            debug!("PRIV frame without owner terminator");
            return None;
        };
        if latin1(owner) != self.owner {
            trace!(owner = %latin1(owner), "Skipping foreign PRIV frame");
            return None;
        }
        Some(payload.slice(owner.len() + 1..))
    }

    /// `encoding description NUL text [NUL]`
    fn txxx_payload(&self, payload: &Bytes) -> Option<Bytes> {
        let (&encoding, rest) = payload.split_first()?;
        let (description, rest) = split_nul(rest)?;
        let text = split_nul(rest).map_or(rest, |(text, _)| text);

        let (description, text) = match encoding {
            ENCODING_LATIN1 => (latin1(description), latin1(text)),
            ENCODING_UTF8 => (
                std::str::from_utf8(description).ok()?.to_string(),
                std::str::from_utf8(text).ok()?.to_string(),
            ),
            other => {
                trace!(encoding = other, "Unsupported TXXX text encoding");
                return None;
            }
        };

        if description != self.owner {
            return None;
        }

        match BASE64.decode(text.trim()) {
            Ok(decoded) => Some(Bytes::from(decoded)),
            Err(e) => {
                debug!(error = %e, "TXXX caption payload is not valid base64");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn frame(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&write_synchsafe(payload.len() as u32));
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(payload);
        out
    }

    pub(crate) fn id3_tag(frames: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = frames.concat();
        let mut out = b"ID3".to_vec();
        out.extend_from_slice(&[4, 0, 0]);
        out.extend_from_slice(&write_synchsafe(body.len() as u32));
        out.extend_from_slice(&body);
        out
    }

    pub(crate) fn priv_frame(owner: &str, data: &[u8]) -> Vec<u8> {
        let mut payload = owner.as_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(data);
        frame(b"PRIV", &payload)
    }

    fn txxx_frame(encoding: u8, description: &str, text: &str) -> Vec<u8> {
        let mut payload = vec![encoding];
        payload.extend_from_slice(description.as_bytes());
        payload.push(0);
        payload.extend_from_slice(text.as_bytes());
        frame(b"TXXX", &payload)
    }

    #[test]
    fn test_synchsafe_decoding() {
        assert_eq!(read_synchsafe([0x00, 0x00, 0x02, 0x01]), 257);
        assert_eq!(read_synchsafe([0x7F, 0x7F, 0x7F, 0x7F]), 0x0FFF_FFFF);
        // high bits are ignored
        assert_eq!(read_synchsafe([0x80, 0x80, 0x80, 0x81]), 1);
    }

    #[test]
    fn test_synchsafe_roundtrip() {
        for value in [0u32, 1, 127, 128, 16_383, 16_384, 2_097_151, 0x0FFF_FFFF] {
            assert_eq!(read_synchsafe(write_synchsafe(value)), value);
        }
        for bytes in [[0x01, 0x02, 0x03, 0x04], [0x7F, 0x00, 0x7F, 0x00]] {
            assert_eq!(write_synchsafe(read_synchsafe(bytes)), bytes);
        }
    }

    #[test]
    fn test_priv_and_txxx_in_order() {
        let data = Bytes::from(id3_tag(&[
            priv_frame("aribb24.js", &[0x80, 0xFF]),
            frame(b"TIT2", b"\x03title"),
            txxx_frame(ENCODING_UTF8, "aribb24.js", "gP8B"),
            priv_frame("com.apple.streaming", &[1, 2, 3]),
            txxx_frame(ENCODING_LATIN1, "aribb24.js", "AQID"),
        ]));

        let segments = Id3Extractor::new("aribb24.js").extract(4.0, &data);
        assert_eq!(segments.len(), 3);
        assert_eq!(&segments[0].data[..], &[0x80, 0xFF]);
        assert_eq!(&segments[1].data[..], &[0x80, 0xFF, 0x01]);
        assert_eq!(&segments[2].data[..], &[1, 2, 3]);
        assert!(segments.iter().all(|s| s.pts == 4.0));
    }

    #[test]
    fn test_back_to_back_tags_with_footer() {
        let mut data = id3_tag(&[priv_frame("aribb24.js", b"one")]);
        data.extend_from_slice(b"3DI\x04\x00\x00\x00\x00\x00\x00");
        data.extend_from_slice(&id3_tag(&[priv_frame("aribb24.js", b"two")]));

        let segments = Id3Extractor::new("aribb24.js").extract(0.0, &Bytes::from(data));
        assert_eq!(segments.len(), 2);
        assert_eq!(&segments[1].data[..], b"two");
    }

    #[test]
    fn test_truncated_tag_keeps_earlier_segments() {
        let mut data = id3_tag(&[priv_frame("aribb24.js", b"ok")]);
        let mut second = id3_tag(&[priv_frame("aribb24.js", b"lost")]);
        second.truncate(second.len() - 2);
        data.extend_from_slice(&second);

        let segments = Id3Extractor::new("aribb24.js").extract(0.0, &Bytes::from(data));
        assert_eq!(segments.len(), 1);
        assert_eq!(&segments[0].data[..], b"ok");
    }

    #[test]
    fn test_frame_size_past_tag_end() {
        let mut bad = frame(b"PRIV", b"aribb24.js\0payload");
        // claim far more bytes than the frame holds
        bad[4..8].copy_from_slice(&write_synchsafe(10_000));
        let data = Bytes::from(id3_tag(&[priv_frame("aribb24.js", b"first"), bad]));

        let segments = Id3Extractor::new("aribb24.js").extract(0.0, &data);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_every_prefix_is_safe() {
        let data = id3_tag(&[
            priv_frame("aribb24.js", &[1, 2, 3, 4]),
            txxx_frame(ENCODING_UTF8, "aribb24.js", "AQID"),
        ]);
        let extractor = Id3Extractor::new("aribb24.js");
        for len in 0..data.len() {
            let segments = extractor.extract(0.0, &Bytes::copy_from_slice(&data[..len]));
            assert!(segments.is_empty());
        }
        assert_eq!(extractor.extract(0.0, &Bytes::from(data)).len(), 2);
    }

    #[test]
    fn test_invalid_base64_is_skipped() {
        let data = Bytes::from(id3_tag(&[txxx_frame(ENCODING_UTF8, "aribb24.js", "@@@")]));
        assert!(Id3Extractor::new("aribb24.js").extract(0.0, &data).is_empty());
    }
}
