//! Transport extraction: recovering caption payloads from their envelopes
//!
//! - ID3v2 timed metadata (`PRIV` / `TXXX` frames)
//! - Synchronized PES data packets, data groups and data units

#[cfg(feature = "id3")]
pub mod id3;
pub mod drcs;
pub mod pes;

#[cfg(feature = "id3")]
pub use id3::{read_synchsafe, write_synchsafe, Id3Extractor};
pub use drcs::{DrcsPattern, DrcsRef, DrcsTable};
pub use pes::{
    parse_pes, CaptionData, CaptionLanguage, CaptionManagement, CaptionStatement, DataGroup,
    DataUnit, PesDataPacket, TimeControlMode,
};
