//! The Hyper-V-style Preconnection PDU, sent ahead of the TPKT/X.224 exchange
//! to let the listening process route the connection to the right RDP source.

use rdp_nego_core::{
    invalid_field_err_with_source, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use crate::Pdu;

/// Preconnection PDU version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcbVersion(pub u32);

impl PcbVersion {
    pub const V1: Self = Self(0x1);
    pub const V2: Self = Self(0x2);
}

/// RDP preconnection PDU
///
/// The RDP_PRECONNECTION_PDU_V1 is used by the client to let the listening process
/// know which RDP source the connection is intended for.
///
/// The RDP_PRECONNECTION_PDU_V2 extends the RDP_PRECONNECTION_PDU_V1 packet by
/// adding a variable-size Unicode character string. The receiver of this PDU can
/// use this string and the Id field of the RDP_PRECONNECTION_PDU_V1 packet to
/// determine the RDP source. This string is opaque to the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreconnectionBlob {
    /// Preconnection PDU version. Always emitted as V2 by this codec.
    pub version: PcbVersion,
    /// This field is used to uniquely identify the RDP source. Although the Id can be
    /// as simple as a process ID, it is often client-specific or server-specific and
    /// can be obfuscated.
    pub id: u32,
    /// V2 PCB string.
    pub v2_payload: Option<String>,
}

impl PreconnectionBlob {
    pub const FIXED_PART_SIZE: usize = 16;
}

impl Pdu for PreconnectionBlob {
    const NAME: &'static str = "PreconnectionBlob";
}

impl<'de> Decode<'de> for PreconnectionBlob {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let pcb_size: usize = cast_length!("cbSize", src.read_u32())?;

        if pcb_size < Self::FIXED_PART_SIZE {
            return Err(invalid_field_err!(
                "cbSize",
                "advertised size too small for Preconnection PDU"
            ));
        }

        read_padding(src, 4); // Flags

        // The version field SHOULD be initialized by the client and SHOULD be ignored by the server.
        let version = PcbVersion(src.read_u32());

        let id = src.read_u32();

        let remaining_size = pcb_size - Self::FIXED_PART_SIZE;

        ensure_size!(in: src, size: remaining_size);

        if remaining_size >= 2 {
            let cch_pcb = usize::from(src.read_u16());
            let cb_pcb = cch_pcb * 2;

            if remaining_size - 2 < cb_pcb {
                return Err(invalid_field_err!("cchPCB", "PCB string bigger than advertised size"));
            }

            let wsz_pcb_utf16 = src.read_slice(cb_pcb);

            let payload = crate::utf16::read_utf16_string(wsz_pcb_utf16, Some(cch_pcb))
                .map_err(|e| invalid_field_err_with_source("PreconnectionBlob", "wszPCB", "bad UTF-16 string", e))?;

            let leftover_size = remaining_size - 2 - cb_pcb;
            src.advance(leftover_size); // Consume (unused) leftover data

            Ok(Self {
                version,
                id,
                v2_payload: Some(payload),
            })
        } else {
            Ok(Self {
                version,
                id,
                v2_payload: None,
            })
        }
    }
}

impl Encode for PreconnectionBlob {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        if self.v2_payload.is_some() && self.version == PcbVersion::V1 {
            return Err(invalid_field_err!(
                "version",
                "there is no string payload in Preconnection PDU V1"
            ));
        }

        let pcb_size = self.size();

        ensure_size!(in: dst, size: pcb_size);

        dst.write_u32(cast_length!("cbSize", pcb_size)?); // cbSize
        write_padding(dst, 4); // Flags
        dst.write_u32(self.version.0); // Version
        dst.write_u32(self.id); // Id

        if let Some(v2_payload) = &self.v2_payload {
            // cchPCB
            let utf16_character_count = v2_payload.chars().count() + 1; // +1 for null terminator
            dst.write_u16(cast_length!("cchPCB", utf16_character_count)?);

            // wszPCB
            v2_payload.encode_utf16().for_each(|c| dst.write_u16(c));
            dst.write_u16(0); // null terminator
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let fixed_part_size = Self::FIXED_PART_SIZE;

        let variable_part = if let Some(v2_payload) = &self.v2_payload {
            let utf16_encoded_len = crate::utf16::null_terminated_utf16_encoded_len(v2_payload);
            2 + utf16_encoded_len
        } else {
            0
        };

        fixed_part_size + variable_part
    }
}

#[cfg(test)]
mod tests {
    use rdp_nego_core::{decode, encode_vec};

    use super::*;

    // A 2-character blob: cbSize is the whole PDU length (24 bytes: 16-byte
    // fixed part + 2-byte cchPCB + 6-byte wszPCB), per MS-RDPBCGR.
    const PCB_WITH_BLOB_WIRE: [u8; 24] = [
        0x18, 0x00, 0x00, 0x00, // cbSize = 24
        0x00, 0x00, 0x00, 0x00, // Flags
        0x02, 0x00, 0x00, 0x00, // Version = 2
        0xEF, 0xBE, 0xAD, 0xDE, // Id = 0xDEADBEEF
        0x03, 0x00, // cchPCB = 3 (including null terminator)
        0x41, 0x00, 0x42, 0x00, 0x00, 0x00, // wszPCB = "AB\0"
    ];

    #[test]
    fn preconnection_blob_with_string_round_trips() {
        let pcb = PreconnectionBlob {
            version: PcbVersion::V2,
            id: 0xDEAD_BEEF,
            v2_payload: Some("AB".to_owned()),
        };

        assert_eq!(encode_vec(&pcb).unwrap(), PCB_WITH_BLOB_WIRE);

        let decoded = decode::<PreconnectionBlob>(&PCB_WITH_BLOB_WIRE).unwrap();
        assert_eq!(decoded.id, pcb.id);
        assert_eq!(decoded.v2_payload, pcb.v2_payload);
    }

    const PCB_WITHOUT_BLOB_WIRE: [u8; 16] = [
        0x10, 0x00, 0x00, 0x00, // cbSize = 16
        0x00, 0x00, 0x00, 0x00, // Flags
        0x02, 0x00, 0x00, 0x00, // Version = 2
        0x2A, 0x00, 0x00, 0x00, // Id = 42
    ];

    #[test]
    fn preconnection_blob_without_string_round_trips() {
        let pcb = PreconnectionBlob {
            version: PcbVersion::V2,
            id: 42,
            v2_payload: None,
        };

        assert_eq!(encode_vec(&pcb).unwrap(), PCB_WITHOUT_BLOB_WIRE);

        let decoded = decode::<PreconnectionBlob>(&PCB_WITHOUT_BLOB_WIRE).unwrap();
        assert_eq!(decoded.v2_payload, None);
    }

    #[test]
    fn rejects_advertised_size_smaller_than_fixed_part() {
        let wire = [0x04, 0x00, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode::<PreconnectionBlob>(&wire).is_err());
    }
}
