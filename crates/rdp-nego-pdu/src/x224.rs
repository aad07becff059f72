use rdp_nego_core::{Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::Pdu;

/// Shared framing for the two X.224 TPDUs the negotiation phase ever sends:
/// Connection Request (client → server) and Connection Confirm (server → client).
///
/// Implementing this trait for a type gets it a [`Decode`]/[`Encode`] impl that
/// wraps the type's own body in a TPKT header and a class-0 TPDU header.
pub trait X224Pdu<'de>: Sized + Pdu {
    const TPDU_CODE: TpduCode;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()>;

    fn x224_body_decode(src: &mut ReadCursor<'de>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self>;

    /// Size in bytes of the TPDU header's variable part (anything beyond LI/code/dst-ref/src-ref/class).
    fn tpdu_header_variable_part_size(&self) -> usize;
}

impl<'de, T> Encode for T
where
    T: X224Pdu<'de>,
{
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        let packet_length = self.size();

        ensure_size!(in: dst, size: packet_length);

        TpktHeader {
            packet_length: cast_length!("packet_length", packet_length)?,
        }
        .write(dst)?;

        let li = T::TPDU_CODE.header_fixed_part_size() + self.tpdu_header_variable_part_size() - 1;

        TpduHeader {
            li: cast_length!("li", li)?,
            code: T::TPDU_CODE,
        }
        .write(dst)?;

        self.x224_body_encode(dst)
    }

    fn name(&self) -> &'static str {
        T::NAME
    }

    fn size(&self) -> usize {
        TpktHeader::SIZE + T::TPDU_CODE.header_fixed_part_size() + self.tpdu_header_variable_part_size()
    }
}

impl<'de, T> Decode<'de> for T
where
    T: X224Pdu<'de>,
{
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let tpkt = TpktHeader::read(src)?;

        ensure_size!(in: src, size: tpkt.packet_length().saturating_sub(TpktHeader::SIZE));

        let tpdu = TpduHeader::read(src, &tpkt)?;
        tpdu.code.check_expected(T::TPDU_CODE)?;

        if tpdu.size() < tpdu.fixed_part_size() {
            return Err(invalid_field_err!(
                "TpduHeader",
                "li",
                "fixed part bigger than total header size"
            ));
        }

        T::x224_body_decode(src, &tpkt, &tpdu)
    }
}
