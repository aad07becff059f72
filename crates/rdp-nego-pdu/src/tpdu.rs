use rdp_nego_core::{read_padding, write_padding, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

use crate::tpkt::TpktHeader;
use crate::Pdu;

/// TPDU type used during X.224 messages exchange
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TpduCode(u8);

impl TpduCode {
    pub const CONNECTION_REQUEST: Self = Self(0xE0);
    pub const CONNECTION_CONFIRM: Self = Self(0xD0);
}

impl TpduCode {
    pub fn header_fixed_part_size(self) -> usize {
        TpduHeader::FIXED_PART_SIZE
    }

    pub fn check_expected(self, expected: TpduCode) -> DecodeResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(unexpected_message_type_err!(TpduHeader::NAME, self.0))
        }
    }
}

impl From<u8> for TpduCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<TpduCode> for u8 {
    fn from(value: TpduCode) -> Self {
        value.0
    }
}

/// TPDU header, follows a TPKT header.
///
/// Only the class-0 "not data" shape used by CR/CC TPDUs is modeled; RDP
/// negotiation never exchanges X.224 DATA TPDUs.
///
/// ```diagram
///       TPDU Header
///  ____________________   byte
/// |                    |
/// |         LI         |   1
/// |____________________|
/// |                    |
/// |        Code        |   2
/// |____________________|
/// |                    |
/// |                    |   3
/// |_______DST-REF______|
/// |                    |
/// |                    |   4
/// |____________________|
/// |                    |
/// |                    |   5
/// |_______SRC-REF______|
/// |                    |
/// |                    |   6
/// |____________________|
/// |                    |
/// |        Class       |   7
/// |____________________|
/// |         ...        |
///```
#[derive(Debug, PartialEq, Eq)]
pub struct TpduHeader {
    /// Length indicator field as defined in section 13.2.1 of X.224.
    ///
    /// The length indicated by LI shall be the header length in octets including
    /// parameters, but excluding the length indicator field and user data, if any.
    ///
    /// ```diagram
    /// ———————————————————————————————————————————————
    /// | LI | Fixed part | Variable part | User data |
    /// |————|————————————|———————————————|———————————|
    /// |    | <—————————— LI ——————————> |           |
    /// | <—————————— Header ———————————> |           |
    /// ```
    pub li: u8,
    /// TPDU code, used to define the structure of the remaining header.
    pub code: TpduCode,
}

impl Pdu for TpduHeader {
    const NAME: &'static str = "TpduHeader";
}

impl TpduHeader {
    /// Fixed part size for the class-0 (non-DATA) TPDU shape: LI, code, dst-ref, src-ref, class.
    pub const FIXED_PART_SIZE: usize = 7;

    pub fn read(src: &mut ReadCursor<'_>, tpkt: &TpktHeader) -> DecodeResult<Self> {
        ensure_size!(in: src, size: 2);

        let li = src.read_u8(); // LI
        let code = TpduCode::from(src.read_u8()); // Code

        if usize::from(li) + 1 + TpktHeader::SIZE > usize::from(tpkt.packet_length) {
            return Err(invalid_field_err!("li", "tpdu length greater than tpkt length"));
        }

        // The value 255 (1111 1111) is reserved for possible extensions.
        if li == 0b1111_1111 {
            return Err(invalid_field_err!(
                "li",
                "unsupported X.224 extension (suggested by LI field set to 255)"
            ));
        }

        ensure_size!(in: src, size: 5);
        read_padding(src, 5); // DST-REF, SRC-REF, Class 0

        Ok(Self { li, code })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: 2);

        dst.write_u8(self.li); // LI
        dst.write_u8(u8::from(self.code)); // Code

        ensure_size!(in: dst, size: 5);
        write_padding(dst, 5); // DST-REF, SRC-REF, Class 0

        Ok(())
    }

    /// Fixed part of the TPDU header.
    pub fn fixed_part_size(&self) -> usize {
        self.code.header_fixed_part_size()
    }

    /// Variable part of the TPDU header.
    pub fn variable_part_size(&self) -> usize {
        self.size() - self.fixed_part_size()
    }

    /// Size of the whole TPDU header, including LI field and variable part.
    pub fn size(&self) -> usize {
        usize::from(self.li) + 1
    }
}
