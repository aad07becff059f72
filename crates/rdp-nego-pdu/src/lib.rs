//! Wire types for the negotiation phase of an RDP connection: TPKT framing,
//! X.224 CR/CC TPDUs, the RDP_NEG_* negotiation blobs and the Hyper-V style
//! Preconnection PDU.
//!
//! Codec traits ([`Decode`], [`Encode`]) and the cursor/error plumbing are
//! provided by [`rdp_nego_core`]; this crate only defines the PDU shapes and
//! their byte layouts.

#[macro_use]
mod macros;

pub mod nego;
pub mod pcb;
pub mod tpdu;
pub mod tpkt;
pub mod utf16;
pub mod x224;

pub use rdp_nego_core::{decode, encode, encode_vec, Decode, DecodeError, DecodeResult, Encode, EncodeError, EncodeResult};

/// A PDU identified by a static name, used for error context and diagnostics.
pub trait Pdu {
    const NAME: &'static str;
}
