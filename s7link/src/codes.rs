//! Snap7 result codes.
//!
//! Every native entry point returns an `i32`. Zero is success, one is the
//! soft "accepted / job pending" status, anything else is a hard error whose
//! text comes from the driver. Hard errors are layered: the low word carries
//! the TCP error, bits 16..20 the ISO error and the top bits the
//! role-specific (client, server or partner) error.

/// Success.
pub const OK: i32 = 0;
/// Accepted, still in progress. Also returned as "job pending" by the
/// completion checks.
pub const SOFT_STATUS: i32 = 1;
/// Returned by the completion checks when the job has finished.
pub const JOB_COMPLETE: i32 = 0;
/// Returned by the completion checks when the job is still running.
pub const JOB_PENDING: i32 = 1;
/// The object reference handed to the driver is not a live object.
pub const INVALID_OBJECT: i32 = -2;

pub const TCP_MASK: i32 = 0x0000_FFFF;
pub const ISO_MASK: i32 = 0x000F_0000;
pub const UPPER_MASK: i32 = 0xFFF0_0000_u32 as i32;

// TCP layer
pub const ERR_TCP_SOCKET_CREATION: i32 = 0x0001;
pub const ERR_TCP_CONNECTION_TIMEOUT: i32 = 0x0002;
pub const ERR_TCP_CONNECTION_FAILED: i32 = 0x0003;
pub const ERR_TCP_RECEIVE_TIMEOUT: i32 = 0x0004;
pub const ERR_TCP_DATA_RECEIVE: i32 = 0x0005;
pub const ERR_TCP_SEND_TIMEOUT: i32 = 0x0006;
pub const ERR_TCP_DATA_SEND: i32 = 0x0007;
pub const ERR_TCP_CONNECTION_RESET: i32 = 0x0008;
pub const ERR_TCP_NOT_CONNECTED: i32 = 0x0009;
pub const ERR_TCP_UNREACHABLE_HOST: i32 = 0x2751;

// ISO layer
pub const ERR_ISO_CONNECT: i32 = 0x0001_0000;
pub const ERR_ISO_DISCONNECT: i32 = 0x0002_0000;
pub const ERR_ISO_INVALID_PDU: i32 = 0x0003_0000;
pub const ERR_ISO_INVALID_DATA_SIZE: i32 = 0x0004_0000;
pub const ERR_ISO_NULL_POINTER: i32 = 0x0005_0000;
pub const ERR_ISO_SHORT_PACKET: i32 = 0x0006_0000;
pub const ERR_ISO_TOO_MANY_FRAGMENTS: i32 = 0x0007_0000;
pub const ERR_ISO_PDU_OVERFLOW: i32 = 0x0008_0000;
pub const ERR_ISO_SEND_PACKET: i32 = 0x0009_0000;
pub const ERR_ISO_RECV_PACKET: i32 = 0x000A_0000;
pub const ERR_ISO_INVALID_PARAMS: i32 = 0x000B_0000;

// Partner layer
pub const ERR_PAR_ADDRESS_IN_USE: i32 = 0x0020_0000;
pub const ERR_PAR_NO_ROOM: i32 = 0x0030_0000;
pub const ERR_PAR_INVALID_PARAMS: i32 = 0x0040_0000;
pub const ERR_PAR_NOT_LINKED: i32 = 0x0050_0000;
pub const ERR_PAR_BUSY: i32 = 0x0060_0000;
pub const ERR_PAR_FRAME_TIMEOUT: i32 = 0x0070_0000;
pub const ERR_PAR_INVALID_PDU: i32 = 0x0080_0000;
pub const ERR_PAR_SEND_TIMEOUT: i32 = 0x0090_0000;
pub const ERR_PAR_RECV_TIMEOUT: i32 = 0x00A0_0000;
pub const ERR_PAR_SEND_REFUSED: i32 = 0x00B0_0000;
pub const ERR_PAR_NEGOTIATING_PDU: i32 = 0x00C0_0000;
pub const ERR_PAR_SENDING_BLOCK: i32 = 0x00D0_0000;
pub const ERR_PAR_RECVING_BLOCK: i32 = 0x00E0_0000;
pub const ERR_PAR_BIND_ERROR: i32 = 0x00F0_0000;
pub const ERR_PAR_DESTROYING: i32 = 0x0100_0000;
pub const ERR_PAR_INVALID_PARAM_NUMBER: i32 = 0x0200_0000;
pub const ERR_PAR_CANNOT_CHANGE_PARAM: i32 = 0x0300_0000;
pub const ERR_PAR_BUFFER_TOO_SMALL: i32 = 0x0400_0000;

// Client layer
pub const ERR_CLI_NEGOTIATING_PDU: i32 = 0x0010_0000;
pub const ERR_CLI_INVALID_PARAMS: i32 = 0x0020_0000;
pub const ERR_CLI_JOB_PENDING: i32 = 0x0030_0000;
pub const ERR_CLI_TOO_MANY_ITEMS: i32 = 0x0040_0000;
pub const ERR_CLI_INVALID_WORD_LEN: i32 = 0x0050_0000;
pub const ERR_CLI_PARTIAL_DATA_WRITTEN: i32 = 0x0060_0000;
pub const ERR_CLI_SIZE_OVER_PDU: i32 = 0x0070_0000;
pub const ERR_CLI_INVALID_PLC_ANSWER: i32 = 0x0080_0000;
pub const ERR_CLI_ADDRESS_OUT_OF_RANGE: i32 = 0x0090_0000;
pub const ERR_CLI_INVALID_PARAM_NUMBER: i32 = 0x0250_0000;
pub const ERR_CLI_CANNOT_CHANGE_PARAM: i32 = 0x0260_0000;

// Server layer
pub const ERR_SRV_CANNOT_START: i32 = 0x0010_0000;
pub const ERR_SRV_DB_NULL_POINTER: i32 = 0x0020_0000;
pub const ERR_SRV_AREA_ALREADY_EXISTS: i32 = 0x0030_0000;
pub const ERR_SRV_UNKNOWN_AREA: i32 = 0x0040_0000;
pub const ERR_SRV_INVALID_PARAMS: i32 = 0x0050_0000;
pub const ERR_SRV_TOO_MANY_DB: i32 = 0x0060_0000;
pub const ERR_SRV_INVALID_PARAM_NUMBER: i32 = 0x0070_0000;
pub const ERR_SRV_CANNOT_CHANGE_PARAM: i32 = 0x0080_0000;

/// Message-free classification of a raw result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Success,
    SoftStatus,
    HardError,
}

/// Classify a raw code without asking the driver for text.
pub fn kind(code: i32) -> CodeKind {
    match code {
        OK => CodeKind::Success,
        SOFT_STATUS => CodeKind::SoftStatus,
        _ => CodeKind::HardError,
    }
}
