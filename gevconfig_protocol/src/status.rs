use num_traits::FromPrimitive;

/// Acknowledgement status codes (`GEV_STATUS_*`).
///
/// Devices may report codes which aren't listed here, so [`GvcpAck`] keeps
/// the raw value.
///
/// [`GvcpAck`]: crate::GvcpAck
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[repr(u16)]
pub enum StatusCode {
    Success = 0x0000,
    PacketResend = 0x0100,
    NotImplemented = 0x8001,
    InvalidParameter = 0x8002,
    InvalidAddress = 0x8003,
    WriteProtect = 0x8004,
    BadAlignment = 0x8005,
    AccessDenied = 0x8006,
    Busy = 0x8007,
    LocalProblem = 0x8008,
    MessageMismatch = 0x8009,
    InvalidProtocol = 0x800a,
    NoMessage = 0x800b,
    PacketUnavailable = 0x800c,
    DataOverrun = 0x800d,
    InvalidHeader = 0x800e,
    WrongConfig = 0x800f,
    Overflow = 0x8015,
    Error = 0x8fff,
}

impl StatusCode {
    #[inline]
    pub fn from_raw(status: u16) -> Option<Self> {
        Self::from_u16(status)
    }
}

/// Describes a raw status value for humans, eg: `AccessDenied (0x8006)`.
pub fn describe_status(status: u16) -> String {
    match StatusCode::from_raw(status) {
        Some(code) => format!("{code:?} ({status:#06x})"),
        None => format!("unknown status ({status:#06x})"),
    }
}
