//! # GVCP commands and acknowledgements
//!
//! A host sends a [`GvcpCommand`] to a device (or broadcasts it), and the
//! device answers with a [`GvcpAck`] carrying the same request identifier.
use crate::{
    address::{ip_from_register, register_from_ip, RegisterWord},
    discovery::{DeviceInfo, MacAddress},
    error::Error,
    status::StatusCode,
    Result,
};
use binrw::{binrw, io::TakeSeekExt};
use std::net::Ipv4Addr;

/// Well-known UDP port for GVCP.
pub const GVCP_PORT: u16 = 3956;

bitflags! {
    /// Command flags.
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    pub struct CommandFlags: u8 {
        /// The device must send an acknowledgement.
        const ACK_REQUIRED  = 0x01;
        /// The device may broadcast its acknowledgement. Used for `DISCOVERY`
        /// and `FORCEIP`, where the device might not be on the host's subnet.
        const BROADCAST_ACK = 0x10;
    }
}

/// Command and acknowledgement codes.
#[binrw]
#[brw(big, repr = u16)]
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[repr(u16)]
pub enum OpCode {
    DiscoveryCmd = 0x0002,
    DiscoveryAck = 0x0003,
    ForceIpCmd = 0x0004,
    ForceIpAck = 0x0005,
    ReadRegCmd = 0x0080,
    ReadRegAck = 0x0081,
    WriteRegCmd = 0x0082,
    WriteRegAck = 0x0083,
    /// The device needs more time to complete a command.
    PendingAck = 0x0089,
}

impl OpCode {
    /// Gets the acknowledgement code for a command code.
    ///
    /// Returns [`None`] if `self` is not a command.
    pub const fn ack(self) -> Option<Self> {
        match self {
            Self::DiscoveryCmd => Some(Self::DiscoveryAck),
            Self::ForceIpCmd => Some(Self::ForceIpAck),
            Self::ReadRegCmd => Some(Self::ReadRegAck),
            Self::WriteRegCmd => Some(Self::WriteRegAck),
            _ => None,
        }
    }
}

/// Command sent from the host to a device.
///
/// ## Packet format
///
/// * `u8`: key, always `0x42`
/// * `u8`: [flags][Self::flags]
/// * `u16`: command code
/// * `u16`: payload length, in bytes
/// * `u16`: [request ID][Self::request_id]
/// * [payload][Self::payload]
#[binrw]
#[brw(big, magic = 0x42u8)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GvcpCommand {
    #[br(map = CommandFlags::from_bits_retain)]
    #[bw(map = |f: &CommandFlags| f.bits())]
    pub flags: CommandFlags,

    #[br(temp)]
    #[bw(calc = payload.opcode())]
    opcode: OpCode,

    #[br(temp)]
    #[bw(try_calc = u16::try_from(payload.length()))]
    length: u16,

    /// Request identifier, echoed in the acknowledgement. Never `0`.
    pub request_id: u16,

    #[br(args(opcode, length), map_stream = |reader| reader.take_seek(u64::from(length)))]
    pub payload: CommandPayload,
}

/// The [payload][GvcpCommand::payload] of a [`GvcpCommand`].
#[binrw]
#[brw(big)]
#[br(import(opcode: OpCode, length: u16))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    /// `DISCOVERY_CMD`: asks every device that hears it to identify itself.
    #[br(pre_assert(opcode == OpCode::DiscoveryCmd && length == 0))]
    Discovery,

    /// `FORCEIP_CMD`: sets the current network configuration of the device
    /// with a given MAC address.
    #[br(pre_assert(opcode == OpCode::ForceIpCmd && length == ForceIp::LENGTH))]
    ForceIp(ForceIp),

    /// `READREG_CMD`: reads one or more register addresses.
    #[br(pre_assert(opcode == OpCode::ReadRegCmd && length % 4 == 0))]
    ReadRegister(#[br(count = usize::from(length) / 4)] Vec<u32>),

    /// `WRITEREG_CMD`: writes one or more registers, in order.
    #[br(pre_assert(opcode == OpCode::WriteRegCmd && length % 8 == 0))]
    WriteRegister(#[br(count = usize::from(length) / 8)] Vec<RegisterWrite>),
}

impl CommandPayload {
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Discovery => OpCode::DiscoveryCmd,
            Self::ForceIp(_) => OpCode::ForceIpCmd,
            Self::ReadRegister(_) => OpCode::ReadRegCmd,
            Self::WriteRegister(_) => OpCode::WriteRegCmd,
        }
    }

    /// Length of the payload on the wire, in bytes.
    pub fn length(&self) -> usize {
        match self {
            Self::Discovery => 0,
            Self::ForceIp(_) => usize::from(ForceIp::LENGTH),
            Self::ReadRegister(a) => a.len() * 4,
            Self::WriteRegister(w) => w.len() * 8,
        }
    }
}

/// A single address/value pair in a `WRITEREG_CMD`.
#[binrw]
#[brw(big)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegisterWrite {
    pub address: u32,
    pub value: RegisterWord,
}

impl RegisterWrite {
    pub const fn new(address: u32, value: RegisterWord) -> Self {
        Self { address, value }
    }
}

/// `FORCEIP_CMD` payload.
///
/// ## Packet format
///
/// * 2 bytes reserved
/// * `u8[6]`: MAC address of the target device
/// * 12 bytes reserved, `u32`: IP address
/// * 12 bytes reserved, `u32`: subnet mask
/// * 12 bytes reserved, `u32`: default gateway
///
/// When the IP address is `0.0.0.0`, the device restarts its IP configuration
/// cycle (persistent, DHCP, then link-local, as enabled) instead.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceIp {
    #[brw(pad_before = 2)]
    pub mac: MacAddress,

    #[brw(pad_before = 12)]
    #[br(map = ip_from_register)]
    #[bw(map = |ip: &Ipv4Addr| register_from_ip(*ip))]
    pub ip: Ipv4Addr,

    #[brw(pad_before = 12)]
    #[br(map = ip_from_register)]
    #[bw(map = |ip: &Ipv4Addr| register_from_ip(*ip))]
    pub subnet_mask: Ipv4Addr,

    #[brw(pad_before = 12)]
    #[br(map = ip_from_register)]
    #[bw(map = |ip: &Ipv4Addr| register_from_ip(*ip))]
    pub default_gateway: Ipv4Addr,
}

impl ForceIp {
    const LENGTH: u16 = 56;

    /// Makes a `FORCEIP` payload which asks the device to renegotiate its
    /// address automatically.
    pub const fn restart(mac: MacAddress) -> Self {
        Self {
            mac,
            ip: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            default_gateway: Ipv4Addr::UNSPECIFIED,
        }
    }

    /// Returns `true` if this asks the device to restart IP configuration.
    pub fn is_restart(&self) -> bool {
        self.ip.is_unspecified()
    }
}

impl GvcpCommand {
    /// Maximum GVCP payload length (576 byte datagram minus IP, UDP and GVCP
    /// headers).
    pub const MAX_PAYLOAD_LENGTH: usize = 540;

    /// Buffer size large enough for any GVCP datagram.
    pub const MAX_PACKET_LENGTH: usize = 576;

    pub fn new(flags: CommandFlags, request_id: u16, payload: CommandPayload) -> Self {
        Self {
            flags,
            request_id,
            payload,
        }
    }

    pub fn discovery(request_id: u16) -> Self {
        Self::new(
            CommandFlags::ACK_REQUIRED | CommandFlags::BROADCAST_ACK,
            request_id,
            CommandPayload::Discovery,
        )
    }

    pub fn force_ip(request_id: u16, force_ip: ForceIp) -> Self {
        Self::new(
            CommandFlags::ACK_REQUIRED | CommandFlags::BROADCAST_ACK,
            request_id,
            CommandPayload::ForceIp(force_ip),
        )
    }

    /// Makes a `READREG_CMD` for one or more register addresses.
    ///
    /// Returns [`Error::InvalidLength`] if `addresses` is empty or doesn't fit
    /// in a single packet.
    pub fn read_registers(request_id: u16, addresses: &[u32]) -> Result<Self> {
        if addresses.is_empty() || addresses.len() * 4 > Self::MAX_PAYLOAD_LENGTH {
            error!("cannot read {} registers in one command", addresses.len());
            return Err(Error::InvalidLength);
        }

        Ok(Self::new(
            CommandFlags::ACK_REQUIRED,
            request_id,
            CommandPayload::ReadRegister(addresses.to_vec()),
        ))
    }

    /// Makes a `WRITEREG_CMD` for one or more registers.
    ///
    /// Returns [`Error::InvalidLength`] if `writes` is empty or doesn't fit in
    /// a single packet.
    pub fn write_registers(request_id: u16, writes: &[RegisterWrite]) -> Result<Self> {
        if writes.is_empty() || writes.len() * 8 > Self::MAX_PAYLOAD_LENGTH {
            error!("cannot write {} registers in one command", writes.len());
            return Err(Error::InvalidLength);
        }

        Ok(Self::new(
            CommandFlags::ACK_REQUIRED,
            request_id,
            CommandPayload::WriteRegister(writes.to_vec()),
        ))
    }

    /// Returns `true` if the device will acknowledge this command.
    pub fn ack_required(&self) -> bool {
        self.flags.contains(CommandFlags::ACK_REQUIRED)
    }
}

/// Acknowledgement sent from a device to the host.
///
/// ## Packet format
///
/// * `u16`: [status][Self::status]
/// * `u16`: acknowledgement code
/// * `u16`: payload length, in bytes
/// * `u16`: [acknowledgement ID][Self::ack_id]
/// * [payload][Self::payload]
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GvcpAck {
    /// Raw status value; see [`StatusCode`].
    pub status: u16,

    #[br(temp)]
    #[bw(calc = payload.opcode())]
    opcode: OpCode,

    #[br(temp)]
    #[bw(try_calc = u16::try_from(payload.length()))]
    length: u16,

    /// The [request ID][GvcpCommand::request_id] being acknowledged.
    pub ack_id: u16,

    #[br(args(opcode, length), map_stream = |reader| reader.take_seek(u64::from(length)))]
    pub payload: AckPayload,
}

/// The [payload][GvcpAck::payload] of a [`GvcpAck`].
#[binrw]
#[brw(big)]
#[br(import(opcode: OpCode, length: u16))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckPayload {
    /// `DISCOVERY_ACK`
    #[br(pre_assert(opcode == OpCode::DiscoveryAck && length >= DeviceInfo::LENGTH))]
    Discovery(DeviceInfo),

    /// `FORCEIP_ACK`
    #[br(pre_assert(opcode == OpCode::ForceIpAck))]
    ForceIp,

    /// `READREG_ACK`: the values of the registers which were read
    /// successfully, in request order.
    #[br(pre_assert(opcode == OpCode::ReadRegAck && length % 4 == 0))]
    ReadRegister(#[br(count = usize::from(length) / 4)] Vec<RegisterWord>),

    /// `WRITEREG_ACK`
    #[br(pre_assert(opcode == OpCode::WriteRegAck))]
    WriteRegister {
        /// Number of registers written successfully, or on failure, the index
        /// of the failed write.
        #[brw(pad_before = 2)]
        index: u16,
    },

    /// `PENDING_ACK`: the device needs more time before it can acknowledge a
    /// command.
    #[br(pre_assert(opcode == OpCode::PendingAck))]
    Pending {
        /// Time until the real acknowledgement is expected, in milliseconds.
        #[brw(pad_before = 2)]
        time_to_completion_ms: u16,
    },
}

impl AckPayload {
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Discovery(_) => OpCode::DiscoveryAck,
            Self::ForceIp => OpCode::ForceIpAck,
            Self::ReadRegister(_) => OpCode::ReadRegAck,
            Self::WriteRegister { .. } => OpCode::WriteRegAck,
            Self::Pending { .. } => OpCode::PendingAck,
        }
    }

    /// Length of the payload on the wire, in bytes.
    pub fn length(&self) -> usize {
        match self {
            Self::Discovery(_) => usize::from(DeviceInfo::LENGTH),
            Self::ForceIp => 0,
            Self::ReadRegister(v) => v.len() * 4,
            Self::WriteRegister { .. } | Self::Pending { .. } => 4,
        }
    }
}

impl GvcpAck {
    pub fn new(status: u16, ack_id: u16, payload: AckPayload) -> Self {
        Self {
            status,
            ack_id,
            payload,
        }
    }

    /// Makes a successful acknowledgement for `ack_id`.
    pub fn success(ack_id: u16, payload: AckPayload) -> Self {
        Self::new(StatusCode::Success as u16, ack_id, payload)
    }

    /// Gets the known [`StatusCode`], if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_raw(self.status)
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::Success as u16
    }

    /// Returns [`Error::DeviceStatus`] if the device reported a failure.
    pub fn check_status(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::DeviceStatus(self.status))
        }
    }

    /// Returns `true` if this is a final (non-pending) acknowledgement of
    /// `cmd`.
    pub fn acknowledges(&self, cmd: &GvcpCommand) -> bool {
        self.ack_id == cmd.request_id && cmd.payload.opcode().ack() == Some(self.payload.opcode())
    }
}
