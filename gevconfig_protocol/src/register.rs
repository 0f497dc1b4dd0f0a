//! # Bootstrap registers for network configuration
//!
//! GigE Vision devices expose a fixed "bootstrap" register map. Only the
//! registers involved in IP configuration are described here.
//!
//! The `IpAddress`, `SubnetMask` and `Gateway` registers hold the
//! *persistent* configuration, which the device applies on its next IP
//! configuration cycle when [`NetworkMode::persistent`] is set. The `Current*`
//! registers reflect whatever address the device is using right now (from
//! DHCP, link-local or persistent configuration).
use crate::address::RegisterWord;
use modular_bitfield::{bitfield, specifiers::B29};
use num_traits::FromPrimitive;
use std::fmt::Display;

/// GVCP bootstrap register addresses.
#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum Register {
    /// Network interface configuration; see [`NetworkMode`].
    NetworkMode = 0x0014,
    /// Currently-negotiated IP address.
    CurrentIpAddress = 0x0024,
    /// Currently-negotiated subnet mask.
    CurrentSubnetMask = 0x0034,
    /// Currently-negotiated default gateway.
    CurrentGateway = 0x0044,
    /// Persistent IP address.
    IpAddress = 0x064c,
    /// Persistent subnet mask.
    SubnetMask = 0x065c,
    /// Persistent default gateway.
    Gateway = 0x066c,
    /// Control channel privilege (CCP).
    ///
    /// Writes to most other registers are rejected with `ACCESS_DENIED` unless
    /// the sender holds control privilege.
    ControlChannelPrivilege = 0x0a00,
}

impl Register {
    /// [`ControlChannelPrivilege`][Self::ControlChannelPrivilege] value which
    /// claims control access.
    pub const CCP_CONTROL: RegisterWord = 0x0000_0002;

    /// [`ControlChannelPrivilege`][Self::ControlChannelPrivilege] value which
    /// releases all privileges.
    pub const CCP_RELEASE: RegisterWord = 0;

    #[inline]
    pub const fn address(self) -> u32 {
        self as u32
    }

    /// Looks up a register by address. Addresses outside this map give
    /// [`None`].
    pub fn from_address(address: u32) -> Option<Self> {
        Self::from_u32(address)
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({:#06x})", self.address())
    }
}

/// Network mode register ([`Register::NetworkMode`]).
///
/// ## Format
///
/// This is a big-endian `u32` bitfield. The mode flags live in the top 3 bits:
///
/// * `bit 0x8000_0000`: persistent IP configuration is applied
/// * `bit 0x4000_0000`: DHCP is enabled
/// * `bit 0x2000_0000`: link-local addressing is enabled
///
/// The lower bits are preserved but not interpreted.
#[bitfield(bits = 32)]
#[repr(u32)]
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct NetworkMode {
    #[skip]
    __: B29,
    /// The device self-assigns a 169.254.x.x address when nothing else works.
    pub link_local: bool,
    /// The device attempts DHCP.
    pub dhcp: bool,
    /// The persistent IP/mask/gateway registers survive a power cycle and are
    /// applied on start-up.
    pub persistent: bool,
}

impl NetworkMode {
    /// Register value which turns on every mode bit at once.
    ///
    /// Written after the persistent IP/mask/gateway registers, this makes the
    /// just-written values the durable configuration. It is blunt: it doesn't
    /// compute a minimal mask.
    pub const FORCE_ALL: RegisterWord = 0xFFFF_FFFF;

    #[inline]
    pub fn from_register(word: RegisterWord) -> Self {
        Self::from(word)
    }

    #[inline]
    pub fn register(self) -> RegisterWord {
        self.into()
    }
}

impl Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags: Vec<&str> = [
            (self.persistent(), "persistent"),
            (self.dhcp(), "DHCP"),
            (self.link_local(), "link-local"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();

        if flags.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&flags.join(", "))
        }
    }
}
