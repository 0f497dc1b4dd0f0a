//! # Device discovery
use crate::{
    address::{ip_from_register, register_from_ip},
    util::string_from_nul_padded,
};
use binrw::binrw;
use std::{fmt::Display, net::Ipv4Addr};

/// Ethernet MAC address of a device.
#[binrw]
#[brw(big)]
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddress(pub [u8; 6]);

impl Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// `DISCOVERY_ACK` payload: a device's identity and current network
/// configuration.
///
/// ## Packet format
///
/// * `u16`: GigE Vision version major
/// * `u16`: GigE Vision version minor
/// * `u32`: device mode
/// * 2 bytes reserved
/// * `u8[6]`: MAC address
/// * `u32`: supported IP configuration options
/// * `u32`: current IP configuration
/// * 12 bytes reserved, `u32`: current IP address
/// * 12 bytes reserved, `u32`: current subnet mask
/// * 12 bytes reserved, `u32`: current default gateway
/// * `char[32]`: manufacturer name
/// * `char[32]`: model name
/// * `char[32]`: device version
/// * `char[48]`: manufacturer-specific information
/// * `char[16]`: serial number
/// * `char[16]`: user-defined name
///
/// Strings are null-padded.
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    pub spec_version_major: u16,
    pub spec_version_minor: u16,
    pub device_mode: u32,

    #[brw(pad_before = 2)]
    pub mac: MacAddress,

    /// IP configuration schemes the device supports.
    pub ip_config_options: u32,
    /// IP configuration schemes currently enabled.
    pub ip_config_current: u32,

    #[brw(pad_before = 12)]
    #[br(map = ip_from_register)]
    #[bw(map = |ip: &Ipv4Addr| register_from_ip(*ip))]
    pub current_ip: Ipv4Addr,

    #[brw(pad_before = 12)]
    #[br(map = ip_from_register)]
    #[bw(map = |ip: &Ipv4Addr| register_from_ip(*ip))]
    pub subnet_mask: Ipv4Addr,

    #[brw(pad_before = 12)]
    #[br(map = ip_from_register)]
    #[bw(map = |ip: &Ipv4Addr| register_from_ip(*ip))]
    pub default_gateway: Ipv4Addr,

    #[br(map = |v: [u8; 32]| string_from_nul_padded(&v))]
    #[bw(assert(manufacturer_name.len() <= 32), pad_size_to = 32, map = |v: &String| v.as_bytes().to_vec())]
    pub manufacturer_name: String,

    #[br(map = |v: [u8; 32]| string_from_nul_padded(&v))]
    #[bw(assert(model_name.len() <= 32), pad_size_to = 32, map = |v: &String| v.as_bytes().to_vec())]
    pub model_name: String,

    #[br(map = |v: [u8; 32]| string_from_nul_padded(&v))]
    #[bw(assert(device_version.len() <= 32), pad_size_to = 32, map = |v: &String| v.as_bytes().to_vec())]
    pub device_version: String,

    #[br(map = |v: [u8; 48]| string_from_nul_padded(&v))]
    #[bw(assert(manufacturer_info.len() <= 48), pad_size_to = 48, map = |v: &String| v.as_bytes().to_vec())]
    pub manufacturer_info: String,

    #[br(map = |v: [u8; 16]| string_from_nul_padded(&v))]
    #[bw(assert(serial_number.len() <= 16), pad_size_to = 16, map = |v: &String| v.as_bytes().to_vec())]
    pub serial_number: String,

    #[br(map = |v: [u8; 16]| string_from_nul_padded(&v))]
    #[bw(assert(user_defined_name.len() <= 16), pad_size_to = 16, map = |v: &String| v.as_bytes().to_vec())]
    pub user_defined_name: String,
}

impl DeviceInfo {
    /// Length of the payload, in bytes.
    pub const LENGTH: u16 = 248;
}
