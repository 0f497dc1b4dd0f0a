//! # IPv4 addresses in GVCP register space
//!
//! GVCP stores IPv4 addresses as a single big-endian 32-bit word: the first
//! octet of the dotted-quad form is the most significant byte of the register.
//! The same layout is used for every address field in GVCP packets.

use std::net::Ipv4Addr;

/// A 32-bit word as stored in (or read from) a device's GVCP register space.
pub type RegisterWord = u32;

/// Decodes a register word into an IPv4 address.
///
/// * bits 31-24: first octet
/// * bits 23-16: second octet
/// * bits 15-8: third octet
/// * bits 7-0: fourth octet
pub const fn ip_from_register(word: RegisterWord) -> Ipv4Addr {
    Ipv4Addr::new(
        (word >> 24) as u8,
        (word >> 16) as u8,
        (word >> 8) as u8,
        word as u8,
    )
}

/// Encodes an IPv4 address into a register word.
///
/// This is the inverse of [`ip_from_register`].
pub const fn register_from_ip(addr: Ipv4Addr) -> RegisterWord {
    let [a, b, c, d] = addr.octets();
    ((a as u32) << 24) | ((b as u32) << 16) | ((c as u32) << 8) | (d as u32)
}
