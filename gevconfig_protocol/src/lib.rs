#![doc = include_str!("../README.md")]

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate num_derive;

#[macro_use]
extern crate tracing;

pub mod address;
mod discovery;
mod error;
mod packet;
pub mod register;
mod status;
mod util;

pub use crate::{
    address::{ip_from_register, register_from_ip, RegisterWord},
    discovery::{DeviceInfo, MacAddress},
    error::Error,
    packet::{
        AckPayload, CommandFlags, CommandPayload, ForceIp, GvcpAck, GvcpCommand, OpCode,
        RegisterWrite, GVCP_PORT,
    },
    register::{NetworkMode, Register},
    status::{describe_status, StatusCode},
};

/// Result type.
pub type Result<T = ()> = std::result::Result<T, Error>;
