#![doc = include_str!("../README.md")]

#[macro_use]
extern crate tracing;

pub mod assigner;
mod bus;
pub mod driver;
#[cfg(test)]
mod emulator;
mod error;
#[cfg(test)]
mod fake;
mod gvcp;
pub mod report;
mod udp;

pub use {
    crate::{
        assigner::{AssignmentOutcome, NetworkAssignment},
        bus::{Camera, CameraBus, CameraInfo},
        driver::{Driver, Phase, RunSummary, SettleStrategy},
        error::{Error, ResultExt},
        gvcp::{GvcpBus, GvcpBusConfig, GvcpCamera},
        udp::GvcpUdpChannel,
    },
    gevconfig_protocol as protocol,
};
pub type Result<T = ()> = std::result::Result<T, Error>;
