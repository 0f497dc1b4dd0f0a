//! The camera bus: everything the IP assigner, reporter and driver need from
//! the outside world.
//!
//! [`GvcpBus`][crate::GvcpBus] implements this over the network; tests use an
//! in-memory implementation.
use crate::{
    protocol::{MacAddress, RegisterWord},
    Result,
};
use async_trait::async_trait;
use std::{fmt::Debug, net::Ipv4Addr};

/// Identity and current network configuration of a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub serial_number: String,
    pub model_name: String,
    pub vendor_name: String,
    /// Sensor description, if the camera reports one.
    pub sensor_info: Option<String>,
    /// Sensor resolution, if the camera reports one.
    pub sensor_resolution: Option<String>,
    /// Whether the sensor is colour, if known.
    pub is_color_camera: Option<bool>,
    pub firmware_version: String,
    pub mac: MacAddress,
    /// The address the camera is using right now.
    pub ip_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub default_gateway: Ipv4Addr,
}

/// A set of cameras which can be enumerated and connected to.
///
/// A bus is a session object: it is created explicitly, passed by reference
/// to whatever needs it, and closed explicitly.
#[async_trait(?Send)]
pub trait CameraBus {
    /// Identifies a camera found on the bus.
    type Handle: Clone + Debug;
    type Camera: Camera;

    /// Gets the cameras found by the most recent scan, in a stable order.
    async fn enumerate(&mut self) -> Result<Vec<Self::Handle>>;

    /// Opens a control connection to a camera. The connection is released
    /// when the returned [`Camera`] is dropped.
    async fn connect(&mut self, handle: &Self::Handle) -> Result<Self::Camera>;

    /// Asks every camera on the bus to renegotiate its network configuration
    /// automatically.
    async fn force_all_ip_addresses_automatically(&mut self) -> Result;

    /// Scans the bus for cameras again.
    async fn rescan(&mut self) -> Result;
}

/// A connected camera.
#[async_trait(?Send)]
pub trait Camera {
    async fn info(&mut self) -> Result<CameraInfo>;
    async fn read_register(&mut self, address: u32) -> Result<RegisterWord>;
    async fn write_register(&mut self, address: u32, value: RegisterWord) -> Result;
}
