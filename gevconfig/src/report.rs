//! Human-readable camera listings.
use crate::{
    bus::{Camera, CameraBus, CameraInfo},
    error::ResultExt,
    protocol::GVCP_PORT,
    Result,
};
use std::io::{self, Write};

fn or_unknown<T: ToString>(v: &Option<T>) -> String {
    v.as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Writes a camera's identity line, followed by its network configuration.
pub fn write_camera_info(out: &mut impl Write, info: &CameraInfo) -> io::Result<()> {
    writeln!(
        out,
        "Serial: {}, Model: {}, Vendor: {}, Sensor: {}, Resolution: {}, Color: {}, Firmware Version: {}",
        info.serial_number,
        info.model_name,
        info.vendor_name,
        or_unknown(&info.sensor_info),
        or_unknown(&info.sensor_resolution),
        or_unknown(&info.is_color_camera),
        info.firmware_version,
    )?;
    writeln!(
        out,
        "  IP: {} Sub: {} GW: {}",
        info.ip_address, info.subnet_mask, info.default_gateway
    )
}

pub(crate) fn write_no_cameras(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "No GigE Vision cameras detected on this network.")?;
    writeln!(out)?;
    writeln!(
        out,
        "Note that cameras must be on the same network segment, UDP port {GVCP_PORT} must not be \
        firewalled, and you may need to power-cycle your camera."
    )
}

/// Counts from one [`print_all_camera_info`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Listing {
    pub listed: usize,
    /// Cameras which couldn't be queried.
    pub failed: usize,
}

/// Lists every camera on the bus.
///
/// A camera which can't be queried is logged, counted, and skipped.
pub async fn print_all_camera_info<B: CameraBus>(
    bus: &mut B,
    out: &mut impl Write,
) -> Result<Listing> {
    writeln!(out, "Getting camera info...")?;
    let handles = bus
        .enumerate()
        .await
        .context("Failed to get number of cameras")?;

    if handles.is_empty() {
        write_no_cameras(out)?;
        return Ok(Listing::default());
    }

    writeln!(out, "Number of cameras found: {}", handles.len())?;
    let mut listing = Listing::default();
    for (index, handle) in handles.iter().enumerate() {
        let info = match camera_info(bus, handle).await {
            Ok(info) => info,
            Err(e) => {
                error!("Camera {index} ({handle:?}): {e}");
                writeln!(out, "[{index}]There was an error checking this camera: {e}")?;
                listing.failed += 1;
                continue;
            }
        };

        write!(out, "[{index}]")?;
        write_camera_info(out, &info)?;
        listing.listed += 1;
    }

    Ok(listing)
}

async fn camera_info<B: CameraBus>(bus: &mut B, handle: &B::Handle) -> Result<CameraInfo> {
    let mut camera = bus
        .connect(handle)
        .await
        .context("Failed to connect to camera")?;
    camera.info().await.context("Failed to get camera info")
}
