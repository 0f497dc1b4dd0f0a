//! Pins each camera's current address as its persistent configuration.
//!
//! For each camera on the bus:
//!
//! 1. connect, and read its [`CameraInfo`]
//! 2. read the persistent `IpAddress` and `Gateway` registers, for comparison
//! 3. compute a [`NetworkAssignment`] from the current address
//! 4. write `IpAddress`, `SubnetMask` and `Gateway`, in that order
//! 5. write [`NetworkMode::FORCE_ALL`] so the new values stick
//! 6. read back `IpAddress` and `Gateway`
//!
//! Every register operation is issued exactly once. The first failure stops
//! the whole batch.
use crate::{
    bus::{Camera, CameraBus, CameraInfo},
    error::ResultExt,
    protocol::{ip_from_register, register_from_ip, NetworkMode, Register, RegisterWord},
    report::write_no_cameras,
    Result,
};
use std::{fmt::Display, io::Write, net::Ipv4Addr};

/// Static network configuration to store on a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAssignment {
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl NetworkAssignment {
    /// Every assignment is a `/24`.
    pub const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

    /// Keeps the camera on `ip`, with the gateway at `.1` of the same `/24`.
    pub const fn from_current(ip: Ipv4Addr) -> Self {
        let [a, b, c, _] = ip.octets();
        Self {
            ip,
            mask: Self::MASK,
            gateway: Ipv4Addr::new(a, b, c, 1),
        }
    }
}

impl Display for NetworkAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IP: {} Sub: {} GW: {}", self.ip, self.mask, self.gateway)
    }
}

/// What happened to one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOutcome {
    pub index: usize,
    pub info: CameraInfo,
    /// Persistent address before the assignment.
    pub previous_ip: Ipv4Addr,
    /// Persistent gateway before the assignment.
    pub previous_gateway: Ipv4Addr,
    pub assignment: NetworkAssignment,
    /// `IpAddress` register, read back after writing.
    pub verified_ip_word: RegisterWord,
    /// `Gateway` register, read back after writing.
    pub verified_gateway_word: RegisterWord,
}

impl AssignmentOutcome {
    pub const fn verified_ip(&self) -> Ipv4Addr {
        ip_from_register(self.verified_ip_word)
    }

    pub const fn verified_gateway(&self) -> Ipv4Addr {
        ip_from_register(self.verified_gateway_word)
    }

    /// `true` if the camera reads back what was written.
    pub fn is_verified(&self) -> bool {
        self.verified_ip() == self.assignment.ip
            && self.verified_gateway() == self.assignment.gateway
    }
}

/// A connected camera, while it is being worked on.
///
/// The connection is released when this is dropped.
struct CameraRecord<C> {
    index: usize,
    camera: C,
    info: CameraInfo,
    register_ip: Ipv4Addr,
    register_gateway: Ipv4Addr,
}

impl<C: Camera> CameraRecord<C> {
    async fn open<B>(bus: &mut B, index: usize, handle: &B::Handle) -> Result<Self>
    where
        B: CameraBus<Camera = C>,
    {
        debug!("Camera {index}: connecting to {handle:?}");
        let mut camera = bus
            .connect(handle)
            .await
            .context("Failed to connect to camera")?;
        let info = camera.info().await.context("Failed to get camera info")?;

        let register_ip = read(&mut camera, Register::IpAddress).await?;
        let register_gateway = read(&mut camera, Register::Gateway).await?;

        Ok(Self {
            index,
            camera,
            info,
            register_ip: ip_from_register(register_ip),
            register_gateway: ip_from_register(register_gateway),
        })
    }

    async fn assign(mut self, out: &mut impl Write) -> Result<AssignmentOutcome> {
        let assignment = NetworkAssignment::from_current(self.info.ip_address);
        info!(
            "Camera {} ({}): storing {assignment}",
            self.index, self.info.serial_number
        );

        let camera = &mut self.camera;
        write(camera, Register::IpAddress, register_from_ip(assignment.ip)).await?;
        write(camera, Register::SubnetMask, register_from_ip(assignment.mask)).await?;
        write(camera, Register::Gateway, register_from_ip(assignment.gateway)).await?;
        write(camera, Register::NetworkMode, NetworkMode::FORCE_ALL).await?;

        let verified_ip_word = read(camera, Register::IpAddress).await?;
        let verified_gateway_word = read(camera, Register::Gateway).await?;

        let outcome = AssignmentOutcome {
            index: self.index,
            info: self.info,
            previous_ip: self.register_ip,
            previous_gateway: self.register_gateway,
            assignment,
            verified_ip_word,
            verified_gateway_word,
        };

        writeln!(
            out,
            "  Stored IP: {:#010x} ({}) GW: {:#010x} ({})",
            outcome.verified_ip_word,
            outcome.verified_ip(),
            outcome.verified_gateway_word,
            outcome.verified_gateway(),
        )?;

        if !outcome.is_verified() {
            warn!(
                "Camera {}: wrote {assignment}, but read back IP {} GW {}",
                outcome.index,
                outcome.verified_ip(),
                outcome.verified_gateway()
            );
        }

        Ok(outcome)
    }
}

async fn read(camera: &mut impl Camera, reg: Register) -> Result<RegisterWord> {
    let value = camera
        .read_register(reg.address())
        .await
        .context(format!("Failed to read {reg}"))?;
    debug!("{reg} = {value:#010x}");
    Ok(value)
}

async fn write(camera: &mut impl Camera, reg: Register, value: RegisterWord) -> Result {
    debug!("{reg} <- {value:#010x}");
    camera
        .write_register(reg.address(), value)
        .await
        .context(format!("Failed to write {reg}"))
}

/// Stores the current address of every camera on the bus as its persistent
/// configuration.
///
/// Progress is written to `out`. Returns one [`AssignmentOutcome`] per camera.
pub async fn store_all<B: CameraBus>(
    bus: &mut B,
    out: &mut impl Write,
) -> Result<Vec<AssignmentOutcome>> {
    writeln!(out, "Saving IPs...")?;
    let handles = bus
        .enumerate()
        .await
        .context("Failed to get number of cameras")?;

    if handles.is_empty() {
        write_no_cameras(out)?;
        return Ok(Vec::new());
    }

    writeln!(out, "Number of cameras found: {}", handles.len())?;
    let mut outcomes = Vec::with_capacity(handles.len());
    for (index, handle) in handles.iter().enumerate() {
        let record = CameraRecord::open(bus, index, handle).await?;
        writeln!(
            out,
            "[{index}]IP register: {} GW: {}",
            record.register_ip, record.register_gateway
        )?;
        outcomes.push(record.assign(out).await?);
    }

    Ok(outcomes)
}
