//! [`CameraBus`] and [`Camera`] over GigE Vision Control Protocol.
//!
//! ## Discovery
//!
//! Cameras are found by broadcasting `DISCOVERY_CMD`, and collecting every
//! `DISCOVERY_ACK` until [`GvcpBusConfig::discovery_timeout`] elapses. Cameras
//! are identified by MAC address, because their IP address can change.
//!
//! ## Control
//!
//! [`GvcpCamera`] claims control privilege when it connects, because
//! cameras refuse most register writes from unprivileged hosts. Privilege is
//! released when the [`GvcpCamera`] is dropped.
use crate::{
    bus::{Camera, CameraBus, CameraInfo},
    error::ResultExt,
    protocol::{
        ip_from_register, AckPayload, CommandFlags, DeviceInfo, ForceIp, GvcpAck, GvcpCommand,
        Register, RegisterWord, RegisterWrite, GVCP_PORT,
    },
    udp::{encode, GvcpUdpChannel},
    Error, Result,
};
use async_trait::async_trait;
use rand::Rng;
use std::{
    collections::BTreeMap,
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use tokio::time::{timeout_at, Instant};

/// Network settings for a [`GvcpBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GvcpBusConfig {
    /// Local address to send from. Port `0` picks any free port.
    pub bind: SocketAddrV4,
    /// Where `DISCOVERY` and `FORCEIP` commands are sent.
    pub broadcast: SocketAddrV4,
    /// GVCP port on cameras.
    pub port: u16,
    /// How long to collect discovery acknowledgements for.
    pub discovery_timeout: Duration,
    /// How long to wait for each acknowledgement.
    pub control_timeout: Duration,
    /// How many times to retransmit an unacknowledged command, with the same
    /// request ID.
    pub retransmits: u8,
}

impl Default for GvcpBusConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            broadcast: SocketAddrV4::new(Ipv4Addr::BROADCAST, GVCP_PORT),
            port: GVCP_PORT,
            discovery_timeout: Duration::from_secs(1),
            control_timeout: Duration::from_millis(500),
            retransmits: 0,
        }
    }
}

/// Source of GVCP request IDs, which must never be `0`.
struct RequestIds(u16);

impl RequestIds {
    fn random() -> Self {
        Self(rand::rng().random_range(1..=u16::MAX))
    }

    fn next(&mut self) -> u16 {
        let id = self.0;
        self.0 = self.0.checked_add(1).unwrap_or(1);
        id
    }
}

/// Sends a command and waits for its final acknowledgement.
///
/// * Acknowledgements for other requests, and datagrams which aren't GVCP
///   acknowledgements, are skipped.
/// * `PENDING_ACK` pushes the deadline out by the time the device asks for.
/// * With no acknowledgement by the deadline, the command is retransmitted
///   up to [`GvcpBusConfig::retransmits`] times.
///
/// If `target` is [`None`], `channel` must be connected.
async fn transact(
    channel: &GvcpUdpChannel,
    target: Option<SocketAddrV4>,
    cmd: &GvcpCommand,
    config: &GvcpBusConfig,
) -> Result<GvcpAck> {
    for attempt in 0..=config.retransmits {
        if attempt > 0 {
            warn!(
                "no acknowledgement for request {:#06x}, retransmitting ({attempt}/{})",
                cmd.request_id, config.retransmits
            );
        }

        match target {
            Some(addr) => channel.send_to(cmd, addr).await?,
            None => channel.send(cmd).await?,
        }

        let mut deadline = Instant::now() + config.control_timeout;
        loop {
            let (ack, src) = match timeout_at(deadline, channel.recv_from()).await {
                Err(_) => break,
                Ok(Err(Error::BinRwError(e))) => {
                    debug!("ignoring unparseable datagram: {e}");
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(r)) => r,
            };

            if ack.ack_id != cmd.request_id {
                debug!(
                    "ignoring acknowledgement {:#06x} from {src} while waiting for {:#06x}",
                    ack.ack_id, cmd.request_id
                );
                continue;
            }

            if let AckPayload::Pending {
                time_to_completion_ms,
            } = ack.payload
            {
                debug!(
                    "{src} needs {time_to_completion_ms} ms to complete request {:#06x}",
                    cmd.request_id
                );
                deadline = Instant::now()
                    + Duration::from_millis(u64::from(time_to_completion_ms))
                    + config.control_timeout;
                continue;
            }

            if !ack.acknowledges(cmd) {
                error!("unexpected acknowledgement from {src} for {cmd:?}: {ack:?}");
                return Err(Error::UnexpectedResponse);
            }

            if let Err(e) = ack.check_status() {
                error!("{src} rejected request {:#06x}: {e}", cmd.request_id);
                return Err(e.into());
            }

            return Ok(ack);
        }
    }

    error!(
        "timeout waiting for acknowledgement of request {:#06x}",
        cmd.request_id
    );
    Err(Error::Timeout)
}

/// A GigE Vision network segment, reached through one local socket.
///
/// This is a session object: [open][Self::open] it once at start-up, pass it
/// by reference, and [close][Self::close] it at the end.
pub struct GvcpBus {
    config: GvcpBusConfig,
    channel: GvcpUdpChannel,
    request_ids: RequestIds,
    /// Devices found by the most recent scan, ordered by IP address.
    devices: Vec<DeviceInfo>,
}

impl GvcpBus {
    /// Binds the bus socket.
    ///
    /// No devices are known until the first [rescan][CameraBus::rescan].
    pub async fn open(config: GvcpBusConfig) -> Result<Self> {
        info!("Opening camera bus on {}", config.bind);
        let mut channel = GvcpUdpChannel::new();
        channel.bind(config.bind).await?;
        debug!("Bound to {}", channel.local_addr()?);

        Ok(Self {
            config,
            channel,
            request_ids: RequestIds::random(),
            devices: Vec::new(),
        })
    }

    /// Closes the bus. Cameras which are still connected are unaffected.
    pub fn close(self) {
        info!("Closing camera bus");
    }

    /// Devices found by the most recent scan.
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    async fn discover(&mut self) -> Result<Vec<DeviceInfo>> {
        let cmd = GvcpCommand::discovery(self.request_ids.next());
        debug!("Sending discovery to {}", self.config.broadcast);
        self.channel.send_to(&cmd, self.config.broadcast).await?;

        let deadline = Instant::now() + self.config.discovery_timeout;
        let mut found = BTreeMap::new();
        loop {
            let (ack, src) = match timeout_at(deadline, self.channel.recv_from()).await {
                Err(_) => break,
                Ok(Err(Error::BinRwError(e))) => {
                    debug!("ignoring unparseable datagram: {e}");
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(r)) => r,
            };

            if !ack.acknowledges(&cmd) {
                debug!("ignoring {:?} from {src}", ack.payload.opcode());
                continue;
            }

            if let Err(e) = ack.check_status() {
                warn!("{src} answered discovery with an error: {e}");
                continue;
            }

            let AckPayload::Discovery(device) = ack.payload else {
                continue;
            };

            debug!(
                "Found {} {} ({}) at {}",
                device.manufacturer_name, device.model_name, device.mac, device.current_ip
            );
            found.insert(device.mac, device);
        }

        let mut devices: Vec<DeviceInfo> = found.into_values().collect();
        devices.sort_by_key(|d| d.current_ip);
        Ok(devices)
    }
}

#[async_trait(?Send)]
impl CameraBus for GvcpBus {
    type Handle = DeviceInfo;
    type Camera = GvcpCamera;

    async fn enumerate(&mut self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    async fn connect(&mut self, handle: &DeviceInfo) -> Result<GvcpCamera> {
        GvcpCamera::connect(handle.clone(), &self.config).await
    }

    /// Sends `FORCEIP` with an empty address to every device from the last
    /// scan, which makes them restart their IP configuration cycle.
    async fn force_all_ip_addresses_automatically(&mut self) -> Result {
        let Self {
            config,
            channel,
            request_ids,
            devices,
        } = self;

        for device in devices.iter() {
            info!(
                "Asking {} ({}) to renegotiate its address",
                device.mac, device.current_ip
            );
            let cmd = GvcpCommand::force_ip(request_ids.next(), ForceIp::restart(device.mac));
            match transact(channel, Some(config.broadcast), &cmd, config).await {
                Ok(_) => (),
                // Some devices restart their network stack before answering.
                Err(Error::Timeout) => warn!(
                    "{} did not acknowledge FORCEIP; it may already be renegotiating",
                    device.mac
                ),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn rescan(&mut self) -> Result {
        self.devices = self.discover().await?;
        info!("Found {} camera(s)", self.devices.len());
        Ok(())
    }
}

/// Control connection to one camera.
pub struct GvcpCamera {
    device: DeviceInfo,
    config: GvcpBusConfig,
    channel: GvcpUdpChannel,
    request_ids: RequestIds,
    /// We hold control privilege, and need to release it.
    privileged: bool,
}

impl GvcpCamera {
    /// Connects to a camera at its current address, and claims control
    /// privilege.
    pub async fn connect(device: DeviceInfo, config: &GvcpBusConfig) -> Result<Self> {
        let remote = SocketAddrV4::new(device.current_ip, config.port);
        let local = SocketAddrV4::new(*config.bind.ip(), 0);
        debug!("Connecting to {} at {remote}", device.mac);

        let mut channel = GvcpUdpChannel::new();
        channel.connect(local, remote).await?;

        let mut camera = Self {
            device,
            config: config.clone(),
            channel,
            request_ids: RequestIds::random(),
            privileged: false,
        };

        camera
            .write_register(
                Register::ControlChannelPrivilege.address(),
                Register::CCP_CONTROL,
            )
            .await
            .context("Failed to claim control privilege")?;
        camera.privileged = true;
        Ok(camera)
    }

    /// The discovery record this connection was made from.
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Reads several registers in one `READREG` command.
    pub async fn read_registers(&mut self, addresses: &[u32]) -> Result<Vec<RegisterWord>> {
        let cmd = GvcpCommand::read_registers(self.request_ids.next(), addresses)?;
        let ack = transact(&self.channel, None, &cmd, &self.config).await?;
        let AckPayload::ReadRegister(values) = ack.payload else {
            return Err(Error::UnexpectedResponse);
        };

        if values.len() != addresses.len() {
            error!(
                "asked for {} register(s), got {}",
                addresses.len(),
                values.len()
            );
            return Err(Error::UnexpectedResponse);
        }

        Ok(values)
    }

    /// Releases control privilege without waiting for an acknowledgement.
    ///
    /// This takes ownership of the socket, because this isn't run in an async
    /// context, and the tokio runtime may be shutting down.
    fn release_blocking(&mut self) -> Result {
        self.privileged = false;
        let mut cmd = GvcpCommand::write_registers(
            self.request_ids.next(),
            &[RegisterWrite::new(
                Register::ControlChannelPrivilege.address(),
                Register::CCP_RELEASE,
            )],
        )?;
        cmd.flags.remove(CommandFlags::ACK_REQUIRED);

        let sock = self.channel.take_std_socket()?;
        sock.set_nonblocking(false)?;
        sock.set_write_timeout(Some(self.config.control_timeout).filter(|t| !t.is_zero()))?;
        sock.send(&encode(&cmd)?)?;

        debug!("Released control privilege on {}", self.device.mac);
        Ok(())
    }
}

impl Drop for GvcpCamera {
    fn drop(&mut self) {
        if self.privileged {
            if let Err(e) = self.release_blocking() {
                warn!(
                    "could not release control privilege on {}: {e}",
                    self.device.mac
                );
            }
        }
    }
}

#[async_trait(?Send)]
impl Camera for GvcpCamera {
    /// Combines the discovery record with the current network configuration,
    /// read fresh from the camera.
    async fn info(&mut self) -> Result<CameraInfo> {
        let current = self
            .read_registers(&[
                Register::CurrentIpAddress.address(),
                Register::CurrentSubnetMask.address(),
                Register::CurrentGateway.address(),
            ])
            .await?;
        let &[ip, mask, gateway] = current.as_slice() else {
            return Err(Error::UnexpectedResponse);
        };

        let d = &self.device;
        Ok(CameraInfo {
            serial_number: d.serial_number.clone(),
            model_name: d.model_name.clone(),
            vendor_name: d.manufacturer_name.clone(),
            sensor_info: None,
            sensor_resolution: None,
            is_color_camera: None,
            firmware_version: d.device_version.clone(),
            mac: d.mac,
            ip_address: ip_from_register(ip),
            subnet_mask: ip_from_register(mask),
            default_gateway: ip_from_register(gateway),
        })
    }

    async fn read_register(&mut self, address: u32) -> Result<RegisterWord> {
        self.read_registers(&[address])
            .await?
            .first()
            .copied()
            .ok_or(Error::UnexpectedResponse)
    }

    async fn write_register(&mut self, address: u32, value: RegisterWord) -> Result {
        let cmd = GvcpCommand::write_registers(
            self.request_ids.next(),
            &[RegisterWrite::new(address, value)],
        )?;
        let ack = transact(&self.channel, None, &cmd, &self.config).await?;
        match ack.payload {
            AckPayload::WriteRegister { index: 1 } => Ok(()),
            AckPayload::WriteRegister { index } => {
                error!("write of {address:#06x} acknowledged with index {index}");
                Err(Error::UnexpectedResponse)
            }
            _ => Err(Error::UnexpectedResponse),
        }
    }
}
