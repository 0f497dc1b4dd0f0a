//! In-memory [`CameraBus`], which records every call made to it.
use crate::{
    bus::{Camera, CameraBus, CameraInfo},
    protocol::{register_from_ip, Error as ProtocolError, MacAddress, Register, RegisterWord},
    Error, Result,
};
use async_trait::async_trait;
use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io::{Error as IoError, ErrorKind},
    net::Ipv4Addr,
    rc::Rc,
};

const ERROR_INVALID_ADDRESS: u16 = 0x8003;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enumerate,
    Connect(usize),
    Info(usize),
    Read(usize, u32),
    Write(usize, u32, RegisterWord),
    Disconnect(usize),
    ForceIp,
    Rescan,
}

#[derive(Debug)]
pub struct FakeCameraState {
    pub info: CameraInfo,
    pub registers: HashMap<u32, RegisterWord>,
    pub fail_info: bool,
    /// Writes to this address fail with `ACCESS_DENIED`.
    pub deny_write: Option<u32>,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub cameras: Vec<FakeCameraState>,
    /// How many of `cameras` the last scan found.
    pub visible: usize,
    /// Values for `visible` on each rescan. When empty, every camera is
    /// visible.
    pub rescan_script: VecDeque<usize>,
    /// Fail this many of the next rescans, leaving `visible` unchanged.
    pub fail_rescan: usize,
    pub fail_force: bool,
    pub calls: Vec<Call>,
}

impl FakeState {
    /// Writes made to a camera, in order.
    pub fn writes(&self, camera: usize) -> Vec<(u32, RegisterWord)> {
        self.calls
            .iter()
            .filter_map(|c| match *c {
                Call::Write(i, address, value) if i == camera => Some((address, value)),
                _ => None,
            })
            .collect()
    }

    /// Calls which touch a camera.
    pub fn camera_calls(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| !matches!(c, Call::Enumerate | Call::ForceIp | Call::Rescan))
            .count()
    }
}

#[derive(Clone, Default)]
pub struct FakeBus {
    pub state: Rc<RefCell<FakeState>>,
}

impl FakeBus {
    pub fn new(cameras: impl IntoIterator<Item = CameraInfo>) -> Self {
        let cameras: Vec<FakeCameraState> = cameras
            .into_iter()
            .map(|info| {
                let registers = HashMap::from([
                    (Register::NetworkMode.address(), 0x6000_0000),
                    // Left over from a previous configuration.
                    (Register::IpAddress.address(), 0xa9fe_0a0b),
                    (Register::SubnetMask.address(), 0xffff_0000),
                    (Register::Gateway.address(), 0),
                    (
                        Register::CurrentIpAddress.address(),
                        register_from_ip(info.ip_address),
                    ),
                ]);
                FakeCameraState {
                    info,
                    registers,
                    fail_info: false,
                    deny_write: None,
                }
            })
            .collect();

        let visible = cameras.len();
        Self {
            state: Rc::new(RefCell::new(FakeState {
                cameras,
                visible,
                ..Default::default()
            })),
        }
    }

    pub fn register(&self, camera: usize, reg: Register) -> Option<RegisterWord> {
        self.state.borrow().cameras[camera]
            .registers
            .get(&reg.address())
            .copied()
    }
}

#[async_trait(?Send)]
impl CameraBus for FakeBus {
    type Handle = usize;
    type Camera = FakeCamera;

    async fn enumerate(&mut self) -> Result<Vec<usize>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Enumerate);
        Ok((0..state.visible).collect())
    }

    async fn connect(&mut self, handle: &usize) -> Result<FakeCamera> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Connect(*handle));
        if *handle >= state.visible {
            return Err(Error::Timeout);
        }
        Ok(FakeCamera {
            index: *handle,
            state: self.state.clone(),
        })
    }

    async fn force_all_ip_addresses_automatically(&mut self) -> Result {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::ForceIp);
        if state.fail_force {
            return Err(Error::Timeout);
        }
        Ok(())
    }

    async fn rescan(&mut self) -> Result {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Rescan);
        if state.fail_rescan > 0 {
            state.fail_rescan -= 1;
            return Err(IoError::new(ErrorKind::InvalidInput, "Invalid argument").into());
        }
        state.visible = match state.rescan_script.pop_front() {
            Some(n) => n.min(state.cameras.len()),
            None => state.cameras.len(),
        };
        Ok(())
    }
}

pub struct FakeCamera {
    index: usize,
    state: Rc<RefCell<FakeState>>,
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.state
            .borrow_mut()
            .calls
            .push(Call::Disconnect(self.index));
    }
}

#[async_trait(?Send)]
impl Camera for FakeCamera {
    async fn info(&mut self) -> Result<CameraInfo> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Info(self.index));
        let camera = &state.cameras[self.index];
        if camera.fail_info {
            return Err(Error::Timeout);
        }
        Ok(camera.info.clone())
    }

    async fn read_register(&mut self, address: u32) -> Result<RegisterWord> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Read(self.index, address));
        state.cameras[self.index]
            .registers
            .get(&address)
            .copied()
            .ok_or(ProtocolError::DeviceStatus(ERROR_INVALID_ADDRESS).into())
    }

    async fn write_register(&mut self, address: u32, value: RegisterWord) -> Result {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Write(self.index, address, value));
        let camera = &mut state.cameras[self.index];
        if camera.deny_write == Some(address) {
            return Err(ProtocolError::DeviceStatus(0x8006).into());
        }
        camera.registers.insert(address, value);
        Ok(())
    }
}

/// A camera at `ip`, with a default gateway of `gateway`.
pub fn camera(serial: &str, ip: Ipv4Addr, gateway: Ipv4Addr) -> CameraInfo {
    CameraInfo {
        serial_number: serial.to_string(),
        model_name: "Blackfly BFLY-PGE-23S6C".to_string(),
        vendor_name: "Point Grey Research".to_string(),
        sensor_info: Some("Sony IMX249 (1/1.2\" Color CMOS)".to_string()),
        sensor_resolution: Some("1920x1200".to_string()),
        is_color_camera: Some(true),
        firmware_version: "1.45.3.0".to_string(),
        mac: MacAddress([0x00, 0xb0, 0x9d, 0x01, 0x02, 0x03]),
        ip_address: ip,
        subnet_mask: Ipv4Addr::new(255, 255, 0, 0),
        default_gateway: gateway,
    }
}
