//! GVCP device emulator on the loopback interface, for exercising the
//! network code without a camera.
use crate::{
    protocol::{
        ip_from_register, register_from_ip, AckPayload, CommandPayload, DeviceInfo, GvcpAck,
        GvcpCommand, MacAddress, NetworkMode, Register, RegisterWord,
    },
    GvcpBusConfig,
};
use binrw::{BinRead, BinWrite};
use std::{
    collections::HashMap,
    io::Cursor,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::{net::UdpSocket, task::JoinHandle};

const ERROR_INVALID_ADDRESS: u16 = 0x8003;
const ERROR_ACCESS_DENIED: u16 = 0x8006;

#[derive(Debug)]
pub struct EmulatorState {
    pub device: DeviceInfo,
    pub registers: HashMap<u32, RegisterWord>,
    pub discovery_count: usize,
    pub force_ip_count: usize,
    /// Every value written to the control channel privilege register.
    pub ccp_history: Vec<RegisterWord>,
    /// Ignore the next `n` commands.
    pub drop_next: usize,
    /// Don't answer discovery.
    pub silent: bool,
    /// Other devices which answer discovery, in this order, after this one.
    /// They don't answer anything else.
    pub neighbours: Vec<DeviceInfo>,
    /// Answer writes with `PENDING_ACK` for `.0` ms, then acknowledge after
    /// `.1`.
    pub pending: Option<(u16, Duration)>,
}

impl EmulatorState {
    fn new(device: DeviceInfo) -> Self {
        let registers = HashMap::from([
            (Register::CurrentIpAddress.address(), register_from_ip(device.current_ip)),
            (Register::CurrentSubnetMask.address(), register_from_ip(device.subnet_mask)),
            (Register::CurrentGateway.address(), register_from_ip(device.default_gateway)),
            // DHCP and link-local enabled, persistent disabled.
            (Register::NetworkMode.address(), 0x6000_0000),
            (Register::IpAddress.address(), 0),
            (Register::SubnetMask.address(), 0),
            (Register::Gateway.address(), 0),
            (Register::ControlChannelPrivilege.address(), 0),
        ]);

        Self {
            device,
            registers,
            discovery_count: 0,
            force_ip_count: 0,
            ccp_history: Vec::new(),
            drop_next: 0,
            silent: false,
            neighbours: Vec::new(),
            pending: None,
        }
    }

    fn register(&self, reg: Register) -> RegisterWord {
        self.registers.get(&reg.address()).copied().unwrap_or_default()
    }

    fn set_current(&mut self, ip: Ipv4Addr, mask: Ipv4Addr, gateway: Ipv4Addr) {
        self.device.current_ip = ip;
        self.device.subnet_mask = mask;
        self.device.default_gateway = gateway;
        for (reg, addr) in [
            (Register::CurrentIpAddress, ip),
            (Register::CurrentSubnetMask, mask),
            (Register::CurrentGateway, gateway),
        ] {
            self.registers.insert(reg.address(), register_from_ip(addr));
        }
    }

    /// Restarts the IP configuration cycle: the persistent address wins if
    /// it's enabled and set, otherwise the current address is kept.
    fn renegotiate(&mut self) {
        let mode = NetworkMode::from_register(self.register(Register::NetworkMode));
        let ip = self.register(Register::IpAddress);
        if mode.persistent() && ip != 0 {
            self.set_current(
                ip_from_register(ip),
                ip_from_register(self.register(Register::SubnetMask)),
                ip_from_register(self.register(Register::Gateway)),
            );
        }
    }

    /// Handles a command, returning the acknowledgements to send and how long
    /// to wait before sending each.
    fn handle(&mut self, cmd: &GvcpCommand) -> Vec<(GvcpAck, Duration)> {
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return vec![];
        }

        let (status, payload) = match &cmd.payload {
            CommandPayload::Discovery => {
                if self.silent {
                    return vec![];
                }
                self.discovery_count += 1;
                return std::iter::once(&self.device)
                    .chain(&self.neighbours)
                    .map(|d| {
                        let ack =
                            GvcpAck::success(cmd.request_id, AckPayload::Discovery(d.clone()));
                        (ack, Duration::ZERO)
                    })
                    .collect();
            }

            CommandPayload::ForceIp(force_ip) => {
                if force_ip.mac != self.device.mac {
                    return vec![];
                }
                self.force_ip_count += 1;
                if force_ip.is_restart() {
                    self.renegotiate();
                } else {
                    self.set_current(
                        force_ip.ip,
                        force_ip.subnet_mask,
                        force_ip.default_gateway,
                    );
                }
                (0, AckPayload::ForceIp)
            }

            CommandPayload::ReadRegister(addresses) => {
                let mut status = 0;
                let mut values = Vec::with_capacity(addresses.len());
                for address in addresses {
                    match self.registers.get(address) {
                        Some(v) => values.push(*v),
                        None => {
                            status = ERROR_INVALID_ADDRESS;
                            break;
                        }
                    }
                }
                (status, AckPayload::ReadRegister(values))
            }

            CommandPayload::WriteRegister(writes) => {
                let ccp = Register::ControlChannelPrivilege.address();
                let mut status = 0;
                let mut index = 0;
                for write in writes {
                    let privileged = self.register(Register::ControlChannelPrivilege)
                        == Register::CCP_CONTROL;
                    if write.address != ccp && !privileged {
                        status = ERROR_ACCESS_DENIED;
                        break;
                    }
                    if !self.registers.contains_key(&write.address) {
                        status = ERROR_INVALID_ADDRESS;
                        break;
                    }
                    if write.address == ccp {
                        self.ccp_history.push(write.value);
                    }
                    self.registers.insert(write.address, write.value);
                    index += 1;
                }
                (status, AckPayload::WriteRegister { index })
            }
        };

        if !cmd.ack_required() {
            return vec![];
        }

        let mut replies = vec![];
        let mut delay = Duration::ZERO;
        if let (Some((ms, d)), CommandPayload::WriteRegister(_)) = (self.pending, &cmd.payload) {
            replies.push((
                GvcpAck::success(
                    cmd.request_id,
                    AckPayload::Pending {
                        time_to_completion_ms: ms,
                    },
                ),
                Duration::ZERO,
            ));
            delay = d;
        }
        replies.push((GvcpAck::new(status, cmd.request_id, payload), delay));
        replies
    }
}

pub fn device() -> DeviceInfo {
    DeviceInfo {
        spec_version_major: 2,
        spec_version_minor: 0,
        device_mode: 0x8000_0001,
        mac: MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
        ip_config_options: 0x8000_0007,
        ip_config_current: 0x0000_0006,
        current_ip: Ipv4Addr::LOCALHOST,
        subnet_mask: Ipv4Addr::new(255, 0, 0, 0),
        default_gateway: Ipv4Addr::new(127, 0, 0, 1),
        manufacturer_name: "gevconfig".to_string(),
        model_name: "Emulated GigE Camera".to_string(),
        device_version: "0.1".to_string(),
        manufacturer_info: String::new(),
        serial_number: "EMU0001".to_string(),
        user_defined_name: String::new(),
    }
}

pub struct Emulator {
    addr: SocketAddrV4,
    state: Arc<Mutex<EmulatorState>>,
    task: JoinHandle<()>,
}

impl Emulator {
    pub async fn spawn() -> Self {
        let sock = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let SocketAddr::V4(addr) = sock.local_addr().unwrap() else {
            unreachable!();
        };
        let state = Arc::new(Mutex::new(EmulatorState::new(device())));

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            let mut b = [0u8; 1500];
            loop {
                let Ok((l, src)) = sock.recv_from(&mut b).await else {
                    return;
                };
                let Ok(cmd) = GvcpCommand::read(&mut Cursor::new(&b[..l])) else {
                    continue;
                };
                let replies = task_state.lock().unwrap().handle(&cmd);
                for (ack, delay) in replies {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let mut out = Cursor::new(Vec::new());
                    ack.write(&mut out).unwrap();
                    let _ = sock.send_to(&out.into_inner(), src).await;
                }
            }
        });

        Self { addr, state, task }
    }

    /// Bus settings which reach only this emulator.
    pub fn config(&self) -> GvcpBusConfig {
        GvcpBusConfig {
            bind: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            broadcast: self.addr,
            port: self.addr.port(),
            discovery_timeout: Duration::from_millis(200),
            control_timeout: Duration::from_millis(500),
            retransmits: 0,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, EmulatorState> {
        self.state.lock().unwrap()
    }

    pub fn device(&self) -> DeviceInfo {
        self.state().device.clone()
    }

    pub fn register(&self, reg: Register) -> Option<RegisterWord> {
        self.state().registers.get(&reg.address()).copied()
    }

    /// Waits up to a second for `f` to hold.
    pub async fn wait_for(&self, f: impl Fn(&EmulatorState) -> bool) {
        for _ in 0..100 {
            if f(&self.state()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("emulator never reached the expected state: {:?}", self.state());
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}
