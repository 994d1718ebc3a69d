//! Behavioral model of an AXI-Lite slave-to-master bridge.
//!
//! The bridge accepts requests on `s_axi`, forwards those inside its address window to
//! `m_axi` as offsets from `SLAVE_ADDRESS` and passes the responses back. Requests outside
//! the window answer DECERR without touching `m_axi`; a downstream transaction without a
//! response for `timeout_cycles` is dropped and answered SLVERR.
//!
//! The model is a clocked process: on every rising edge of `aclk` it samples its inputs as
//! they were before the edge and drives its outputs for the next cycle.

use crate::axi::{ArBeat, AwBeat, AxiLiteBus, Beat, RBeat, Resp, WBeat};
use crate::config::ConfigError;
use crate::signal::SimObject;
use crate::sim::Sim;
use crate::value::Val;
use crate::TbResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeParams {
    pub slave_address: u64,
    /// Size of the address window in bytes.
    pub slave_region: u64,
    pub bus_width: usize,
    /// Cycles a forwarded transaction may wait downstream.
    pub timeout_cycles: u32,
}

impl Default for BridgeParams {
    fn default() -> Self {
        BridgeParams {
            slave_address: 0x4000_0000,
            slave_region: 64,
            bus_width: 4,
            timeout_cycles: 32,
        }
    }
}

impl BridgeParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus_width != 4 && self.bus_width != 8 {
            return Err(ConfigError::BusWidth(self.bus_width));
        }
        if self.slave_region == 0 || self.slave_region % self.bus_width as u64 != 0 {
            return Err(ConfigError::Region {
                region: self.slave_region,
                width: self.bus_width,
            });
        }
        Ok(())
    }

    /// Offset of `addr` into the window, if it falls inside.
    pub fn offset(&self, addr: u64) -> Option<u64> {
        addr.checked_sub(self.slave_address)
            .filter(|offset| *offset < self.slave_region)
    }
}

/// Declares the bridge below the root of `sim` and starts it. Returns the `dut` scope
/// holding `aclk`, `arstn`, `connected`, both buses and the parameters.
pub fn build(sim: &Sim, params: &BridgeParams) -> Result<SimObject, ConfigError> {
    params.validate()?;
    let declare = |name: &str| ConfigError::Declare(name.to_string());
    let dut = sim
        .add_scope(&sim.root(), "dut")
        .map_err(|_| declare("dut"))?;
    let net = |name: &str| sim.add_net(&dut, name, 1).map_err(|_| declare(name));
    let aclk = net("aclk")?;
    let arstn = net("arstn")?;
    let connected = net("connected")?;
    let s = AxiLiteBus::declare(sim, &dut, "s_axi", params.bus_width)?;
    let m = AxiLiteBus::declare(sim, &dut, "m_axi", params.bus_width)?;
    let param = |name: &str, value: u64| sim.add_param(&dut, name, 32, value).map_err(|_| declare(name));
    param("SLAVE_REGION", params.slave_region)?;
    param("SLAVE_ADDRESS", params.slave_address)?;
    param("BUS_WIDTH", params.bus_width as u64)?;

    let bridge = Bridge {
        params: *params,
        s,
        m,
        arstn,
        connected,
    };
    sim.spawn("bridge", bridge.run(aclk));
    Ok(dut)
}

#[derive(Debug, Clone, PartialEq)]
enum WritePath {
    Accept {
        aw: Option<AwBeat>,
        w: Option<WBeat>,
    },
    Downstream {
        aw: AwBeat,
        w: WBeat,
        aw_done: bool,
        w_done: bool,
        cycles: u32,
    },
    Respond(Resp),
}

#[derive(Debug, Clone, PartialEq)]
enum ReadPath {
    Accept,
    Downstream { ar: ArBeat, ar_done: bool, cycles: u32 },
    Respond(RBeat),
}

const WRITE_IDLE: WritePath = WritePath::Accept { aw: None, w: None };

struct Bridge {
    params: BridgeParams,
    s: AxiLiteBus,
    m: AxiLiteBus,
    arstn: SimObject,
    connected: SimObject,
}

impl Bridge {
    #[allow(unreachable_code)]
    async fn run(self, aclk: SimObject) -> TbResult {
        let mut write = WRITE_IDLE;
        let mut read = ReadPath::Accept;
        // outputs are undriven until the first edge out of reset
        let mut driving = false;
        loop {
            aclk.rising_edge().await;
            if !self.arstn.is_high() {
                if driving {
                    aclk.sim().debug(|| "bridge in reset".to_string());
                }
                write = WRITE_IDLE;
                read = ReadPath::Accept;
                driving = false;
                self.release();
                continue;
            }
            if driving {
                write = self.step_write(write, &aclk);
                read = self.step_read(read, &aclk);
            }
            self.drive_write(&write);
            self.drive_read(&read);
            let connected = matches!(write, WritePath::Downstream { .. }) || matches!(read, ReadPath::Downstream { .. });
            self.connected.set(connected as u64);
            driving = true;
        }
        Ok(Val::None)
    }

    fn release(&self) {
        for ch in [&self.s.aw, &self.s.w, &self.s.ar, &self.m.b, &self.m.r] {
            ch.release_sink();
        }
        for ch in [&self.s.b, &self.s.r, &self.m.aw, &self.m.w, &self.m.ar] {
            ch.release_source();
        }
        self.connected.set(0);
    }

    fn step_write(&self, state: WritePath, aclk: &SimObject) -> WritePath {
        let (s, m) = (&self.s, &self.m);
        match state {
            WritePath::Accept { mut aw, mut w } => {
                if aw.is_none() && s.aw.valid_high() {
                    aw = Some(AwBeat::from_values(&s.aw.sample()));
                }
                if w.is_none() && s.w.valid_high() {
                    w = Some(WBeat::from_values(&s.w.sample()));
                }
                match (aw, w) {
                    (Some(aw), Some(w)) => match self.params.offset(aw.addr) {
                        Some(offset) => {
                            aclk.sim()
                                .debug(|| format!("bridge forwards write {:#x} as {:#x}", aw.addr, offset));
                            WritePath::Downstream {
                                aw: AwBeat { addr: offset, ..aw },
                                w,
                                aw_done: false,
                                w_done: false,
                                cycles: 0,
                            }
                        }
                        None => {
                            aclk.sim()
                                .debug(|| format!("bridge rejects write {:#x}", aw.addr));
                            WritePath::Respond(Resp::DecErr)
                        }
                    },
                    (aw, w) => WritePath::Accept { aw, w },
                }
            }
            WritePath::Downstream {
                aw,
                w,
                aw_done,
                w_done,
                cycles,
            } => {
                let bready = aw_done && w_done;
                if bready && m.b.valid_high() {
                    return WritePath::Respond(Resp::from_bits(m.b.sample()[0]));
                }
                if cycles + 1 >= self.params.timeout_cycles {
                    aclk.sim()
                        .warn(&format!("bridge write to offset {:#x} timed out", aw.addr));
                    return WritePath::Respond(Resp::SlvErr);
                }
                WritePath::Downstream {
                    aw,
                    w,
                    aw_done: aw_done || m.aw.ready_high(),
                    w_done: w_done || m.w.ready_high(),
                    cycles: cycles + 1,
                }
            }
            WritePath::Respond(resp) => match s.b.ready_high() {
                true => WRITE_IDLE,
                false => WritePath::Respond(resp),
            },
        }
    }

    fn drive_write(&self, state: &WritePath) {
        let (s, m) = (&self.s, &self.m);
        let (aw_ready, w_ready) = match state {
            WritePath::Accept { aw, w } => (aw.is_none(), w.is_none()),
            _ => (false, false),
        };
        s.aw.ready.set(aw_ready as u64);
        s.w.ready.set(w_ready as u64);
        match state {
            WritePath::Downstream {
                aw, w, aw_done, w_done, ..
            } => {
                m.aw.drive(&aw.to_values());
                m.aw.valid.set(!aw_done as u64);
                m.w.drive(&w.to_values());
                m.w.valid.set(!w_done as u64);
                m.b.ready.set((*aw_done && *w_done) as u64);
            }
            _ => {
                m.aw.valid.set(0);
                m.w.valid.set(0);
                m.b.ready.set(0);
            }
        }
        match state {
            WritePath::Respond(resp) => {
                s.b.drive(&[resp.bits()]);
                s.b.valid.set(1);
            }
            _ => s.b.valid.set(0),
        }
    }

    fn step_read(&self, state: ReadPath, aclk: &SimObject) -> ReadPath {
        let (s, m) = (&self.s, &self.m);
        match state {
            ReadPath::Accept if s.ar.valid_high() => {
                let ar = ArBeat::from_values(&s.ar.sample());
                match self.params.offset(ar.addr) {
                    Some(offset) => {
                        aclk.sim()
                            .debug(|| format!("bridge forwards read {:#x} as {:#x}", ar.addr, offset));
                        ReadPath::Downstream {
                            ar: ArBeat { addr: offset, ..ar },
                            ar_done: false,
                            cycles: 0,
                        }
                    }
                    None => {
                        aclk.sim()
                            .debug(|| format!("bridge rejects read {:#x}", ar.addr));
                        ReadPath::Respond(RBeat {
                            data: 0,
                            resp: Resp::DecErr,
                        })
                    }
                }
            }
            ReadPath::Accept => ReadPath::Accept,
            ReadPath::Downstream { ar, ar_done, cycles } => {
                if ar_done && m.r.valid_high() {
                    return ReadPath::Respond(RBeat::from_values(&m.r.sample()));
                }
                if cycles + 1 >= self.params.timeout_cycles {
                    aclk.sim()
                        .warn(&format!("bridge read from offset {:#x} timed out", ar.addr));
                    return ReadPath::Respond(RBeat {
                        data: 0,
                        resp: Resp::SlvErr,
                    });
                }
                ReadPath::Downstream {
                    ar,
                    ar_done: ar_done || m.ar.ready_high(),
                    cycles: cycles + 1,
                }
            }
            ReadPath::Respond(beat) => match s.r.ready_high() {
                true => ReadPath::Accept,
                false => ReadPath::Respond(beat),
            },
        }
    }

    fn drive_read(&self, state: &ReadPath) {
        let (s, m) = (&self.s, &self.m);
        s.ar.ready.set(matches!(state, ReadPath::Accept) as u64);
        match state {
            ReadPath::Downstream { ar, ar_done, .. } => {
                m.ar.drive(&ar.to_values());
                m.ar.valid.set(!ar_done as u64);
                m.r.ready.set(*ar_done as u64);
            }
            _ => {
                m.ar.valid.set(0);
                m.r.ready.set(0);
            }
        }
        match state {
            ReadPath::Respond(beat) => {
                s.r.drive(&beat.to_values());
                s.r.valid.set(1);
            }
            _ => s.r.valid.set(0),
        }
    }
}
