use crate::signal::SimObject;
use crate::tb_obj::TbObj;
use crate::value::Val;
use crate::TbResult;

use super::channel::ResetSignal;
use super::{ArBeat, AwBeat, AxiError, AxiLiteBus, BBeat, MemoryRegion, RBeat, Resp, Sink, Source, WBeat};

#[derive(Clone)]
pub struct AxiLiteRamWrite {
    aw_channel: Sink<AwBeat>,
    w_channel: Sink<WBeat>,
    b_channel: Source<BBeat>,
}

impl AxiLiteRamWrite {
    pub fn aw_channel(&self) -> &Sink<AwBeat> {
        &self.aw_channel
    }
    pub fn w_channel(&self) -> &Sink<WBeat> {
        &self.w_channel
    }
    pub fn b_channel(&self) -> &Source<BBeat> {
        &self.b_channel
    }
    pub fn idle(&self) -> bool {
        self.aw_channel.idle() && self.w_channel.idle() && self.b_channel.idle()
    }
}

#[derive(Clone)]
pub struct AxiLiteRamRead {
    ar_channel: Sink<ArBeat>,
    r_channel: Source<RBeat>,
}

impl AxiLiteRamRead {
    pub fn ar_channel(&self) -> &Sink<ArBeat> {
        &self.ar_channel
    }
    pub fn r_channel(&self) -> &Source<RBeat> {
        &self.r_channel
    }
    pub fn idle(&self) -> bool {
        self.ar_channel.idle() && self.r_channel.idle()
    }
}

/// AXI-Lite slave answering from a [`MemoryRegion`]. Bus addresses are offsets into the
/// memory; accesses outside of it answer SLVERR.
#[derive(Clone)]
pub struct AxiLiteRam {
    pub write_if: AxiLiteRamWrite,
    pub read_if: AxiLiteRamRead,
    mem: TbObj<MemoryRegion>,
    width: usize,
}

impl AxiLiteRam {
    pub fn new(bus: AxiLiteBus, clk: SimObject, rst: Option<SimObject>, reset_active_level: bool, size: usize) -> Self {
        let rst = ResetSignal::new(rst, reset_active_level);
        let label = &bus.prefix;
        let ram = AxiLiteRam {
            write_if: AxiLiteRamWrite {
                aw_channel: Sink::new(bus.aw.clone(), &clk, rst.clone(), label),
                w_channel: Sink::new(bus.w.clone(), &clk, rst.clone(), label),
                b_channel: Source::new(bus.b.clone(), &clk, rst.clone(), label),
            },
            read_if: AxiLiteRamRead {
                ar_channel: Sink::new(bus.ar.clone(), &clk, rst.clone(), label),
                r_channel: Source::new(bus.r.clone(), &clk, rst, label),
            },
            mem: TbObj::new(MemoryRegion::new(size)),
            width: bus.width_bytes,
        };
        let sim = clk.sim();
        sim.spawn(&format!("{}_ram_write", label), ram.clone().serve_writes(clk.clone()));
        sim.spawn(&format!("{}_ram_read", label), ram.clone().serve_reads(clk.clone()));
        ram
    }

    fn word_address(&self, addr: u64) -> u64 {
        addr & !(self.width as u64 - 1)
    }

    #[allow(unreachable_code)]
    async fn serve_writes(self, clk: SimObject) -> TbResult {
        loop {
            let aw = self.write_if.aw_channel.recv().await;
            let w = self.write_if.w_channel.recv().await;
            let addr = self.word_address(aw.addr);
            let resp = match self.mem.get().write_strobed(addr, w.data, w.strb, self.width) {
                Ok(()) => Resp::Okay,
                Err(e) => {
                    clk.sim().warn(&format!("RAM write answered SLVERR: {}", e));
                    Resp::SlvErr
                }
            };
            clk.sim()
                .debug(|| format!("RAM write {:#x} = {:#x} strb {:#b}", addr, w.data, w.strb));
            let _ = self.write_if.b_channel.send(BBeat { resp });
        }
        Ok(Val::None)
    }

    #[allow(unreachable_code)]
    async fn serve_reads(self, clk: SimObject) -> TbResult {
        loop {
            let ar = self.read_if.ar_channel.recv().await;
            let addr = self.word_address(ar.addr);
            let word = self.mem.get().read_word(addr, self.width);
            let beat = match word {
                Ok(data) => RBeat { data, resp: Resp::Okay },
                Err(e) => {
                    clk.sim().warn(&format!("RAM read answered SLVERR: {}", e));
                    RBeat {
                        data: 0,
                        resp: Resp::SlvErr,
                    }
                }
            };
            clk.sim()
                .debug(|| format!("RAM read {:#x} = {:#x}", addr, beat.data));
            let _ = self.read_if.r_channel.send(beat);
        }
        Ok(Val::None)
    }

    /// Direct access, not a bus transaction.
    pub fn read(&self, address: u64, length: usize) -> Result<Vec<u8>, AxiError> {
        self.mem.get().read(address, length)
    }

    /// Direct access, not a bus transaction.
    pub fn write(&self, address: u64, data: &[u8]) -> Result<(), AxiError> {
        self.mem.get().write(address, data)
    }

    pub fn hexdump(&self, address: u64, length: usize, prefix: &str) -> Result<String, AxiError> {
        self.mem.get().hexdump(address, length, prefix)
    }

    pub fn size(&self) -> usize {
        self.mem.get().size()
    }

    pub fn idle(&self) -> bool {
        self.write_if.idle() && self.read_if.idle()
    }
}
