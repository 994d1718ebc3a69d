//! Test scenarios for the AXI-Lite bridge. Each one takes the `dut` scope built by
//! [`crate::dut::build`] and runs in its own simulation.

use crate::axi::{
    random_bool, AwBeat, AxiError, AxiLiteBus, AxiLiteMaster, AxiLiteRam, AxiProtocolChecker, ChannelMonitor,
    MasterConfig, Outcome, TxnState, WBeat, WriteOrdering,
};
use crate::check;
use crate::signal::SimObject;
use crate::testbench::{clock, reset_pulse, Scoreboard};
use crate::trigger::Trigger;
use crate::utils::clock_cycles;
use crate::value::Val;
use crate::TbResult;

/// Handles and parameters shared by the scenarios.
struct Bench {
    dut: SimObject,
    clk: SimObject,
    master: AxiLiteMaster,
    base: u64,
    region: u64,
    width: usize,
}

impl Bench {
    fn new(dut: &SimObject, config: MasterConfig) -> Result<Self, Val> {
        let clk = dut.c("aclk");
        let master = AxiLiteMaster::with_config(
            AxiLiteBus::from_prefix(dut, "s_axi")?,
            clk.clone(),
            Some(dut.c("arstn")),
            false,
            config,
        );
        Ok(Bench {
            dut: dut.clone(),
            clk,
            master,
            base: dut.c("SLAVE_ADDRESS").u64(),
            region: dut.c("SLAVE_REGION").u64(),
            width: dut.c("BUS_WIDTH").u64() as usize,
        })
    }

    fn start_clock(&self) {
        let period = self.dut.sim().config().clock_period_ns as u32;
        self.dut.sim().fork(clock(self.clk.clone(), period, "ns"));
    }

    /// Memory behind `m_axi`, one word larger than the bridge window.
    fn ram(&self) -> Result<AxiLiteRam, Val> {
        Ok(AxiLiteRam::new(
            AxiLiteBus::from_prefix(&self.dut, "m_axi")?,
            self.clk.clone(),
            Some(self.dut.c("arstn")),
            false,
            (self.region as usize + 1) * self.width,
        ))
    }

    async fn reset(&self) -> TbResult {
        let duration = self.dut.sim().config().reset_ns;
        reset_pulse(self.dut.c("arstn"), false, duration, "ns").await
    }

    /// Word offsets 4, 8, ... below the end of the window.
    fn offsets(&self) -> impl Iterator<Item = u64> {
        (self.width as u64..self.region).step_by(self.width)
    }

    fn payload(&self, x: u64) -> Vec<u8> {
        x.to_le_bytes()[..self.width].to_vec()
    }

    /// Writes `x` to offset `x` for every offset and checks the memory after each write.
    async fn increment_writes(&self, ram: &AxiLiteRam) -> TbResult {
        for x in self.offsets() {
            let payload = self.payload(x);
            let resp = self.master.write(self.base + x, &payload).await?;
            check!(resp.outcome == Outcome::Ok, "write to {:#x} answered {:?}", x, resp.outcome);
            let data = ram.read(x, self.width)?;
            check!(
                data == payload,
                "Data written to RAM does not match read data.\n{}",
                ram.hexdump(x, self.width, "RAM_")?
            );
        }
        Ok(Val::None)
    }

    /// Issues writes nobody answers downstream and waits for the bridge to give up on each.
    async fn unanswered_writes(&self) -> TbResult {
        let wvalid = self.dut.c("s_axi_wvalid");
        let connected = self.dut.c("connected");
        for x in self.offsets() {
            let handle = self.master.init_write(self.base + x, &self.payload(x))?;
            self.clk.rising_edge().await;
            connected.falling_edge().await;
            check!(wvalid.u64() == 0, "Valid data is present.");
            self.master.write_if.aw_channel().clear();
            self.clk.rising_edge().await;
            let resp = handle.await?;
            check!(resp.outcome == Outcome::SlvErr, "abandoned write answered {:?}", resp.outcome);
        }
        Ok(Val::None)
    }
}

pub async fn increment_test_write(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    tb.reset().await?;
    tb.increment_writes(&ram).await
}

pub async fn increment_test_random_ready_write_data(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    ram.write_if
        .w_channel()
        .set_pause_generator(random_bool(&mut *dut.sim().rng().get()));
    tb.reset().await?;
    tb.increment_writes(&ram).await
}

pub async fn increment_test_random_ready_write_addr(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    ram.write_if
        .aw_channel()
        .set_pause_generator(random_bool(&mut *dut.sim().rng().get()));
    tb.reset().await?;
    tb.increment_writes(&ram).await
}

pub async fn increment_test_random_ready_read_addr(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    ram.read_if
        .ar_channel()
        .set_pause_generator(random_bool(&mut *dut.sim().rng().get()));
    tb.reset().await?;
    for x in tb.offsets() {
        let payload = tb.payload(x);
        ram.write(x, &payload)?;
        let resp = tb.master.read(tb.base + x, tb.width).await?;
        check!(resp.outcome == Outcome::Ok, "read of {:#x} answered {:?}", x, resp.outcome);
        check!(resp.data == payload, "read {:02x?} from {:#x}, expected {:02x?}", resp.data, x, payload);
    }
    Ok(Val::None)
}

pub async fn increment_test_timeout_no_answer(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    dut.c("m_axi_bvalid").force(0);
    tb.reset().await?;
    tb.unanswered_writes().await
}

pub async fn increment_test_random_ready_timeout_no_answer(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    dut.c("m_axi_bvalid").force(0);
    tb.master
        .write_if
        .w_channel()
        .set_pause_generator(random_bool(&mut *dut.sim().rng().get()));
    tb.reset().await?;
    tb.unanswered_writes().await
}

/// The bridge keeps its master-facing ready outputs undriven while in reset.
pub async fn in_reset(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    dut.c("arstn").set(0);
    Trigger::timer(dut.sim(), 100, "ns").await;
    check!(dut.c("s_axi_awready").is_z(), "s_axi_awready is not z!");
    check!(dut.c("s_axi_wready").is_z(), "s_axi_wready is not z!");
    check!(dut.c("s_axi_arready").is_z(), "s_axi_arready is not z!");
    Ok(Val::None)
}

/// Without a clock nothing is ever driven.
pub async fn no_clock(dut: SimObject) -> TbResult {
    dut.c("arstn").set(0);
    Trigger::timer(dut.sim(), 100, "ns").await;
    check!(dut.c("s_axi_awready").is_z(), "s_axi_awready is not z!");
    check!(dut.c("m_axi_awvalid").is_z(), "m_axi_awvalid is not z!");
    Ok(Val::None)
}

pub async fn write_read_back(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    tb.reset().await?;
    let data: Vec<u8> = (0..tb.region as u8).map(|b| b.wrapping_mul(7)).collect();
    let resp = tb.master.write(tb.base, &data).await?;
    check!(resp.outcome == Outcome::Ok, "burst write answered {:?}", resp.outcome);
    let resp = tb.master.read(tb.base, data.len()).await?;
    check!(resp.outcome == Outcome::Ok, "burst read answered {:?}", resp.outcome);
    check!(resp.data == data, "read back {:02x?}", resp.data);
    // unaligned start, one partial word at either end
    let patch = vec![0xa5; tb.width];
    tb.master.write(tb.base + 2, &patch).await?;
    let expected: Vec<u8> = data
        .iter()
        .enumerate()
        .map(|(i, b)| match (2..2 + tb.width).contains(&i) {
            true => 0xa5,
            false => *b,
        })
        .collect();
    check!(ram.read(0, data.len())? == expected, "{}", ram.hexdump(0, data.len(), "RAM_")?);
    Ok(Val::None)
}

pub async fn out_of_region_decerr(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    tb.reset().await?;
    let outside = tb.base + tb.region;
    let resp = tb.master.write(outside, &tb.payload(0x55)).await?;
    check!(resp.outcome == Outcome::DecErr, "write outside answered {:?}", resp.outcome);
    let resp = tb.master.read(tb.base - tb.width as u64, tb.width).await?;
    check!(resp.outcome == Outcome::DecErr, "read outside answered {:?}", resp.outcome);
    check!(ram.write_if.aw_channel().received() == 0, "rejected write reached m_axi");
    check!(ram.read_if.ar_channel().received() == 0, "rejected read reached m_axi");
    // bad lengths never reach the bus
    let err = tb.master.write(tb.base, &[1, 2, 3]).await;
    check!(matches!(err, Err(AxiError::Alignment { .. })), "3 byte write gave {:?}", err);
    Ok(Val::None)
}

/// A write dropped before the bridge saw it leaves the memory untouched.
pub async fn clear_before_accept(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    tb.reset().await?;
    let handle = tb.master.init_write(tb.base + 8, &tb.payload(0x77))?;
    tb.master.write_if.aw_channel().clear();
    tb.master.write_if.w_channel().clear();
    clock_cycles(tb.clk.clone(), 10).await?;
    check!(handle.state() == TxnState::Idle, "cleared write is {:?}", handle.state());
    check!(tb.master.idle(), "master still busy");
    let result = handle.await;
    check!(matches!(result, Err(AxiError::Cancelled { .. })), "cleared write gave {:?}", result);
    check!(ram.read(8, tb.width)? == vec![0; tb.width], "cleared write reached memory");
    check!(ram.write_if.aw_channel().received() == 0, "cleared write reached m_axi");
    Ok(Val::None)
}

/// Downstream beats carry the window offset and the unchanged write data.
pub async fn address_translation(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let _ram = tb.ram()?;
    let m_axi = AxiLiteBus::from_prefix(&dut, "m_axi")?;
    let aw_mon = ChannelMonitor::<AwBeat>::new(m_axi.aw.clone(), tb.clk.clone(), Some(dut.c("arstn")), false);
    let w_mon = ChannelMonitor::<WBeat>::new(m_axi.w.clone(), tb.clk.clone(), Some(dut.c("arstn")), false);
    let aw_sb = Scoreboard::new();
    let w_sb = Scoreboard::new();
    aw_mon.mon.set_scoreboard(aw_sb.clone(), false);
    w_mon.mon.set_scoreboard(w_sb.clone(), false);
    tb.reset().await?;

    let strb = ((1u16 << tb.width) - 1) as u8;
    for x in tb.offsets() {
        aw_sb.add_exp(AwBeat { addr: x, prot: 0 });
        w_sb.add_exp(WBeat { data: x, strb });
        tb.master.write(tb.base + x, &tb.payload(x)).await?;
    }
    clock_cycles(tb.clk.clone(), 4).await?;
    aw_sb.result()?;
    w_sb.result()?;
    Ok(Val::None)
}

/// Randomized back-pressure on every channel must never break the handshake rules.
pub async fn protocol_checks_under_stalls(dut: SimObject) -> TbResult {
    let tb = Bench::new(&dut, MasterConfig::default())?;
    tb.start_clock();
    let ram = tb.ram()?;
    let rstn = Some(dut.c("arstn"));
    let upstream = AxiProtocolChecker::new(&AxiLiteBus::from_prefix(&dut, "s_axi")?, tb.clk.clone(), rstn.clone(), false);
    let downstream = AxiProtocolChecker::new(&AxiLiteBus::from_prefix(&dut, "m_axi")?, tb.clk.clone(), rstn, false);
    {
        let rng = dut.sim().rng();
        let mut rng = rng.get();
        ram.write_if.aw_channel().set_pause_generator(random_bool(&mut *rng));
        ram.write_if.w_channel().set_pause_generator(random_bool(&mut *rng));
        ram.write_if.b_channel().set_pause_generator(random_bool(&mut *rng));
        ram.read_if.r_channel().set_pause_generator(random_bool(&mut *rng));
        tb.master.write_if.w_channel().set_pause_generator(random_bool(&mut *rng));
        tb.master.read_if.r_channel().set_pause_generator(random_bool(&mut *rng));
    }
    tb.reset().await?;
    for x in tb.offsets() {
        let payload = tb.payload(x);
        tb.master.write(tb.base + x, &payload).await?;
        let resp = tb.master.read(tb.base + x, tb.width).await?;
        check!(resp.data == payload, "read back {:02x?} from {:#x}", resp.data, x);
    }
    let violations: Vec<AxiError> = upstream
        .violations()
        .into_iter()
        .chain(downstream.violations())
        .collect();
    check!(violations.is_empty(), "protocol violations: {:?}", violations);
    check!(upstream.checks() > 0 && downstream.checks() > 0, "checker never ran");
    Ok(Val::None)
}

/// Address-first ordering and a master-side response budget.
pub async fn master_timeout_budget(dut: SimObject) -> TbResult {
    let config = MasterConfig {
        ordering: WriteOrdering::AddressFirst,
        timeout_cycles: Some(8),
        prot: 0,
    };
    let tb = Bench::new(&dut, config)?;
    tb.start_clock();
    let ram = tb.ram()?;
    tb.reset().await?;
    tb.increment_writes(&ram).await?;

    // the bridge waits longer for a response than the master does
    dut.c("m_axi_bvalid").force(0);
    let resp = tb.master.write(tb.base, &tb.payload(1)).await?;
    check!(resp.outcome == Outcome::Timeout, "stalled write answered {:?}", resp.outcome);
    Ok(Val::None)
}
