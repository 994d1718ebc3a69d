use axil_tb::prelude::*;
use proptest::prelude::*;

const MEM_SIZE: usize = 256;

struct Direct {
    sim: Sim,
    clk: SimObject,
    master: AxiLiteMaster,
    ram: AxiLiteRam,
    checker: AxiProtocolChecker,
}

/// Master wired straight to a RAM, no bridge in between.
fn direct(width: usize) -> Direct {
    let sim = Sim::new("top", &TbConfig::default());
    let root = sim.root();
    let clk = sim.add_net(&root, "clk", 1).unwrap();
    let bus = AxiLiteBus::declare(&sim, &root, "axil", width).unwrap();
    let checker = AxiProtocolChecker::new(&bus, clk.clone(), None, false);
    let master = AxiLiteMaster::new(bus.clone(), clk.clone(), None, false);
    let ram = AxiLiteRam::new(bus, clk.clone(), None, false, MEM_SIZE);
    Direct {
        sim,
        clk,
        master,
        ram,
        checker,
    }
}

impl Direct {
    fn stall_everything(&self, pattern: &[bool]) {
        let p = || PauseGenerator::new(pattern.to_vec());
        self.master.write_if.aw_channel().set_pause_generator(p());
        self.master.write_if.w_channel().set_pause_generator(p());
        self.master.write_if.b_channel().set_pause_generator(p());
        self.master.read_if.ar_channel().set_pause_generator(p());
        self.master.read_if.r_channel().set_pause_generator(p());
        self.ram.write_if.aw_channel().set_pause_generator(p());
        self.ram.write_if.w_channel().set_pause_generator(p());
        self.ram.write_if.b_channel().set_pause_generator(p());
        self.ram.read_if.ar_channel().set_pause_generator(p());
        self.ram.read_if.r_channel().set_pause_generator(p());
    }

    /// Writes `data` at `address` and reads it back over the bus.
    fn round_trip(&self, address: u64, data: Vec<u8>) -> TbResult {
        let master = self.master.clone();
        let clk = self.clk.clone();
        let sim = self.sim.clone();
        self.sim.run_test(async move {
            sim.fork(clock(clk, 2, "ns"));
            let w = master.write(address, &data).await?;
            check!(w.outcome == Outcome::Ok, "write answered {:?}", w.outcome);
            let r = master.read(address, data.len()).await?;
            check!(r.outcome == Outcome::Ok, "read answered {:?}", r.outcome);
            check!(r.data == data, "read {:02x?}, wrote {:02x?}", r.data, data);
            Ok(Val::Int(sim.time("ns") as i64))
        })
    }
}

fn access(width: usize) -> impl Strategy<Value = (u64, Vec<u8>)> {
    (1..=8usize).prop_flat_map(move |words| {
        let len = words * width;
        (
            0..(MEM_SIZE - len - width) as u64,
            proptest::collection::vec(any::<u8>(), len),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn write_then_read_round_trips((address, data) in access(4)) {
        let bench = direct(4);
        let result = bench.round_trip(address, data.clone());
        prop_assert!(result.is_ok(), "{:?}", result);
        prop_assert_eq!(bench.ram.read(address, data.len()).unwrap(), data);
        prop_assert!(bench.checker.violations().is_empty());
    }

    #[test]
    fn stalls_change_latency_not_data(
        (address, data) in access(8),
        pattern in proptest::collection::vec(any::<bool>(), 1..16),
    ) {
        let smooth = direct(8);
        let smooth_result = smooth.round_trip(address, data.clone());
        prop_assert!(smooth_result.is_ok(), "{:?}", smooth_result);

        let stalled = direct(8);
        // a pattern of only pauses would never hand over a beat
        let mut pattern = pattern;
        pattern.push(false);
        stalled.stall_everything(&pattern);
        let stalled_result = stalled.round_trip(address, data.clone());
        prop_assert!(stalled_result.is_ok(), "{:?}", stalled_result);

        prop_assert_eq!(
            stalled.ram.read(0, MEM_SIZE).unwrap(),
            smooth.ram.read(0, MEM_SIZE).unwrap()
        );
        prop_assert!(stalled.checker.violations().is_empty());
    }
}

#[test]
fn unaligned_length_is_rejected_before_driving() {
    let bench = direct(4);
    let master = bench.master.clone();
    let clk = bench.clk.clone();
    let sim = bench.sim.clone();
    let result = bench.sim.run_test(async move {
        sim.fork(clock(clk.clone(), 2, "ns"));
        let err = master.write(0, &[1, 2, 3]).await;
        check!(matches!(err, Err(axil_tb::axi::AxiError::Alignment { .. })), "got {:?}", err);
        clock_cycles(clk.clone(), 4).await?;
        check!(master.write_if.aw_channel().accepted() == 0, "something was sent");
        check!(master.idle(), "master busy");
        Ok(Val::None)
    });
    assert_eq!(result, Ok(Val::None));
}

#[test]
fn out_of_range_bus_access_answers_slverr() {
    let bench = direct(4);
    let master = bench.master.clone();
    let sim = bench.sim.clone();
    let clk = bench.clk.clone();
    let result = bench.sim.run_test(async move {
        sim.fork(clock(clk, 2, "ns"));
        let w = master.write(MEM_SIZE as u64, &[0; 4]).await?;
        check!(w.outcome == Outcome::SlvErr, "write answered {:?}", w.outcome);
        let r = master.read(MEM_SIZE as u64 + 4, 4).await?;
        check!(r.outcome == Outcome::SlvErr, "read answered {:?}", r.outcome);
        Ok(Val::None)
    });
    assert_eq!(result, Ok(Val::None));
    assert!(bench.ram.write(MEM_SIZE as u64 - 2, &[0; 4]).is_err());
}

#[test]
fn clearing_address_after_its_data_was_taken_still_writes_the_pair() {
    let bench = direct(4);
    bench
        .ram
        .write_if
        .aw_channel()
        .set_pause_generator(PauseGenerator::new(vec![true]));
    let master = bench.master.clone();
    let ram = bench.ram.clone();
    let clk = bench.clk.clone();
    let sim = bench.sim.clone();
    let result = bench.sim.run_test(async move {
        sim.fork(clock(clk.clone(), 2, "ns"));
        let first = master.init_write(0x10, &[0xde, 0xad, 0xbe, 0xef])?;
        clock_cycles(clk.clone(), 4).await?;
        check!(master.write_if.w_channel().accepted() == 1, "data beat still queued");
        master.write_if.aw_channel().clear();
        ram.write_if.aw_channel().clear_pause_generator();
        let first = first.await?;
        check!(first.outcome == Outcome::Ok, "first write answered {:?}", first.outcome);
        let second = master.write(0x20, &[1, 2, 3, 4]).await?;
        check!(second.outcome == Outcome::Ok, "second write answered {:?}", second.outcome);
        Ok(Val::None)
    });
    assert_eq!(result, Ok(Val::None));
    assert_eq!(bench.ram.read(0x10, 4).unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    assert_eq!(bench.ram.read(0x20, 4).unwrap(), vec![1, 2, 3, 4]);
    assert!(bench.checker.violations().is_empty());
}

#[test]
fn clearing_address_withdraws_presented_data() {
    let bench = direct(4);
    bench
        .ram
        .write_if
        .aw_channel()
        .set_pause_generator(PauseGenerator::new(vec![true]));
    bench
        .ram
        .write_if
        .w_channel()
        .set_pause_generator(PauseGenerator::new(vec![true]));
    let master = bench.master.clone();
    let ram = bench.ram.clone();
    let clk = bench.clk.clone();
    let sim = bench.sim.clone();
    let result = bench.sim.run_test(async move {
        sim.fork(clock(clk.clone(), 2, "ns"));
        let first = master.init_write(0x10, &[0xde, 0xad, 0xbe, 0xef])?;
        clock_cycles(clk.clone(), 4).await?;
        check!(master.write_if.w_channel().signals().valid_high(), "data beat not presented");
        master.write_if.aw_channel().clear();
        let first = first.await;
        check!(matches!(first, Err(axil_tb::axi::AxiError::Cancelled { .. })), "cleared write gave {:?}", first);
        check!(!master.write_if.w_channel().signals().valid_high(), "data beat left on the bus");
        check!(master.idle(), "master busy");
        ram.write_if.aw_channel().clear_pause_generator();
        ram.write_if.w_channel().clear_pause_generator();
        let second = master.write(0x20, &[1, 2, 3, 4]).await?;
        check!(second.outcome == Outcome::Ok, "second write answered {:?}", second.outcome);
        Ok(Val::None)
    });
    assert_eq!(result, Ok(Val::None));
    assert_eq!(bench.ram.read(0x10, 4).unwrap(), vec![0; 4]);
    assert_eq!(bench.ram.read(0x20, 4).unwrap(), vec![1, 2, 3, 4]);
}
