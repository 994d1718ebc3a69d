use std::future::Future;

use axil_tb::dut::{build, BridgeParams};
use axil_tb::prelude::*;
use axil_tb::scenarios::*;
use axil_tb::test::{run_tests, TbTests, Test};

fn run_on<Fut>(params: BridgeParams, scenario: fn(SimObject) -> Fut) -> TbResult
where
    Fut: Future<Output = TbResult> + Send + 'static,
{
    axil_tb::init_logging();
    let sim = Sim::new("bridge", &TbConfig::default());
    let dut = build(&sim, &params).expect("bridge declared");
    sim.run_test(scenario(dut))
}

fn run<Fut>(scenario: fn(SimObject) -> Fut) -> TbResult
where
    Fut: Future<Output = TbResult> + Send + 'static,
{
    run_on(BridgeParams::default(), scenario)
}

#[test]
fn increment_write() {
    assert_eq!(run(increment_test_write), Ok(Val::None));
}

#[test]
fn random_ready_write_data() {
    assert_eq!(run(increment_test_random_ready_write_data), Ok(Val::None));
}

#[test]
fn random_ready_write_addr() {
    assert_eq!(run(increment_test_random_ready_write_addr), Ok(Val::None));
}

#[test]
fn random_ready_read_addr() {
    assert_eq!(run(increment_test_random_ready_read_addr), Ok(Val::None));
}

#[test]
fn timeout_no_answer() {
    assert_eq!(run(increment_test_timeout_no_answer), Ok(Val::None));
}

#[test]
fn random_ready_timeout_no_answer() {
    assert_eq!(run(increment_test_random_ready_timeout_no_answer), Ok(Val::None));
}

#[test]
fn undriven_in_reset_and_without_clock() {
    assert_eq!(run(in_reset), Ok(Val::None));
    assert_eq!(run(no_clock), Ok(Val::None));
}

#[test]
fn read_back_and_decode_errors() {
    assert_eq!(run(write_read_back), Ok(Val::None));
    assert_eq!(run(out_of_region_decerr), Ok(Val::None));
}

#[test]
fn cleared_write_is_cancelled() {
    assert_eq!(run(clear_before_accept), Ok(Val::None));
}

#[test]
fn downstream_sees_offsets() {
    assert_eq!(run(address_translation), Ok(Val::None));
}

#[test]
fn no_protocol_violations_under_stalls() {
    assert_eq!(run(protocol_checks_under_stalls), Ok(Val::None));
}

#[test]
fn master_budget_reports_timeout() {
    assert_eq!(run(master_timeout_budget), Ok(Val::None));
}

#[test]
fn wide_bus() {
    let params = BridgeParams {
        bus_width: 8,
        slave_region: 128,
        ..BridgeParams::default()
    };
    assert_eq!(run_on(params, increment_test_write), Ok(Val::None));
    assert_eq!(run_on(params, write_read_back), Ok(Val::None));
}

#[test]
fn full_run_writes_junit() {
    let path = std::env::temp_dir().join(format!("axil_tb_bridge_{}.xml", std::process::id()));
    let config = TbConfig {
        junit_path: Some(path.clone()),
        ..TbConfig::default()
    };
    let mut tests = TbTests::new();
    tests.push(Test::new("increment_test_write".to_string(), |dut| {
        increment_test_write(dut).boxed()
    }));
    tests.push(Test::new("in_reset".to_string(), |dut| in_reset(dut).boxed()));
    let summary = run_tests("bridge", &mut tests, &config, |sim| build(sim, &BridgeParams::default()));
    assert!(summary.all_passed());
    let xml = std::fs::read_to_string(&path).expect("junit written");
    assert!(xml.contains("increment_test_write"));
    let _ = std::fs::remove_file(path);
}

#[test]
fn invalid_params_fail_every_test() {
    let params = BridgeParams {
        bus_width: 2,
        ..BridgeParams::default()
    };
    let mut tests = TbTests::new();
    tests.push(Test::new("in_reset".to_string(), |dut| in_reset(dut).boxed()));
    let summary = run_tests("bridge", &mut tests, &TbConfig::default(), |sim| build(sim, &params));
    assert_eq!(summary.failed, 1);
}
