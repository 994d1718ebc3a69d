use axil_tb::dut::{build, BridgeParams};
use axil_tb::scenarios::*;

axil_tb::run_with_sim!(
    |sim| build(sim, &BridgeParams::default()),
    increment_test_write,
    increment_test_random_ready_write_data,
    increment_test_random_ready_write_addr,
    increment_test_random_ready_read_addr,
    increment_test_timeout_no_answer,
    increment_test_random_ready_timeout_no_answer,
    in_reset,
    no_clock,
    write_read_back,
    out_of_region_decerr,
    clear_before_accept,
    address_translation,
    protocol_checks_under_stalls,
    master_timeout_budget
);
