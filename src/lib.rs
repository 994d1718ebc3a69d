//! Coroutine testbenches for AXI-Lite designs.
//!
//! A [`sim::Sim`] owns an in-process event-driven simulation: nets, a cooperative task
//! executor and the triggers tasks await. The [`axi`] module builds bus-functional models
//! on top of it, [`dut`] holds a behavioral AXI-Lite bridge and [`scenarios`] the tests
//! that exercise it.

mod assertion;
pub mod axi;
pub mod config;
pub mod dut;
mod executor;
mod junit;
mod kernel;
pub mod prelude;
pub mod scenarios;
pub mod signal;
pub mod sim;
pub mod sim_if;
mod tb_obj;
pub mod test;
pub mod testbench;
mod trigger;
pub mod utils;
mod value;

use once_cell::sync::OnceCell;

pub use assertion::{Assertion, Assertions};
pub use executor::{JoinHandle, Task};
pub use tb_obj::TbObj;
pub use trigger::{EdgeKind, Trigger};
pub use value::{Logic, Val, Value};

pub type SimpleResult<T> = Result<T, ()>;
pub type TbResult = Result<Val, Val>;

/// Name of the test suite, set once by [`run_with_sim!`].
pub static SUITE_NAME: OnceCell<String> = OnceCell::new();

pub fn suite_name() -> &'static str {
    SUITE_NAME.get().map_or("axil_tb", String::as_str)
}

/// Routes `log` output to stderr, filtered by `RUST_LOG` (default `info`). Calling it
/// more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init();
}

/// Returns a failed [`TbResult`] with the formatted message unless `$cond` holds.
#[macro_export]
macro_rules! check {
    ($cond: expr, $($msg: tt)+) => {
        if !$cond {
            return Err($crate::Val::String(format!($($msg)+)));
        }
    };
}

/// Generates `main` running the listed test functions, each in a fresh simulation whose
/// DUT is declared by `$build`. An optional first command line argument selects the tests
/// whose names contain it. Exits non-zero if a test failed.
#[macro_export]
macro_rules! run_with_sim {
    ($build: expr, $( $i:ident ),+) => {
        #[allow(clippy::vec_init_then_push)]
        fn main() {
            let _ = $crate::SUITE_NAME.set(std::module_path!().to_string());
            $crate::init_logging();
            let config = match $crate::config::TbConfig::from_env() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(2);
                }
            };
            // add tests to execution vector
            let mut tests = $crate::test::TbTests::new();
            $(tests.push($crate::test::Test::new(stringify!($i).to_string(), |dut| {
                $crate::prelude::FutureExt::boxed($i(dut))
            }));)+
            if let Some(filter) = std::env::args().nth(1) {
                tests.retain_matching(&filter);
            }

            let summary = $crate::test::run_tests($crate::suite_name(), &mut tests, &config, $build);
            std::process::exit(match summary.all_passed() {
                true => 0,
                false => 1,
            });
        }
    };
}
