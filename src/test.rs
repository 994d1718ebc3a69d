use futures::future::BoxFuture;
use prettytable::{row, Table};
use std::time;

use crate::config::{ConfigError, TbConfig};
use crate::junit;
use crate::signal::SimObject;
use crate::sim::Sim;
use crate::value::Val;
use crate::TbResult;

pub type TestFn = fn(SimObject) -> BoxFuture<'static, TbResult>;

#[derive(Debug, Default)]
pub struct TbTests(Vec<Test>);

impl TbTests {
    pub fn new() -> Self {
        Self(Vec::new())
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn iter(&self) -> core::slice::Iter<'_, Test> {
        self.0.iter()
    }
    pub fn push(&mut self, test: Test) {
        self.0.push(test);
    }
    /// Keeps only the tests whose name contains `filter`.
    pub fn retain_matching(&mut self, filter: &str) {
        self.0.retain(|t| t.name.contains(filter));
    }
}

#[derive(Debug)]
pub struct Test {
    pub name: String,
    pub generator: TestFn,
    pub result: Option<TbResult>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl Test {
    pub fn new(name: String, generator: TestFn) -> Self {
        Self {
            name,
            generator,
            result: None,
            time_secs: 0.0,
            sim_time_ns: 0.0,
        }
    }
    pub fn set_result(&mut self, result: TbResult) {
        self.result = Some(result);
    }
    pub fn passed(&self) -> bool {
        matches!(self.result, Some(Ok(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs every test in a fresh simulation built by `build`, which declares the DUT and returns
/// the object handed to the test. Prints a summary table and writes JUnit XML if configured.
pub fn run_tests<F>(suite: &str, tests: &mut TbTests, config: &TbConfig, build: F) -> RunSummary
where
    F: Fn(&Sim) -> Result<SimObject, ConfigError>,
{
    let run_start = time::Instant::now();
    let mut total_sim_ns = 0.0;
    for test in tests.0.iter_mut() {
        let sim = Sim::new(suite, config);
        let time_start = time::Instant::now();
        let result = match build(&sim) {
            Ok(dut) => sim.run_test((test.generator)(dut)),
            Err(e) => Err(Val::String(format!("Could not build DUT: {}", e))),
        };
        test.time_secs = time_start.elapsed().as_secs_f64();
        test.sim_time_ns = sim.time("ns");
        total_sim_ns += test.sim_time_ns;
        let result_str = match &result {
            Ok(_) => "passed",
            Err(_) => "failed",
        };
        sim.log(&format!(
            "TEST {}: Result={}, Time={:.3}, SimTime={}ns, SimSpeed={:.3}ns/s",
            test.name,
            result_str,
            test.time_secs,
            test.sim_time_ns,
            test.sim_time_ns / test.time_secs.max(f64::EPSILON)
        ));
        if let Err(e) = &result {
            log::error!("{} failed: {:?}", test.name, e);
        }
        test.set_result(result);
    }

    let duration = run_start.elapsed().as_secs_f64();
    log::info!("{}", summary_table(tests));
    log::info!("TOTAL SIMULATION");
    log::info!("Simulation time: {} ns", total_sim_ns);
    log::info!("Real time: {:.3} s", duration);
    log::info!("Simulation speed: {:.3} ns/s", total_sim_ns / duration.max(f64::EPSILON));

    if let Some(path) = &config.junit_path {
        if let Err(e) = junit::create_junit_xml(suite, tests, path) {
            log::error!("Could not write {}: {}", path.display(), e);
        }
    }

    let passed = tests.iter().filter(|t| t.passed()).count();
    RunSummary {
        passed,
        failed: tests.len() - passed,
    }
}

fn summary_table(tests: &TbTests) -> Table {
    let mut table = Table::new();
    table.add_row(row!["TEST", "RESULT", "SIM TIME (ns)", "REAL TIME (s)"]);
    for t in tests.iter() {
        let result = match t.passed() {
            true => "PASS",
            false => "FAIL",
        };
        table.add_row(row![
            t.name,
            result,
            format!("{:.3}", t.sim_time_ns),
            format!("{:.3}", t.time_secs)
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::Trigger;
    use futures::FutureExt;

    async fn waits(dut: SimObject) -> TbResult {
        Trigger::timer(dut.sim(), 3, "ns").await;
        Ok(Val::None)
    }

    async fn fails(_dut: SimObject) -> TbResult {
        Err(Val::String("nope".to_string()))
    }

    #[test]
    fn each_test_gets_its_own_sim() {
        let mut tests = TbTests::new();
        tests.push(Test::new("waits".to_string(), |dut| waits(dut).boxed()));
        tests.push(Test::new("fails".to_string(), |dut| fails(dut).boxed()));
        tests.push(Test::new("waits_again".to_string(), |dut| waits(dut).boxed()));
        let summary = run_tests("suite", &mut tests, &TbConfig::default(), |sim| {
            sim.add_scope(&sim.root(), "dut")
                .map_err(|_| ConfigError::Declare("dut".to_string()))
        });
        assert_eq!(summary, RunSummary { passed: 2, failed: 1 });
        // time restarts at zero for every test
        assert_eq!(tests.iter().next().map(|t| t.sim_time_ns), Some(3.0));
        assert_eq!(tests.iter().nth(2).map(|t| t.sim_time_ns), Some(3.0));
    }

    #[test]
    fn build_errors_fail_the_test() {
        let mut tests = TbTests::new();
        tests.push(Test::new("waits".to_string(), |dut| waits(dut).boxed()));
        let summary = run_tests("suite", &mut tests, &TbConfig::default(), |_| {
            Err(ConfigError::BusWidth(3))
        });
        assert!(!summary.all_passed());
        assert!(matches!(tests.iter().next().and_then(|t| t.result.clone()), Some(Err(_))));
    }
}
