use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::assertion::Assertions;
use crate::config::TbConfig;
use crate::executor::{Executor, JoinHandle};
use crate::kernel::Kernel;
use crate::signal::SimObject;
use crate::sim_if::{SimCallback, SimIf};
use crate::tb_obj::TbObj;
use crate::trigger::Triggers;
use crate::value::Val;
use crate::{SimpleResult, TbResult};

// Upper bound of delta cycles per time step before the kernel gives up on a zero-delay loop.
const MAX_DELTAS: u32 = 10_000;

struct SimInner {
    kernel: Kernel,
    executor: Executor,
    triggers: Triggers,
    assertions: Assertions,
    rng: TbObj<StdRng>,
    outcome: TbObj<Option<TbResult>>,
    config: TbConfig,
}

/// Handle to one simulation: nets, scheduler, time and random source.
///
/// Every component receives the `Sim` it lives in, so independent simulations never share
/// state.
#[derive(Clone)]
pub struct Sim(Arc<SimInner>);

impl fmt::Debug for Sim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sim")
            .field("time_steps", &self.0.kernel.get_sim_time_steps())
            .finish()
    }
}

impl Sim {
    pub fn new(root_name: &str, config: &TbConfig) -> Self {
        Sim(Arc::new(SimInner {
            kernel: Kernel::new(root_name, config.precision),
            executor: Executor::new(),
            triggers: Triggers::new(),
            assertions: Assertions::new(),
            rng: TbObj::new(StdRng::seed_from_u64(config.seed)),
            outcome: TbObj::new(None),
            config: config.clone(),
        }))
    }

    pub fn sim_if(&self) -> &dyn SimIf {
        &self.0.kernel
    }

    pub(crate) fn kernel(&self) -> &Kernel {
        &self.0.kernel
    }

    pub(crate) fn triggers(&self) -> &Triggers {
        &self.0.triggers
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.0.executor
    }

    pub fn assertions(&self) -> &Assertions {
        &self.0.assertions
    }

    pub fn config(&self) -> &TbConfig {
        &self.0.config
    }

    pub fn rng(&self) -> TbObj<StdRng> {
        self.0.rng.clone()
    }

    pub fn ptr_eq(&self, other: &Sim) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn root(&self) -> SimObject {
        SimObject::new(self, 0, crate::signal::ObjectKind::Hier)
    }

    /// Declares a net below `parent`.
    pub fn add_net(&self, parent: &SimObject, name: &str, width: u32) -> SimpleResult<SimObject> {
        let handle = self.0.kernel.add_net(parent.handle(), name, width)?;
        SimObject::from_handle(self, handle)
    }

    /// Declares a read-only parameter below `parent`.
    pub fn add_param(&self, parent: &SimObject, name: &str, width: u32, value: u64) -> SimpleResult<SimObject> {
        let handle = self.0.kernel.add_param(parent.handle(), name, width, value)?;
        SimObject::from_handle(self, handle)
    }

    pub fn add_scope(&self, parent: &SimObject, name: &str) -> SimpleResult<SimObject> {
        let handle = self.0.kernel.add_scope(parent.handle(), name)?;
        SimObject::from_handle(self, handle)
    }

    pub fn fork(&self, future: impl Future<Output = TbResult> + Send + 'static) -> JoinHandle {
        self.0.executor.spawn_from_future(future, "forked")
    }

    pub fn spawn(&self, name: &str, future: impl Future<Output = TbResult> + Send + 'static) -> JoinHandle {
        self.0.executor.spawn_from_future(future, name)
    }

    pub fn log(&self, msg: &str) {
        self.sim_if().log(msg)
    }

    pub fn warn(&self, msg: &str) {
        self.sim_if().warn(msg)
    }

    /// Debug-level trace, formatted only when enabled.
    pub fn debug(&self, msg: impl FnOnce() -> String) {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}", self.0.kernel.stamp(&msg()));
        }
    }

    pub fn time(&self, unit: &str) -> f64 {
        self.sim_if().get_sim_time(unit)
    }

    /// Passes the running test unless it has already passed or failed.
    pub fn pass_test(&self, msg: &str) {
        self.finish(Ok(Val::String(msg.to_string())));
    }

    /// Fails the running test unless it has already passed or failed.
    pub fn fail_test(&self, msg: &str) {
        self.finish(Err(Val::String(msg.to_string())));
    }

    fn finish(&self, result: TbResult) {
        self.0.outcome.with_mut(|o| {
            if o.is_none() {
                *o = Some(result);
            }
        });
    }

    pub fn is_finished(&self) -> bool {
        self.0.outcome.get().is_some()
    }

    /// Runs `test` until it completes, calls `pass_test`/`fail_test`, runs out of events or
    /// exceeds the configured maximum simulation time. Tears the simulation down afterwards.
    pub fn run_test(&self, test: impl Future<Output = TbResult> + Send + 'static) -> TbResult {
        let sim = self.clone();
        let _ = self.spawn("test", async move {
            let result = test.await;
            sim.finish(result.clone());
            result
        });
        self.0.executor.run_once();

        let max_steps = self
            .sim_if()
            .get_sim_steps(self.0.config.max_sim_time_ns as f64, "ns");
        while !self.is_finished() {
            self.settle();
            if self.is_finished() {
                break;
            }
            match self.0.kernel.next_time() {
                None => self.fail_test("Simulation stalled: no pending events"),
                Some(t) if t > max_steps => self.fail_test(&format!(
                    "Simulation time limit of {} ns exceeded",
                    self.0.config.max_sim_time_ns
                )),
                Some(t) => {
                    for cb in self.0.kernel.advance_to(t) {
                        self.0.triggers.react(self, cb, None);
                    }
                }
            }
        }
        self.0.assertions.print_assertion_stats(self);
        let result = self
            .0
            .outcome
            .get()
            .take()
            .unwrap_or_else(|| Err(Val::String("Test produced no result".to_string())));
        self.tear_down();
        result
    }

    /// Runs delta cycles at the current time until no write or read-write callback is left,
    /// then the read-only region.
    fn settle(&self) {
        let mut deltas = 0;
        loop {
            let edges = self.0.kernel.commit();
            if !edges.is_empty() {
                for (sig_hdl, edge) in edges {
                    self.0
                        .triggers
                        .react(self, SimCallback::Edge(sig_hdl), Some(edge));
                }
            } else if self.0.kernel.take_read_write() {
                self.0.triggers.react(self, SimCallback::ReadWrite, None);
            } else if !self.0.kernel.has_pending_writes() {
                break;
            }
            deltas += 1;
            if deltas > MAX_DELTAS {
                self.fail_test("Delta cycle limit exceeded");
                return;
            }
        }
        if self.0.kernel.take_read_only() {
            self.0.kernel.enter_read_only();
            self.0.triggers.react(self, SimCallback::ReadOnly, None);
            self.0.kernel.leave_read_only();
        }
    }

    fn tear_down(&self) {
        self.0.executor.tear_down();
        self.0.triggers.cancel_all_triggers(self.sim_if());
        self.0.kernel.clear_callbacks();
        self.0.assertions.clear();
        // tasks woken while their futures were dropped
        self.0.executor.tear_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::Trigger;

    fn sim() -> Sim {
        Sim::new("top", &TbConfig::default())
    }

    #[test]
    fn timer_advances_time() {
        let sim = sim();
        let s = sim.clone();
        let result = sim.run_test(async move {
            Trigger::timer(&s, 5, "ns").await;
            Ok(Val::Int(s.time("ns") as i64))
        });
        assert_eq!(result, Ok(Val::Int(5)));
    }

    #[test]
    fn waiting_on_nothing_stalls() {
        let sim = sim();
        let clk = sim.add_net(&sim.root(), "clk", 1).unwrap();
        let result = sim.run_test(async move {
            clk.rising_edge().await;
            Ok(Val::None)
        });
        assert!(result.is_err());
    }

    #[test]
    fn writes_visible_after_edge_wakeup() {
        let sim = sim();
        let root = sim.root();
        let clk = sim.add_net(&root, "clk", 1).unwrap();
        let d = sim.add_net(&root, "d", 8).unwrap();
        let s = sim.clone();
        let result = sim.run_test(async move {
            clk.set(0);
            d.set(3);
            Trigger::timer(&s, 1, "ns").await;
            clk.set(1);
            d.set(4);
            clk.rising_edge().await;
            // the edge and the data change were committed in the same delta
            Ok(Val::Int(d.u64() as i64))
        });
        assert_eq!(result, Ok(Val::Int(4)));
    }

    #[test]
    fn fail_test_stops_simulation() {
        let sim = sim();
        let s = sim.clone();
        let result = sim.run_test(async move {
            s.fail_test("boom");
            Trigger::timer(&s, 1, "ms").await;
            Ok(Val::None)
        });
        assert_eq!(result, Err(Val::String("boom".to_string())));
    }

    #[test]
    fn time_limit_fails_test() {
        let mut cfg = TbConfig::default();
        cfg.max_sim_time_ns = 10;
        let sim = Sim::new("top", &cfg);
        let s = sim.clone();
        let result = sim.run_test(async move {
            Trigger::timer(&s, 20, "ns").await;
            Ok(Val::None)
        });
        assert!(result.is_err());
    }
}
