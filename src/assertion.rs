use futures::future::{select_all, BoxFuture};
use std::sync::Arc;

use crate::sim::Sim;
use crate::tb_obj::TbObj;
use crate::trigger::Trigger;
use crate::value::Val;
use crate::TbResult;

type Generator = Box<dyn Fn() -> BoxFuture<'static, TbResult> + Send + Sync>;

/// Registers a concurrent assertion on `$sim`.
///
/// `$check` is evaluated anew every time one of `$triggers` fires and must yield a future
/// returning `TbResult`; an `Err` counts as a failed check.
#[macro_export]
macro_rules! assertion {
    ($sim: expr, $name: expr, $triggers: expr, $check: expr) => {
        $sim.assertions().add(
            $name,
            $triggers,
            move || $crate::prelude::FutureExt::boxed($check),
        )
    };
}

pub struct Assertion {
    name: String,
    triggers: Vec<Trigger>,
    generator: Generator,
    enabled: TbObj<bool>,
    triggered: TbObj<u32>,
    failed: TbObj<u32>,
    passed: TbObj<u32>,
    last_error: TbObj<Option<Val>>,
}

impl Assertion {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn triggered(&self) -> u32 {
        *self.triggered.get()
    }
    pub fn passed(&self) -> u32 {
        *self.passed.get()
    }
    pub fn failed(&self) -> u32 {
        *self.failed.get()
    }
    /// Error value of the most recent failed check.
    pub fn last_error(&self) -> Option<Val> {
        self.last_error.get().clone()
    }
    pub fn set_enabled(&self, enabled: bool) {
        *self.enabled.get() = enabled;
    }

    async fn run(self: Arc<Self>, sim: Sim) -> TbResult {
        if self.triggers.is_empty() {
            sim.warn(&format!("Assertion {} has no triggers and never runs", self.name));
            return Ok(Val::None);
        }
        loop {
            // wait for any of the triggers, then sample in the read-only region
            let (_, _, _) = select_all(self.triggers.iter().cloned()).await;
            *self.triggered.get() += 1;
            Trigger::read_only(&sim).await;

            if *self.enabled.get() {
                let check = (self.generator)();
                let this = self.clone();
                sim.fork(async move {
                    match check.await {
                        Ok(_) => this.pass(),
                        Err(e) => this.fail(e),
                    }
                    Ok(Val::None)
                });
            }
        }
    }

    fn fail(&self, e: Val) {
        if *self.enabled.get() {
            *self.failed.get() += 1;
            *self.last_error.get() = Some(e);
        }
    }

    fn pass(&self) {
        if *self.enabled.get() {
            *self.passed.get() += 1;
        }
    }

    pub fn result_str(&self) -> String {
        format!(
            "Assertion {}: Triggered: {}, Passed: {}, Failed: {}.",
            self.name,
            self.triggered(),
            self.passed(),
            self.failed()
        )
    }
}

/// Assertions registered on one simulation.
#[derive(Default)]
pub struct Assertions(TbObj<Vec<Arc<Assertion>>>);

impl Assertions {
    pub fn new() -> Self {
        Assertions::default()
    }

    /// Adds an assertion unless one with the same name exists. Returns the registered one.
    pub fn add(
        &self,
        name: &str,
        triggers: Vec<Trigger>,
        generator: impl Fn() -> BoxFuture<'static, TbResult> + Send + Sync + 'static,
    ) -> Arc<Assertion> {
        let mut list = self.0.get();
        if let Some(existing) = list.iter().find(|a| a.name == name) {
            return existing.clone();
        }
        let assertion = Arc::new(Assertion {
            name: name.to_string(),
            triggers,
            generator: Box::new(generator),
            enabled: TbObj::new(true),
            triggered: TbObj::new(0),
            failed: TbObj::new(0),
            passed: TbObj::new(0),
            last_error: TbObj::new(None),
        });
        list.push(assertion.clone());
        assertion
    }

    pub fn get(&self, name: &str) -> Option<Arc<Assertion>> {
        self.0.get().iter().find(|a| a.name == name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Assertion>> {
        self.0.get().clone()
    }

    /// Total failed checks over all assertions.
    pub fn failures(&self) -> u32 {
        self.0.get().iter().map(|a| a.failed()).sum()
    }

    pub fn run_all_assertions(&self, sim: &Sim) {
        for assertion in self.all() {
            sim.spawn(&assertion.name.clone(), assertion.run(sim.clone()));
        }
    }

    pub fn run_assertion(&self, sim: &Sim, name: &str) {
        match self.get(name) {
            Some(assertion) => {
                sim.spawn(name, assertion.run(sim.clone()));
            }
            None => panic!("Can't run assertion {}. Assertion not registered!", name),
        }
    }

    pub fn print_assertion_stats(&self, sim: &Sim) {
        for assertion in self.0.get().iter() {
            sim.log(&assertion.result_str());
        }
    }

    pub(crate) fn clear(&self) {
        self.0.get().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TbConfig;
    use crate::testbench::clock;
    use futures::FutureExt;

    #[test]
    fn counts_passes_and_failures() {
        let sim = Sim::new("top", &TbConfig::default());
        let clk = sim.add_net(&sim.root(), "clk", 1).unwrap();
        let cnt = sim.add_net(&sim.root(), "cnt", 8).unwrap();

        let c = cnt.clone();
        let a = assertion!(sim, "cnt_even", vec![clk.rising_edge()], {
            let c = c.clone();
            async move {
                match c.try_u64() {
                    Some(v) if v % 2 == 1 => Err(Val::Int(v as i64)),
                    _ => Ok(Val::None),
                }
            }
        });
        sim.assertions().run_all_assertions(&sim);

        let s = sim.clone();
        let result = sim.run_test(async move {
            s.fork(clock(clk.clone(), 2, "ns"));
            // every rising edge sees the value written on it
            for i in 0..4 {
                clk.rising_edge().await;
                cnt.set(i);
            }
            Trigger::timer(&s, 1, "ns").await;
            Ok(Val::None)
        });
        assert!(result.is_ok());
        assert_eq!(a.triggered(), 4);
        assert_eq!(a.failed(), 2);
        assert_eq!(a.passed(), 2);
        assert_eq!(a.last_error(), Some(Val::Int(3)));
    }

    #[test]
    fn duplicate_names_are_ignored() {
        let sim = Sim::new("top", &TbConfig::default());
        let first = sim
            .assertions()
            .add("a", vec![], || async { Ok(Val::None) }.boxed());
        let second = sim
            .assertions()
            .add("a", vec![], || async { Err(Val::None) }.boxed());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sim.assertions().all().len(), 1);
    }
}
