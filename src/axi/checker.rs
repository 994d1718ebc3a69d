use std::sync::Arc;

use crate::assertion;
use crate::assertion::Assertion;
use crate::signal::SimObject;
use crate::tb_obj::TbObj;
use crate::value::Val;

use super::channel::{in_reset, ResetSignal};
use super::{AxiError, AxiLiteBus};

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    valid: bool,
    ready: bool,
    payload: Vec<u64>,
}

/// Watches every channel of a bus for handshake violations: once raised, `valid` has to
/// stay high with a stable payload until `ready` is sampled high.
///
/// One concurrent assertion per channel samples the bus after each rising clock edge.
/// Nothing is checked while reset is active.
#[derive(Clone)]
pub struct AxiProtocolChecker {
    violations: TbObj<Vec<AxiError>>,
    assertions: Vec<Arc<Assertion>>,
}

impl AxiProtocolChecker {
    pub fn new(bus: &AxiLiteBus, clk: SimObject, rst: Option<SimObject>, reset_active_level: bool) -> Self {
        let sim = clk.sim().clone();
        let rst = ResetSignal::new(rst, reset_active_level);
        let violations: TbObj<Vec<AxiError>> = TbObj::new(Vec::new());
        let mut assertions = Vec::new();

        for signals in bus.channels() {
            let name = format!("{}_{}_handshake", bus.prefix, signals.channel.name());
            let prev: TbObj<Option<Sample>> = TbObj::new(None);
            let signals = signals.clone();
            let rst = rst.clone();
            let violations = violations.clone();
            let a = assertion!(sim, &name, vec![clk.rising_edge()], {
                let (signals, rst, prev, violations) =
                    (signals.clone(), rst.clone(), prev.clone(), violations.clone());
                async move {
                    if in_reset(&rst) {
                        *prev.get() = None;
                        return Ok(Val::None);
                    }
                    let now = Sample {
                        valid: signals.valid_high(),
                        ready: signals.ready_high(),
                        payload: signals.sample(),
                    };
                    let before = prev.get().replace(now.clone());
                    let detail = match before {
                        Some(b) if b.valid && !b.ready && !now.valid => "valid dropped before ready".to_string(),
                        Some(b) if b.valid && !b.ready && now.payload != b.payload => format!(
                            "payload changed before ready: {:#x?} -> {:#x?}",
                            b.payload, now.payload
                        ),
                        _ => return Ok(Val::None),
                    };
                    signals
                        .valid
                        .sim()
                        .warn(&format!("{} {}", signals.channel, detail));
                    violations.get().push(AxiError::ProtocolViolation {
                        channel: signals.channel,
                        detail: detail.clone(),
                    });
                    Err(Val::String(detail))
                }
            });
            sim.assertions().run_assertion(&sim, a.name());
            assertions.push(a);
        }
        AxiProtocolChecker { violations, assertions }
    }

    pub fn violations(&self) -> Vec<AxiError> {
        self.violations.get().clone()
    }

    /// Number of edges on which at least one channel was checked.
    pub fn checks(&self) -> u32 {
        self.assertions.iter().map(|a| a.passed() + a.failed()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TbConfig;
    use crate::sim::Sim;
    use crate::testbench::clock;
    use crate::utils::clock_cycles;

    fn bench() -> (Sim, SimObject, AxiLiteBus, AxiProtocolChecker) {
        let sim = Sim::new("top", &TbConfig::default());
        let root = sim.root();
        let clk = sim.add_net(&root, "clk", 1).unwrap();
        let bus = AxiLiteBus::declare(&sim, &root, "bus", 4).unwrap();
        let checker = AxiProtocolChecker::new(&bus, clk.clone(), None, false);
        (sim, clk, bus, checker)
    }

    #[test]
    fn dropped_valid_is_flagged() {
        let (sim, clk, bus, checker) = bench();
        let s = sim.clone();
        let c = checker.clone();
        let result = sim.run_test(async move {
            s.fork(clock(clk.clone(), 2, "ns"));
            bus.aw.ready.set(0);
            bus.aw.valid.set(1);
            clock_cycles(clk.clone(), 2).await?;
            bus.aw.valid.set(0);
            clock_cycles(clk.clone(), 2).await?;
            Ok(Val::Int(c.violations().len() as i64))
        });
        assert_eq!(result, Ok(Val::Int(1)));
        assert!(matches!(
            checker.violations()[0],
            AxiError::ProtocolViolation {
                channel: crate::axi::Channel::Aw,
                ..
            }
        ));
    }

    #[test]
    fn changed_payload_is_flagged_and_handshake_is_not() {
        let (sim, clk, bus, checker) = bench();
        let s = sim.clone();
        let c = checker.clone();
        let result = sim.run_test(async move {
            s.fork(clock(clk.clone(), 2, "ns"));
            bus.w.ready.set(1);
            bus.w.valid.set(1);
            bus.w.fields[0].set(1);
            clock_cycles(clk.clone(), 2).await?;
            // accepted on every edge, so a new payload is fine
            bus.w.fields[0].set(2);
            clock_cycles(clk.clone(), 2).await?;
            bus.w.ready.set(0);
            clock_cycles(clk.clone(), 2).await?;
            bus.w.fields[0].set(3);
            clock_cycles(clk.clone(), 2).await?;
            Ok(Val::Int(c.violations().len() as i64))
        });
        assert_eq!(result, Ok(Val::Int(1)));
        assert!(checker.checks() > 0);
    }
}
