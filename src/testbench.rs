use std::collections::VecDeque;
use std::fmt::Debug;

use crate::signal::SimObject;
use crate::tb_obj::TbObj;
use crate::trigger::Trigger;
use crate::value::Val;
use crate::TbResult;

/// In-order comparison of expected and received items.
pub struct Scoreboard<T: PartialEq>(TbObj<ScoreboardInner<T>>);

impl<T: PartialEq> Clone for Scoreboard<T> {
    fn clone(&self) -> Self {
        Scoreboard(self.0.clone())
    }
}

impl<T: PartialEq + Debug> Scoreboard<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(TbObj::new(ScoreboardInner {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            errors: 0,
            expected: 0,
            received: 0,
            matched: 0,
            first_mismatch: None,
        }))
    }
    pub fn add_exp(&self, data: T) {
        self.0.with_mut(|s| {
            s.exp_q.push_back(data);
            s.expected += 1;
        });
        self.compare();
    }
    pub fn add_recv(&self, data: T) {
        self.0.with_mut(|s| {
            s.recv_q.push_back(data);
            s.received += 1;
        });
        self.compare();
    }
    fn compare(&self) {
        self.0.with_mut(|s| {
            while !s.exp_q.is_empty() && !s.recv_q.is_empty() {
                let (Some(exp), Some(recv)) = (s.exp_q.pop_front(), s.recv_q.pop_front()) else {
                    break;
                };
                if exp == recv {
                    s.matched += 1;
                } else {
                    s.errors += 1;
                    if s.first_mismatch.is_none() {
                        s.first_mismatch = Some(format!("expected {:?}, received {:?}", exp, recv));
                    }
                }
            }
        });
    }
    pub fn result(&self) -> TbResult {
        match self.passed() {
            true => Ok(Val::String(self.result_str())),
            false => Err(Val::String(self.result_str())),
        }
    }
    pub fn passed(&self) -> bool {
        let inner = self.0.get();
        inner.expected > 0
            && inner.received == inner.expected
            && inner.matched == inner.received
            && inner.errors == 0
            && inner.exp_q.is_empty()
            && inner.recv_q.is_empty()
    }
    pub fn result_str(&self) -> String {
        let inner = self.0.get();
        let mut s = format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            inner.expected,
            inner.received,
            inner.matched,
            inner.errors,
            inner.exp_q.len(),
            inner.recv_q.len()
        );
        if let Some(m) = &inner.first_mismatch {
            s.push_str(", first mismatch: ");
            s.push_str(m);
        }
        s
    }
}

struct ScoreboardInner<T: PartialEq> {
    exp_q: VecDeque<T>,
    recv_q: VecDeque<T>,
    errors: u32,
    expected: u32,
    received: u32,
    matched: u32,
    first_mismatch: Option<String>,
}

/*
 * MONITOR
 */
/// Forwards observed items to a scoreboard, either as expected or as received side.
pub struct Monitor<T: PartialEq>(TbObj<MonitorInner<T>>);

impl<T: PartialEq> Clone for Monitor<T> {
    fn clone(&self) -> Self {
        Monitor(self.0.clone())
    }
}

impl<T: PartialEq + Debug> Monitor<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(TbObj::new(MonitorInner {
            enable: true,
            exp_not_recv: true,
            scoreboard: None,
        }))
    }
    pub fn set_scoreboard(&self, sb: Scoreboard<T>, exp_not_recv: bool) {
        self.0.with_mut(|m| {
            m.exp_not_recv = exp_not_recv;
            m.scoreboard = Some(sb);
        })
    }
    pub fn set_enable(&self, enable: bool) {
        self.0.with_mut(|m| m.enable = enable)
    }
    /// Forwards `data` if the monitor is enabled and has a scoreboard.
    pub fn to_scoreboard(&self, data: T) {
        // cloned out so the scoreboard is not locked while the monitor is
        let (sb, exp_not_recv) = self.0.with_mut(|m| match m.enable {
            true => (m.scoreboard.clone(), m.exp_not_recv),
            false => (None, m.exp_not_recv),
        });
        if let Some(sb) = sb {
            match exp_not_recv {
                true => sb.add_exp(data),
                false => sb.add_recv(data),
            }
        }
    }
}

struct MonitorInner<T: PartialEq> {
    enable: bool,
    exp_not_recv: bool,
    scoreboard: Option<Scoreboard<T>>,
}

/*
 * CLOCK
 */
#[allow(unreachable_code)]
pub async fn clock(clk: SimObject, period: u32, unit: &'static str) -> TbResult {
    let high_t = period / 2;
    let low_t = period - high_t;
    if period % 2 != 0 {
        clk.sim().warn(&format!("Clock period {period}{unit} not dividable by 2. High time will be {high}{unit}; low time will be {low}{unit}.", period=period, unit=unit, high=high_t, low=low_t));
    }
    let sim = clk.sim().clone();
    loop {
        clk.set(0);
        Trigger::timer(&sim, low_t as u64, unit).await;
        clk.set(1);
        Trigger::timer(&sim, high_t as u64, unit).await;
    }
    Ok(Val::None)
}

/*
 * RESET
 */
/// Drives `rst` to `active_level` for `duration` and then to the inverse level.
pub async fn reset_pulse(rst: SimObject, active_level: bool, duration: u64, unit: &'static str) -> TbResult {
    let sim = rst.sim().clone();
    rst.set(active_level as u64);
    Trigger::timer(&sim, duration, unit).await;
    rst.set(!active_level as u64);
    sim.log(&format!("Reset {} released", rst.name()));
    Ok(Val::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TbConfig;
    use crate::sim::Sim;

    #[test]
    fn scoreboard_matches_in_order() {
        let sb = Scoreboard::new();
        sb.add_exp(1u32);
        sb.add_exp(2);
        assert!(!sb.passed());
        sb.add_recv(1);
        sb.add_recv(2);
        assert!(sb.passed());
        assert!(sb.result().is_ok());
    }

    #[test]
    fn scoreboard_reports_first_mismatch() {
        let sb = Scoreboard::new();
        let mon = Monitor::new();
        mon.set_scoreboard(sb.clone(), false);
        sb.add_exp(7u8);
        mon.to_scoreboard(9);
        assert!(!sb.passed());
        assert!(sb.result_str().contains("expected 7, received 9"));
    }

    #[test]
    fn disabled_monitor_drops_items() {
        let sb = Scoreboard::<u8>::new();
        let mon = Monitor::new();
        mon.set_scoreboard(sb.clone(), true);
        mon.set_enable(false);
        mon.to_scoreboard(1);
        assert!(sb.result_str().starts_with("expected=0"));
    }

    #[test]
    fn clock_and_reset_timing() {
        let sim = Sim::new("top", &TbConfig::default());
        let clk = sim.add_net(&sim.root(), "clk", 1).unwrap();
        let rstn = sim.add_net(&sim.root(), "rstn", 1).unwrap();
        let s = sim.clone();
        let result = sim.run_test(async move {
            s.fork(clock(clk.clone(), 10, "ns"));
            s.fork(reset_pulse(rstn.clone(), false, 20, "ns"));
            clk.rising_edge().await;
            let first = s.time("ns");
            clk.rising_edge().await;
            let second = s.time("ns");
            assert_eq!(rstn.u64(), 0);
            Trigger::timer(&s, 10, "ns").await;
            assert_eq!(rstn.u64(), 1);
            Ok(Val::Int((second - first) as i64))
        });
        assert_eq!(result, Ok(Val::Int(10)));
    }
}
