use intmap::IntMap;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::signal::SimObject;
use crate::sim::Sim;
use crate::sim_if::{SimCallback, SimIf};
use crate::tb_obj::TbObj;
use crate::value::Val;
use crate::TbResult;

struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

impl CallbackHandles {
    fn empty() -> Self {
        CallbackHandles {
            handle: None,
            callbacks: VecDeque::new(),
        }
    }
}

struct TriggerMaps {
    // key is signal handle
    edge_map: IntMap<CallbackHandles>,
    // key is absolute callback time
    timer_map: IntMap<CallbackHandles>,
    read_only: CallbackHandles,
    read_write: CallbackHandles,
}

/// Awaiting triggers of one simulation, grouped by the simulator callback that wakes them.
#[derive(Clone)]
pub(crate) struct Triggers(TbObj<TriggerMaps>);

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    fired: Arc<AtomicBool>,
    // If trigger is an edge, the react method needs to know if it is a rising or falling edge
    // so an existing callback does not have to be rescheduled.
    edge_kind: EdgeKind,
}

impl TrigShared {
    fn fire(self) {
        self.fired.store(true, Ordering::Release);
        self.waker.wake();
    }
}

#[derive(Clone, Debug)]
pub enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
}

#[derive(Clone)]
pub struct Trigger {
    sim: Sim,
    kind: TrigKind,
    fired: Option<Arc<AtomicBool>>,
    // high exec prio currently only implemented for ReadOnly
    high_exec_prio: bool,
}

impl Trigger {
    fn new(sim: &Sim, kind: TrigKind) -> Self {
        Trigger {
            sim: sim.clone(),
            kind,
            fired: None,
            high_exec_prio: false,
        }
    }
    pub fn timer(sim: &Sim, time: u64, unit: &str) -> Self {
        let steps = sim.sim_if().get_sim_steps(time as f64, unit);
        Trigger::new(sim, TrigKind::Timer(steps))
    }
    pub fn timer_steps(sim: &Sim, steps: u64) -> Self {
        Trigger::new(sim, TrigKind::Timer(steps))
    }
    pub async fn timer_ro(sim: &Sim, time: u64, unit: &str) -> TbResult {
        Trigger::timer(sim, time, unit).await;
        Trigger::read_only(sim).await;
        Ok(Val::None)
    }
    pub async fn timer_rw(sim: &Sim, time: u64, unit: &str) -> TbResult {
        Trigger::timer(sim, time, unit).await;
        Trigger::read_write(sim).await;
        Ok(Val::None)
    }
    pub fn edge(signal: &SimObject) -> Self {
        Trigger::new(signal.sim(), TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: &SimObject) -> Self {
        Trigger::new(signal.sim(), TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: &SimObject) -> Self {
        Trigger::new(signal.sim(), TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    pub fn read_write(sim: &Sim) -> Self {
        Trigger::new(sim, TrigKind::ReadWrite)
    }
    pub fn read_only(sim: &Sim) -> Self {
        Trigger::new(sim, TrigKind::ReadOnly)
    }
    pub(crate) fn read_only_prio(sim: &Sim) -> Self {
        Trigger {
            high_exec_prio: true,
            ..Trigger::new(sim, TrigKind::ReadOnly)
        }
    }
    pub fn kind(&self) -> &TrigKind {
        &self.kind
    }
}

impl Future for Trigger {
    type Output = Val;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A trigger registers on first poll. Later polls only complete once the callback
        // fired, since a task may be woken by some other event in between.
        if let Some(fired) = &self.fired {
            return match fired.load(Ordering::Acquire) {
                true => Poll::Ready(Val::None),
                false => Poll::Pending,
            };
        }
        let fired = Arc::new(AtomicBool::new(false));
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind: EdgeKind::Any,
        };
        self.sim
            .triggers()
            .register(self.sim.sim_if(), &self.kind, shared, self.high_exec_prio);
        self.fired = Some(fired);
        Poll::Pending
    }
}

impl Triggers {
    pub(crate) fn new() -> Self {
        Triggers(TbObj::new(TriggerMaps {
            edge_map: IntMap::new(),
            timer_map: IntMap::new(),
            read_only: CallbackHandles::empty(),
            read_write: CallbackHandles::empty(),
        }))
    }

    fn register(&self, sim_if: &dyn SimIf, kind: &TrigKind, mut shared: TrigShared, high_exec_prio: bool) {
        let mut maps = self.0.get();
        match *kind {
            TrigKind::ReadWrite => {
                maps.read_write.callbacks.push_back(shared);
                if maps.read_write.handle.is_none() {
                    maps.read_write.handle = register_or_warn(sim_if, SimCallback::ReadWrite);
                }
            }
            TrigKind::ReadOnly => {
                match high_exec_prio {
                    false => maps.read_only.callbacks.push_back(shared),
                    true => maps.read_only.callbacks.push_front(shared),
                }
                if maps.read_only.handle.is_none() {
                    maps.read_only.handle = register_or_warn(sim_if, SimCallback::ReadOnly);
                }
            }
            TrigKind::Timer(t) => {
                // Add current time to key since the simulator will send back absolute time, not delta
                let abs_time = t + sim_if.get_sim_time_steps();
                if let Some(callbacks) = maps.timer_map.get_mut(abs_time) {
                    callbacks.callbacks.push_back(shared);
                } else {
                    let mut callbacks = CallbackHandles::empty();
                    callbacks.handle = register_or_warn(sim_if, SimCallback::Time(t));
                    callbacks.callbacks.push_back(shared);
                    maps.timer_map.insert(abs_time, callbacks);
                }
            }
            TrigKind::Edge(sig_hdl, edge_kind) => {
                shared.edge_kind = edge_kind;
                if let Some(callbacks) = maps.edge_map.get_mut(sig_hdl as u64) {
                    callbacks.callbacks.push_back(shared);
                } else {
                    let mut callbacks = CallbackHandles::empty();
                    callbacks.handle = register_or_warn(sim_if, SimCallback::Edge(sig_hdl));
                    callbacks.callbacks.push_back(shared);
                    maps.edge_map.insert(sig_hdl as u64, callbacks);
                }
            }
        }
    }

    /// Wakes all triggers waiting on `cb` and runs the woken tasks.
    pub(crate) fn react(&self, sim: &Sim, cb: SimCallback, edge: Option<EdgeKind>) {
        let mut vec_wake: VecDeque<TrigShared> = VecDeque::new();
        {
            let mut maps = self.0.get();
            match cb {
                SimCallback::ReadWrite => {
                    maps.read_write.handle = None; // remove handle, since CB is now done
                    vec_wake = std::mem::take(&mut maps.read_write.callbacks);
                }
                SimCallback::ReadOnly => {
                    maps.read_only.handle = None;
                    vec_wake = std::mem::take(&mut maps.read_only.callbacks);
                }
                SimCallback::Time(t) => {
                    if let Some(callbacks) = maps.timer_map.remove(t) {
                        vec_wake = callbacks.callbacks;
                    }
                }
                SimCallback::Edge(sig_hdl) => {
                    if let Some(mut callbacks) = maps.edge_map.remove(sig_hdl as u64) {
                        let edge = edge.unwrap_or(EdgeKind::Any);
                        let mut vec_resched: VecDeque<TrigShared> = VecDeque::new();
                        for trig in callbacks.callbacks.drain(..) {
                            if edge == EdgeKind::Any
                                || trig.edge_kind == EdgeKind::Any
                                || trig.edge_kind == edge
                            {
                                vec_wake.push_back(trig);
                            } else {
                                vec_resched.push_back(trig);
                            }
                        }
                        if vec_resched.is_empty() {
                            // if no callbacks are remaining, cancel
                            if let Some(handle) = callbacks.handle.take() {
                                let _ = sim.sim_if().cancel_callback(handle);
                            }
                        } else {
                            // put rescheduled callbacks back
                            callbacks.callbacks = vec_resched;
                            maps.edge_map.insert(sig_hdl as u64, callbacks);
                        }
                    }
                }
            }
        }

        if !vec_wake.is_empty() {
            for shared in vec_wake {
                shared.fire();
            }
            // execute woken tasks
            sim.executor().run_once();
        }
    }

    /// Drops every waiting trigger together with its simulator callback.
    pub(crate) fn cancel_all_triggers(&self, sim_if: &dyn SimIf) {
        let mut maps = self.0.get();
        maps.read_only.callbacks.clear();
        if let Some(handle) = maps.read_only.handle.take() {
            let _ = sim_if.cancel_callback(handle);
        }
        maps.read_write.callbacks.clear();
        if let Some(handle) = maps.read_write.handle.take() {
            let _ = sim_if.cancel_callback(handle);
        }
        for (_, cb) in maps.timer_map.drain() {
            if let Some(handle) = cb.handle {
                let _ = sim_if.cancel_callback(handle);
            }
        }
        for (_, cb) in maps.edge_map.drain() {
            if let Some(handle) = cb.handle {
                let _ = sim_if.cancel_callback(handle);
            }
        }
    }
}

fn register_or_warn(sim_if: &dyn SimIf, cb: SimCallback) -> Option<usize> {
    match sim_if.register_callback(cb) {
        Ok(handle) => Some(handle),
        Err(_) => {
            sim_if.warn(&format!("Simulator refused callback {:?}, trigger will never fire", cb));
            None
        }
    }
}
