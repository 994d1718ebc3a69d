use intmap::IntMap;
use num_format::{Locale, ToFormattedString};
use std::collections::{BTreeMap, HashMap};

use crate::signal::ObjectKind;
use crate::sim_if::{SimCallback, SimIf};
use crate::tb_obj::TbObj;
use crate::trigger::EdgeKind;
use crate::value::{Logic, Value};
use crate::SimpleResult;

#[derive(Debug, Clone, Copy)]
enum CbKind {
    Time(u64),
    Edge(usize),
    Rw,
    Ro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Active,
    ReadOnly,
}

struct Object {
    name: String,
    kind: ObjectKind,
    value: Value,
    forced: bool,
}

struct PendingWrite {
    handle: usize,
    value: Value,
    force: bool,
}

struct KernelState {
    time: u64,
    region: Region,
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    pending: Vec<PendingWrite>,
    cb_hdl_cnt: usize,
    cb_hdl_map: IntMap<CbKind>,
    // absolute time -> callback handles
    time_map: BTreeMap<u64, Vec<usize>>,
    // signal handle -> callback handle
    edge_map: IntMap<usize>,
    rw: Option<usize>,
    ro: Option<usize>,
}

/// Event-driven simulation kernel holding the nets of one simulation.
///
/// Writes are queued and committed together at the start of the next delta cycle, so every
/// process woken by the same event samples the same values.
pub(crate) struct Kernel {
    precision: i8,
    state: TbObj<KernelState>,
}

/// Edge of a single-bit net following Verilog posedge/negedge rules.
pub(crate) fn edge_kind(old: Value, new: Value) -> Option<EdgeKind> {
    match (old.logic(), new.logic()) {
        (a, b) if a == b => None,
        (Logic::Zero, _) | (Logic::Z, Logic::One) => Some(EdgeKind::Rising),
        (Logic::One, _) | (Logic::Z, Logic::Zero) => Some(EdgeKind::Falling),
        _ => None,
    }
}

impl Kernel {
    pub(crate) fn new(root_name: &str, precision: i8) -> Self {
        let root = Object {
            name: root_name.to_string(),
            kind: ObjectKind::Hier,
            value: Value::Z,
            forced: false,
        };
        let mut names = HashMap::new();
        names.insert(root_name.to_string(), 0);
        Kernel {
            precision,
            state: TbObj::new(KernelState {
                time: 0,
                region: Region::Active,
                objects: vec![root],
                names,
                pending: Vec::new(),
                cb_hdl_cnt: 0,
                cb_hdl_map: IntMap::new(),
                time_map: BTreeMap::new(),
                edge_map: IntMap::new(),
                rw: None,
                ro: None,
            }),
        }
    }

    fn add_object(&self, parent: usize, name: &str, kind: ObjectKind, value: Value) -> SimpleResult<usize> {
        let mut st = self.state.get();
        let parent_name = match st.objects.get(parent) {
            Some(p) if p.kind == ObjectKind::Hier => p.name.clone(),
            _ => return Err(()),
        };
        let full_name = format!("{}.{}", parent_name, name);
        if st.names.contains_key(&full_name) {
            return Err(());
        }
        let handle = st.objects.len();
        st.objects.push(Object {
            name: full_name.clone(),
            kind,
            value,
            forced: false,
        });
        st.names.insert(full_name, handle);
        Ok(handle)
    }

    /// Declares a net under `parent`. Nets start undriven.
    pub(crate) fn add_net(&self, parent: usize, name: &str, width: u32) -> SimpleResult<usize> {
        if width == 0 || width > 64 {
            return Err(());
        }
        self.add_object(parent, name, ObjectKind::Net(width), Value::Z)
    }

    pub(crate) fn add_param(&self, parent: usize, name: &str, width: u32, value: u64) -> SimpleResult<usize> {
        self.add_object(parent, name, ObjectKind::Param(width), Value::Int(value).masked(width))
    }

    pub(crate) fn add_scope(&self, parent: usize, name: &str) -> SimpleResult<usize> {
        self.add_object(parent, name, ObjectKind::Hier, Value::Z)
    }

    fn new_cb_hdl(st: &mut KernelState, kind: CbKind) -> usize {
        let hdl = st.cb_hdl_cnt;
        st.cb_hdl_cnt += 1;
        st.cb_hdl_map.insert(hdl as u64, kind);
        hdl
    }

    /// Applies all queued writes. Returns the edges of nets that have an edge callback.
    pub(crate) fn commit(&self) -> Vec<(usize, EdgeKind)> {
        let mut st = self.state.get();
        let pending = std::mem::take(&mut st.pending);
        let mut changed: Vec<(usize, Value)> = Vec::new();
        for w in pending {
            let obj = &mut st.objects[w.handle];
            if obj.forced && !w.force {
                continue;
            }
            if w.force {
                obj.forced = true;
            }
            if obj.value != w.value {
                match changed.iter().position(|(h, _)| *h == w.handle) {
                    Some(_) => {}
                    None => changed.push((w.handle, obj.value)),
                }
                obj.value = w.value;
            }
        }
        let mut edges = Vec::new();
        for (handle, old) in changed {
            if !st.edge_map.contains_key(handle as u64) {
                continue;
            }
            let obj = &st.objects[handle];
            match obj.kind {
                ObjectKind::Net(1) => {
                    if let Some(edge) = edge_kind(old, obj.value) {
                        edges.push((handle, edge));
                    }
                }
                _ if old != obj.value => edges.push((handle, EdgeKind::Any)),
                _ => {}
            }
        }
        edges
    }

    pub(crate) fn has_pending_writes(&self) -> bool {
        !self.state.get().pending.is_empty()
    }

    pub(crate) fn take_read_write(&self) -> bool {
        let mut st = self.state.get();
        match st.rw.take() {
            Some(hdl) => {
                st.cb_hdl_map.remove(hdl as u64);
                true
            }
            None => false,
        }
    }

    pub(crate) fn take_read_only(&self) -> bool {
        let mut st = self.state.get();
        match st.ro.take() {
            Some(hdl) => {
                st.cb_hdl_map.remove(hdl as u64);
                true
            }
            None => false,
        }
    }

    pub(crate) fn enter_read_only(&self) {
        self.state.get().region = Region::ReadOnly;
    }

    pub(crate) fn leave_read_only(&self) {
        self.state.get().region = Region::Active;
    }

    pub(crate) fn next_time(&self) -> Option<u64> {
        self.state.get().time_map.keys().next().copied()
    }

    /// Moves time forward to `t` and returns the timer callbacks due at `t`.
    pub(crate) fn advance_to(&self, t: u64) -> Vec<SimCallback> {
        let mut st = self.state.get();
        if t > st.time {
            st.time = t;
        }
        match st.time_map.remove(&t) {
            Some(handles) => {
                for hdl in handles {
                    st.cb_hdl_map.remove(hdl as u64);
                }
                vec![SimCallback::Time(t)]
            }
            None => Vec::new(),
        }
    }

    pub(crate) fn clear_callbacks(&self) {
        let mut st = self.state.get();
        st.cb_hdl_map = IntMap::new();
        st.time_map.clear();
        st.edge_map = IntMap::new();
        st.rw = None;
        st.ro = None;
        st.pending.clear();
    }
}

impl SimIf for Kernel {
    fn set_value(&self, handle: usize, value: Value, force: bool) -> SimpleResult<()> {
        let mut st = self.state.get();
        if st.region == Region::ReadOnly {
            return Err(());
        }
        let width = match st.objects.get(handle).map(|o| o.kind) {
            Some(ObjectKind::Net(width)) => width,
            _ => return Err(()),
        };
        st.pending.push(PendingWrite {
            handle,
            value: value.masked(width),
            force,
        });
        Ok(())
    }

    fn release(&self, handle: usize) -> SimpleResult<()> {
        let mut st = self.state.get();
        match st.objects.get_mut(handle) {
            Some(obj) if matches!(obj.kind, ObjectKind::Net(_)) => {
                obj.forced = false;
                Ok(())
            }
            _ => Err(()),
        }
    }

    fn get_value(&self, handle: usize) -> SimpleResult<Value> {
        let st = self.state.get();
        match st.objects.get(handle) {
            Some(obj) if matches!(obj.kind, ObjectKind::Net(_) | ObjectKind::Param(_)) => Ok(obj.value),
            _ => Err(()),
        }
    }

    fn get_handle_by_name(&self, name: &str) -> SimpleResult<usize> {
        self.state.get().names.get(name).copied().ok_or(())
    }

    fn get_full_name(&self, handle: usize) -> SimpleResult<String> {
        self.state
            .get()
            .objects
            .get(handle)
            .map(|o| o.name.clone())
            .ok_or(())
    }

    fn get_kind(&self, handle: usize) -> ObjectKind {
        self.state
            .get()
            .objects
            .get(handle)
            .map_or(ObjectKind::Other, |o| o.kind)
    }

    fn get_root_handle(&self) -> SimpleResult<usize> {
        Ok(0)
    }

    fn get_sim_time_steps(&self) -> u64 {
        self.state.get().time
    }

    fn get_sim_precision(&self) -> i8 {
        self.precision
    }

    fn register_callback(&self, cb: SimCallback) -> SimpleResult<usize> {
        let mut st = self.state.get();
        match cb {
            SimCallback::Time(t) => {
                let t_abs = t + st.time;
                let hdl = Kernel::new_cb_hdl(&mut st, CbKind::Time(t_abs));
                st.time_map.entry(t_abs).or_default().push(hdl);
                Ok(hdl)
            }
            SimCallback::Edge(sig_hdl) => {
                if !matches!(st.objects.get(sig_hdl).map(|o| o.kind), Some(ObjectKind::Net(_))) {
                    return Err(());
                }
                if st.edge_map.contains_key(sig_hdl as u64) {
                    return Err(());
                }
                let hdl = Kernel::new_cb_hdl(&mut st, CbKind::Edge(sig_hdl));
                st.edge_map.insert(sig_hdl as u64, hdl);
                Ok(hdl)
            }
            SimCallback::ReadWrite => {
                if st.region == Region::ReadOnly {
                    return Err(());
                }
                let hdl = Kernel::new_cb_hdl(&mut st, CbKind::Rw);
                st.rw = Some(hdl);
                Ok(hdl)
            }
            SimCallback::ReadOnly => {
                let hdl = Kernel::new_cb_hdl(&mut st, CbKind::Ro);
                st.ro = Some(hdl);
                Ok(hdl)
            }
        }
    }

    fn cancel_callback(&self, cb_hdl: usize) -> SimpleResult<()> {
        let mut st = self.state.get();
        let cb = st.cb_hdl_map.remove(cb_hdl as u64).ok_or(())?;
        match cb {
            CbKind::Time(t_abs) => {
                if let Some(handles) = st.time_map.get_mut(&t_abs) {
                    handles.retain(|h| *h != cb_hdl);
                    if handles.is_empty() {
                        st.time_map.remove(&t_abs);
                    }
                }
            }
            CbKind::Edge(sig_hdl) => {
                st.edge_map.remove(sig_hdl as u64);
            }
            CbKind::Rw => st.rw = None,
            CbKind::Ro => st.ro = None,
        }
        Ok(())
    }

    fn log(&self, msg: &str) {
        log::info!("{}", self.stamp(msg));
    }

    fn warn(&self, msg: &str) {
        log::warn!("{}", self.stamp(msg));
    }
}

impl Kernel {
    pub(crate) fn stamp(&self, msg: &str) -> String {
        let t = self.get_sim_time("ns");
        let int = t.floor() as u64;
        let mut frac_str = format!("{:.3}", t % 1.0);
        frac_str.remove(0);
        format!("{}{}ns {}", int.to_formatted_string(&Locale::en), frac_str, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel_with_net() -> (Kernel, usize) {
        let k = Kernel::new("top", -12);
        let clk = k.add_net(0, "clk", 1).unwrap();
        (k, clk)
    }

    #[test]
    fn writes_are_deferred_until_commit() {
        let (k, clk) = kernel_with_net();
        assert_eq!(k.get_value(clk), Ok(Value::Z));
        k.set_value(clk, Value::Int(1), false).unwrap();
        assert_eq!(k.get_value(clk), Ok(Value::Z));
        k.commit();
        assert_eq!(k.get_value(clk), Ok(Value::Int(1)));
    }

    #[test]
    fn edges_reported_only_for_watched_nets() {
        let (k, clk) = kernel_with_net();
        k.set_value(clk, Value::Int(0), false).unwrap();
        assert!(k.commit().is_empty());
        k.register_callback(SimCallback::Edge(clk)).unwrap();
        k.set_value(clk, Value::Int(1), false).unwrap();
        assert_eq!(k.commit(), vec![(clk, EdgeKind::Rising)]);
    }

    #[test]
    fn verilog_edge_rules() {
        assert_eq!(edge_kind(Value::Z, Value::Int(1)), Some(EdgeKind::Rising));
        assert_eq!(edge_kind(Value::Int(0), Value::Z), Some(EdgeKind::Rising));
        assert_eq!(edge_kind(Value::Z, Value::Int(0)), Some(EdgeKind::Falling));
        assert_eq!(edge_kind(Value::Int(1), Value::Z), Some(EdgeKind::Falling));
        assert_eq!(edge_kind(Value::Int(1), Value::Int(1)), None);
    }

    #[test]
    fn force_overrides_until_release() {
        let (k, clk) = kernel_with_net();
        k.set_value(clk, Value::Int(0), true).unwrap();
        k.commit();
        k.set_value(clk, Value::Int(1), false).unwrap();
        k.commit();
        assert_eq!(k.get_value(clk), Ok(Value::Int(0)));
        k.release(clk).unwrap();
        k.set_value(clk, Value::Int(1), false).unwrap();
        k.commit();
        assert_eq!(k.get_value(clk), Ok(Value::Int(1)));
    }

    #[test]
    fn params_are_read_only() {
        let k = Kernel::new("top", -12);
        let p = k.add_param(0, "WIDTH", 32, 4).unwrap();
        assert!(k.set_value(p, Value::Int(8), false).is_err());
        assert_eq!(k.get_value(p), Ok(Value::Int(4)));
        assert_eq!(k.get_handle_by_name("top.WIDTH"), Ok(p));
        assert!(k.add_param(0, "WIDTH", 32, 4).is_err());
    }

    #[test]
    fn timers_fire_in_time_order() {
        let k = Kernel::new("top", -12);
        k.register_callback(SimCallback::Time(30)).unwrap();
        let early = k.register_callback(SimCallback::Time(10)).unwrap();
        k.register_callback(SimCallback::Time(20)).unwrap();
        k.cancel_callback(early).unwrap();
        assert_eq!(k.next_time(), Some(20));
        assert_eq!(k.advance_to(20), vec![SimCallback::Time(20)]);
        assert_eq!(k.get_sim_time_steps(), 20);
        assert_eq!(k.next_time(), Some(30));
    }

    #[test]
    fn writes_rejected_in_read_only_region() {
        let (k, clk) = kernel_with_net();
        k.enter_read_only();
        assert!(k.set_value(clk, Value::Int(1), false).is_err());
        k.leave_read_only();
        assert!(k.set_value(clk, Value::Int(1), false).is_ok());
    }
}
