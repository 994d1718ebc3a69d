use std::fmt;

use crate::sim::Sim;
use crate::trigger::Trigger;
use crate::value::{Logic, Val, Value};
use crate::{SimpleResult, TbResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Writable net of the given bit width.
    Net(u32),
    /// Read-only parameter of the given bit width.
    Param(u32),
    Hier,
    Other,
}

#[derive(Clone)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
    sim: Sim,
}

impl fmt::Debug for SimObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimObject")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for SimObject {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.sim.ptr_eq(&other.sim)
    }
}

impl SimObject {
    pub(crate) fn new(sim: &Sim, handle: usize, kind: ObjectKind) -> Self {
        SimObject {
            handle,
            kind,
            sim: sim.clone(),
        }
    }

    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn sim(&self) -> &Sim {
        &self.sim
    }

    pub fn name(&self) -> String {
        self.sim
            .sim_if()
            .get_full_name(self.handle)
            .unwrap_or_else(|_| format!("<handle {}>", self.handle))
    }

    pub fn size(&self) -> u32 {
        match self.kind {
            ObjectKind::Net(size) | ObjectKind::Param(size) => size,
            _ => panic!("SimObject {} does not have a size.", self.name()),
        }
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.kind, ObjectKind::Net(_))
    }

    pub fn has_value(&self) -> bool {
        matches!(self.kind, ObjectKind::Net(_) | ObjectKind::Param(_))
    }

    pub fn get_child(&self, name: &str) -> SimpleResult<Self> {
        let mut child_name = self.name();
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&self.sim, &child_name)
    }

    pub fn from_handle(sim: &Sim, handle: usize) -> SimpleResult<Self> {
        match sim.sim_if().get_kind(handle) {
            ObjectKind::Other => Err(()),
            kind => Ok(SimObject::new(sim, handle, kind)),
        }
    }

    pub fn from_name(sim: &Sim, full_name: &str) -> SimpleResult<Self> {
        let handle = sim.sim_if().get_handle_by_name(full_name)?;
        SimObject::from_handle(sim, handle)
    }

    pub fn get_root(sim: &Sim) -> SimpleResult<Self> {
        let handle = sim.sim_if().get_root_handle()?;
        SimObject::from_handle(sim, handle)
    }

    /// Child object by name. Panics if it does not exist.
    pub fn c(&self, name: &str) -> Self {
        self.get_child(name)
            .unwrap_or_else(|_| panic!("Could not get object with name {}.{}", self.name(), name))
    }

    pub fn value(&self) -> Value {
        self.sim
            .sim_if()
            .get_value(self.handle)
            .unwrap_or_else(|_| panic!("SimObject {} does not have a value.", self.name()))
    }

    pub fn logic(&self) -> Logic {
        self.value().logic()
    }

    pub fn is_high(&self) -> bool {
        self.logic().is_high()
    }

    pub fn is_z(&self) -> bool {
        self.value().is_z()
    }

    pub fn try_u64(&self) -> Option<u64> {
        self.value().as_u64()
    }

    /// Integer value. Panics if the object is undriven.
    pub fn u64(&self) -> u64 {
        self.try_u64()
            .unwrap_or_else(|| panic!("Can't resolve undriven {} to an integer.", self.name()))
    }

    pub fn u32(&self) -> u32 {
        self.u64() as u32
    }

    pub fn bin(&self) -> String {
        self.value().to_bin(self.size())
    }

    pub fn set(&self, val: u64) {
        self.put(Value::Int(val), false)
    }

    pub fn set_logic(&self, val: Logic) {
        self.put(val.into(), false)
    }

    pub fn set_z(&self) {
        self.put(Value::Z, false)
    }

    /// Overrides every later `set` until `release` is called.
    pub fn force(&self, val: u64) {
        self.put(Value::Int(val), true)
    }

    pub fn release(&self) {
        if self.sim.sim_if().release(self.handle).is_err() {
            self.sim.warn(&format!("Can't release {}", self.name()));
        }
    }

    pub fn set_bin(&self, val: &str) {
        self._set_bin(val, false)
    }

    pub fn force_bin(&self, val: &str) {
        self._set_bin(val, true)
    }

    #[inline]
    fn _set_bin(&self, val: &str, force: bool) {
        // remove '_' and 0b
        let size = match self.kind {
            ObjectKind::Net(size) => size,
            _ => panic!("Can't set {} using set_bin()", self.name()),
        };
        let stripped = val.replace("0b", "");
        let stripped = stripped.replace('_', "");
        if stripped.len() != size as usize {
            panic!("Can't set {} to {}. Length mismatch.", self.name(), val);
        }
        if stripped.chars().all(|c| c.eq_ignore_ascii_case(&'z')) {
            self.put(Value::Z, force);
        } else if stripped.chars().all(|c| c == '0' || c == '1') {
            let v = u64::from_str_radix(&stripped, 2)
                .unwrap_or_else(|_| panic!("Can't set {} to {}. Too wide.", self.name(), val));
            self.put(Value::Int(v), force);
        } else {
            panic!("Can't set {} to {}. Invalid characters.", self.name(), val);
        }
    }

    #[inline]
    fn put(&self, val: Value, force: bool) {
        if self
            .sim
            .sim_if()
            .set_value(self.handle, val, force)
            .is_err()
        {
            self.sim
                .warn(&format!("Write of {:?} to {} ignored", val, self.name()));
        }
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(&self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub async fn rising_edge_ro(&self) -> TbResult {
        self.rising_edge().await;
        Trigger::read_only(&self.sim).await;
        Ok(Val::None)
    }
    pub async fn rising_edge_rw(&self) -> TbResult {
        self.rising_edge().await;
        Trigger::read_write(&self.sim).await;
        Ok(Val::None)
    }
    pub fn falling_edge(&self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(&self) -> Trigger {
        Trigger::edge(self)
    }
}
