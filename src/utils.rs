use rand::Rng;

use crate::signal::SimObject;
use crate::sim::Sim;
use crate::value::Val;
use crate::TbResult;

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) -> TbResult {
    for _ in 0..n_cycles {
        signal.rising_edge().await;
    }
    Ok(Val::None)
}

/// Uniform float in `[0, 1)` from the simulation's seeded generator.
#[inline]
pub fn rand(sim: &Sim) -> f32 {
    sim.rng().get().gen::<f32>()
}

#[inline]
pub fn rand_int(sim: &Sim, ceil: u32) -> u32 {
    sim.rng().get().gen_range(0..ceil.max(1))
}
