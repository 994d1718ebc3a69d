use std::marker::PhantomData;

use crate::signal::SimObject;
use crate::tb_obj::TbObj;
use crate::testbench::Monitor;
use crate::value::Val;
use crate::TbResult;

use super::channel::{in_reset, ResetSignal};
use super::{Beat, ChannelSignals};

/// Passive observer of one channel. Every handshake is forwarded to `mon`.
pub struct ChannelMonitor<T: Beat> {
    pub mon: Monitor<T>,
    signals: ChannelSignals,
    count: TbObj<u64>,
    _beat: PhantomData<T>,
}

impl<T: Beat> Clone for ChannelMonitor<T> {
    fn clone(&self) -> Self {
        ChannelMonitor {
            mon: self.mon.clone(),
            signals: self.signals.clone(),
            count: self.count.clone(),
            _beat: PhantomData,
        }
    }
}

impl<T: Beat> ChannelMonitor<T> {
    pub fn new(signals: ChannelSignals, clk: SimObject, rst: Option<SimObject>, reset_active_level: bool) -> Self {
        let monitor = ChannelMonitor {
            mon: Monitor::new(),
            signals,
            count: TbObj::new(0),
            _beat: PhantomData,
        };
        let rst = ResetSignal::new(rst, reset_active_level);
        clk.sim().spawn(
            &format!("{}_monitor", T::CHANNEL.name()),
            monitor.clone().run(clk.clone(), rst),
        );
        monitor
    }

    pub fn count(&self) -> u64 {
        *self.count.get()
    }

    #[allow(unreachable_code)]
    async fn run(self, clk: SimObject, rst: Option<ResetSignal>) -> TbResult {
        loop {
            clk.rising_edge_ro().await?;
            if in_reset(&rst) {
                continue;
            }
            // values seen in the read-only region are the ones sampled at the next edge
            if self.signals.valid_high() && self.signals.ready_high() {
                *self.count.get() += 1;
                self.mon.to_scoreboard(T::from_values(&self.signals.sample()));
            }
        }
        Ok(Val::None)
    }
}
