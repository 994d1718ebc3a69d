use futures::future::poll_fn;
use futures_channel::oneshot;
use std::collections::VecDeque;
use std::task::{Poll, Waker};

use crate::signal::SimObject;
use crate::tb_obj::TbObj;
use crate::value::Val;
use crate::TbResult;

use super::{Beat, ChannelSignals, PauseGenerator};

/// Reset input of a bus model.
#[derive(Debug, Clone)]
pub(crate) struct ResetSignal {
    pub(crate) signal: SimObject,
    pub(crate) active_level: bool,
}

impl ResetSignal {
    pub(crate) fn new(signal: Option<SimObject>, active_level: bool) -> Option<Self> {
        signal.map(|signal| ResetSignal { signal, active_level })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.signal.try_u64() == Some(self.active_level as u64)
    }
}

pub(crate) fn in_reset(rst: &Option<ResetSignal>) -> bool {
    rst.as_ref().map_or(false, ResetSignal::is_active)
}

/*
 * SOURCE
 */
struct Entry<T> {
    id: u64,
    beat: T,
    // dropping the sender tells the issuer its beat was discarded
    ack: Option<oneshot::Sender<()>>,
    // shared by the AW and W halves of one write beat, set once either half was accepted
    pair: Option<TbObj<bool>>,
}

impl<T> Entry<T> {
    /// The slave already holds the other half, so this one has to follow.
    fn bound(&self) -> bool {
        self.pair.as_ref().map_or(false, |p| *p.get())
    }
}

struct SourceState<T> {
    queue: VecDeque<Entry<T>>,
    current: Option<Entry<T>>,
    pause: PauseGenerator,
    next_id: u64,
    accepted: u64,
}

/// Drives `valid` and the payload of a channel from a queue of beats.
///
/// A presented beat keeps `valid` high and its payload stable until `ready` is sampled high
/// on a rising clock edge. The pause generator only delays loading the next beat.
pub struct Source<T: Beat> {
    signals: ChannelSignals,
    state: TbObj<SourceState<T>>,
}

impl<T: Beat> Clone for Source<T> {
    fn clone(&self) -> Self {
        Source {
            signals: self.signals.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Beat> Source<T> {
    pub(crate) fn new(signals: ChannelSignals, clk: &SimObject, rst: Option<ResetSignal>, label: &str) -> Self {
        signals.valid.set(0);
        let source = Source {
            signals,
            state: TbObj::new(SourceState {
                queue: VecDeque::new(),
                current: None,
                pause: PauseGenerator::default(),
                next_id: 0,
                accepted: 0,
            }),
        };
        clk.sim().spawn(
            &format!("{}_{}_source", label, T::CHANNEL.name()),
            source.clone().run(clk.clone(), rst),
        );
        source
    }

    /// Queues a beat. The receiver resolves once the beat was accepted and is cancelled if
    /// the beat gets dropped.
    pub fn send(&self, beat: T) -> (u64, oneshot::Receiver<()>) {
        self.push(beat, None)
    }

    /// Queues one half of a write beat. Once either half sharing `pair` was accepted, the
    /// other can no longer be cancelled or cleared.
    pub(crate) fn send_paired(&self, beat: T, pair: &TbObj<bool>) -> (u64, oneshot::Receiver<()>) {
        self.push(beat, Some(pair.clone()))
    }

    fn push(&self, beat: T, pair: Option<TbObj<bool>>) -> (u64, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let id = self.state.with_mut(|s| {
            let id = s.next_id;
            s.next_id += 1;
            s.queue.push_back(Entry {
                id,
                beat,
                ack: Some(tx),
                pair,
            });
            id
        });
        (id, rx)
    }

    /// Removes a beat that was not accepted yet. A beat on the bus is withdrawn and `valid`
    /// deasserted. Returns false if the beat is gone already or is bound to an accepted half.
    pub fn cancel(&self, id: u64) -> bool {
        let (dropped, withdrawn) = self.state.with_mut(|s| {
            if let Some(pos) = s.queue.iter().position(|e| e.id == id && !e.bound()) {
                return (s.queue.remove(pos), false);
            }
            match s.current.as_ref().map_or(false, |e| e.id == id && !e.bound()) {
                true => (s.current.take(), true),
                false => (None, false),
            }
        });
        if withdrawn {
            self.signals.valid.set(0);
        }
        dropped.is_some()
    }

    /// Deasserts `valid` and drops every queued beat, including the one on the bus. Beats
    /// bound to an accepted half stay queued.
    pub fn clear(&self) {
        let (dropped, presenting) = self.state.with_mut(|s| {
            let (kept, mut dropped): (VecDeque<_>, VecDeque<_>) = s.queue.drain(..).partition(Entry::bound);
            s.queue = kept;
            if !s.current.as_ref().map_or(false, Entry::bound) {
                dropped.extend(s.current.take());
            }
            (dropped, s.current.is_some())
        });
        if !presenting {
            self.signals.valid.set(0);
        }
        drop(dropped);
    }

    fn flush(&self) {
        let dropped = self.state.with_mut(|s| {
            let mut dropped: Vec<Entry<T>> = s.queue.drain(..).collect();
            dropped.extend(s.current.take());
            dropped
        });
        self.signals.valid.set(0);
        drop(dropped);
    }

    pub fn set_pause_generator(&self, generator: PauseGenerator) {
        self.state.with_mut(|s| s.pause = generator);
    }

    pub fn clear_pause_generator(&self) {
        self.set_pause_generator(PauseGenerator::default());
    }

    /// Beats queued or on the bus.
    pub fn count(&self) -> usize {
        self.state.with_mut(|s| s.queue.len() + s.current.is_some() as usize)
    }

    pub fn idle(&self) -> bool {
        self.count() == 0
    }

    pub fn accepted(&self) -> u64 {
        self.state.get().accepted
    }

    pub fn signals(&self) -> &ChannelSignals {
        &self.signals
    }

    #[allow(unreachable_code)]
    async fn run(self, clk: SimObject, rst: Option<ResetSignal>) -> TbResult {
        let sim = clk.sim().clone();
        loop {
            clk.rising_edge().await;
            if in_reset(&rst) {
                self.flush();
                continue;
            }
            let ready = self.signals.ready_high();
            let (accepted, next) = self.state.with_mut(|s| {
                let accepted = match ready {
                    true => s.current.take(),
                    false => None,
                };
                if let Some(entry) = &accepted {
                    s.accepted += 1;
                    if let Some(pair) = &entry.pair {
                        *pair.get() = true;
                    }
                }
                let pause = s.pause.advance();
                if s.current.is_none() && !pause {
                    s.current = s.queue.pop_front();
                }
                (accepted, s.current.as_ref().map(|e| e.beat.to_values()))
            });
            if let Some(mut entry) = accepted {
                sim.debug(|| format!("{} accepted {:?}", T::CHANNEL, entry.beat));
                if let Some(ack) = entry.ack.take() {
                    let _ = ack.send(());
                }
            }
            match next {
                Some(values) => {
                    self.signals.drive(&values);
                    self.signals.valid.set(1);
                }
                None => self.signals.valid.set(0),
            }
        }
        Ok(Val::None)
    }
}

/*
 * SINK
 */
struct SinkState<T> {
    queue: VecDeque<T>,
    pause: PauseGenerator,
    ready: bool,
    waker: Option<Waker>,
    received: u64,
}

/// Drives `ready` of a channel and captures a beat on every rising edge where `valid` and
/// `ready` are both high. A paused cycle holds `ready` low.
pub struct Sink<T: Beat> {
    signals: ChannelSignals,
    state: TbObj<SinkState<T>>,
}

impl<T: Beat> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Sink {
            signals: self.signals.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Beat> Sink<T> {
    pub(crate) fn new(signals: ChannelSignals, clk: &SimObject, rst: Option<ResetSignal>, label: &str) -> Self {
        signals.ready.set(0);
        let sink = Sink {
            signals,
            state: TbObj::new(SinkState {
                queue: VecDeque::new(),
                pause: PauseGenerator::default(),
                ready: false,
                waker: None,
                received: 0,
            }),
        };
        clk.sim().spawn(
            &format!("{}_{}_sink", label, T::CHANNEL.name()),
            sink.clone().run(clk.clone(), rst),
        );
        sink
    }

    /// Next captured beat.
    pub async fn recv(&self) -> T {
        let state = self.state.clone();
        poll_fn(move |cx| {
            let mut s = state.get();
            match s.queue.pop_front() {
                Some(beat) => Poll::Ready(beat),
                None => {
                    s.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        })
        .await
    }

    pub fn try_recv(&self) -> Option<T> {
        self.state.get().queue.pop_front()
    }

    /// Deasserts `ready` and drops captured beats nobody received yet.
    pub fn clear(&self) {
        self.state.with_mut(|s| {
            s.queue.clear();
            s.ready = false;
        });
        self.signals.ready.set(0);
    }

    pub fn set_pause_generator(&self, generator: PauseGenerator) {
        self.state.with_mut(|s| s.pause = generator);
    }

    pub fn clear_pause_generator(&self) {
        self.set_pause_generator(PauseGenerator::default());
    }

    pub fn count(&self) -> usize {
        self.state.get().queue.len()
    }

    pub fn idle(&self) -> bool {
        self.count() == 0
    }

    pub fn received(&self) -> u64 {
        self.state.get().received
    }

    pub fn signals(&self) -> &ChannelSignals {
        &self.signals
    }

    #[allow(unreachable_code)]
    async fn run(self, clk: SimObject, rst: Option<ResetSignal>) -> TbResult {
        let sim = clk.sim().clone();
        loop {
            clk.rising_edge().await;
            if in_reset(&rst) {
                self.clear();
                continue;
            }
            let was_ready = self.state.get().ready;
            let captured = match was_ready && self.signals.valid_high() {
                true => Some(T::from_values(&self.signals.sample())),
                false => None,
            };
            let (ready, waker) = self.state.with_mut(|s| {
                let mut waker = None;
                if let Some(beat) = captured.clone() {
                    s.queue.push_back(beat);
                    s.received += 1;
                    waker = s.waker.take();
                }
                s.ready = !s.pause.advance();
                (s.ready, waker)
            });
            if let Some(beat) = captured {
                sim.debug(|| format!("{} captured {:?}", T::CHANNEL, beat));
            }
            if let Some(waker) = waker {
                waker.wake();
            }
            self.signals.ready.set(ready as u64);
        }
        Ok(Val::None)
    }
}
