use futures::future::{select, Either, FutureExt};
use futures_channel::oneshot;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::signal::SimObject;
use crate::tb_obj::TbObj;
use crate::utils::clock_cycles;
use crate::value::Val;
use crate::TbResult;

use super::channel::ResetSignal;
use super::{ArBeat, AwBeat, AxiError, AxiLiteBus, BBeat, Beat, Outcome, RBeat, Sink, Source, WBeat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteOrdering {
    /// AW and W are presented together.
    #[default]
    Concurrent,
    /// W is presented after its AW was accepted.
    AddressFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MasterConfig {
    pub ordering: WriteOrdering,
    /// Cycles to wait for a response once the request was accepted. Without a budget the
    /// caller bounds the wait.
    pub timeout_cycles: Option<u32>,
    pub prot: u8,
}

/// Progress of one transaction. A cleared transaction returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    RequestSent,
    RequestAccepted,
    ResponsePending,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub address: u64,
    pub length: usize,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    pub address: u64,
    pub data: Vec<u8>,
    pub outcome: Outcome,
}

// Responses arrive in request order, each one completes the oldest slot.
struct Slot<T> {
    id: u64,
    tx: oneshot::Sender<T>,
}

type Slots<T> = TbObj<VecDeque<Slot<T>>>;

/// Word addresses covering `length` bytes from `address`.
fn word_addresses(address: u64, length: usize, width: usize) -> Result<Vec<u64>, AxiError> {
    if length == 0 || length % width != 0 {
        return Err(AxiError::Alignment { address, length, width });
    }
    let start = address & !(width as u64 - 1);
    let end = address + length as u64;
    Ok((start..end).step_by(width).collect())
}

#[allow(unreachable_code)]
async fn dispatch<T: Beat>(sink: Sink<T>, slots: Slots<T>, clk: SimObject) -> TbResult {
    loop {
        let beat = sink.recv().await;
        let slot = slots.get().pop_front();
        match slot {
            // the receiver is gone if the transaction timed out
            Some(slot) => {
                let _ = slot.tx.send(beat);
            }
            None => clk
                .sim()
                .warn(&format!("Unexpected {} response {:?}", T::CHANNEL, beat)),
        }
    }
    Ok(Val::None)
}

fn handle_poll<T>(
    rx: &mut oneshot::Receiver<Result<T, AxiError>>,
    address: u64,
    cx: &mut Context<'_>,
) -> Poll<Result<T, AxiError>> {
    match Pin::new(rx).poll(cx) {
        Poll::Ready(Ok(result)) => Poll::Ready(result),
        Poll::Ready(Err(_)) => Poll::Ready(Err(AxiError::Cancelled { address })),
        Poll::Pending => Poll::Pending,
    }
}

/// Awaitable result of `init_write`.
pub struct WriteHandle {
    address: u64,
    state: TbObj<TxnState>,
    rx: oneshot::Receiver<Result<WriteResponse, AxiError>>,
}

impl WriteHandle {
    pub fn address(&self) -> u64 {
        self.address
    }
    pub fn state(&self) -> TxnState {
        *self.state.get()
    }
}

impl Future for WriteHandle {
    type Output = Result<WriteResponse, AxiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let address = self.address;
        handle_poll(&mut self.rx, address, cx)
    }
}

/// Awaitable result of `init_read`.
pub struct ReadHandle {
    address: u64,
    state: TbObj<TxnState>,
    rx: oneshot::Receiver<Result<ReadResponse, AxiError>>,
}

impl ReadHandle {
    pub fn address(&self) -> u64 {
        self.address
    }
    pub fn state(&self) -> TxnState {
        *self.state.get()
    }
}

impl Future for ReadHandle {
    type Output = Result<ReadResponse, AxiError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let address = self.address;
        handle_poll(&mut self.rx, address, cx)
    }
}

/*
 * WRITE
 */
enum WData {
    Queued(u64, oneshot::Receiver<()>),
    Held(WBeat),
}

struct WriteBeat {
    aw_id: u64,
    aw_ack: oneshot::Receiver<()>,
    // set once the slave took the AW or the W of this beat
    pair: TbObj<bool>,
    w: WData,
    resp: oneshot::Receiver<BBeat>,
}

#[derive(Clone)]
pub struct AxiLiteMasterWrite {
    clk: SimObject,
    width: usize,
    config: MasterConfig,
    aw_channel: Source<AwBeat>,
    w_channel: Source<WBeat>,
    b_channel: Sink<BBeat>,
    slots: Slots<BBeat>,
    in_flight: TbObj<usize>,
}

impl AxiLiteMasterWrite {
    fn new(bus: &AxiLiteBus, clk: &SimObject, rst: Option<ResetSignal>, config: MasterConfig) -> Self {
        let label = &bus.prefix;
        let write_if = AxiLiteMasterWrite {
            clk: clk.clone(),
            width: bus.width_bytes,
            config,
            aw_channel: Source::new(bus.aw.clone(), clk, rst.clone(), label),
            w_channel: Source::new(bus.w.clone(), clk, rst.clone(), label),
            b_channel: Sink::new(bus.b.clone(), clk, rst, label),
            slots: TbObj::new(VecDeque::new()),
            in_flight: TbObj::new(0),
        };
        clk.sim().spawn(
            &format!("{}_b_dispatch", label),
            dispatch(write_if.b_channel.clone(), write_if.slots.clone(), clk.clone()),
        );
        write_if
    }

    pub fn aw_channel(&self) -> &Source<AwBeat> {
        &self.aw_channel
    }
    pub fn w_channel(&self) -> &Source<WBeat> {
        &self.w_channel
    }
    pub fn b_channel(&self) -> &Sink<BBeat> {
        &self.b_channel
    }

    /// Queues a write and returns without waiting. Fails before driving anything if the
    /// length is not a non-zero multiple of the bus width.
    pub fn init_write(&self, address: u64, data: &[u8]) -> Result<WriteHandle, AxiError> {
        let words = word_addresses(address, data.len(), self.width)?;
        let mut beats = Vec::with_capacity(words.len());
        for word in words {
            let w = WBeat::from_bytes(word, self.width, address, data);
            let pair = TbObj::new(false);
            let (aw_id, aw_ack) = self.aw_channel.send_paired(
                AwBeat {
                    addr: word,
                    prot: self.config.prot,
                },
                &pair,
            );
            let (tx, resp) = oneshot::channel();
            self.slots.get().push_back(Slot { id: aw_id, tx });
            let w = match self.config.ordering {
                WriteOrdering::Concurrent => {
                    let (w_id, w_ack) = self.w_channel.send_paired(w, &pair);
                    WData::Queued(w_id, w_ack)
                }
                WriteOrdering::AddressFirst => WData::Held(w),
            };
            beats.push(WriteBeat {
                aw_id,
                aw_ack,
                pair,
                w,
                resp,
            });
        }
        self.clk
            .sim()
            .debug(|| format!("write {:#x}, {} bytes: {:02x?}", address, data.len(), data));

        let state = TbObj::new(TxnState::RequestSent);
        *self.in_flight.get() += 1;
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        let txn_state = state.clone();
        let length = data.len();
        self.clk.sim().spawn("axil_write", async move {
            let result = this.complete_write(address, length, beats, &txn_state).await;
            *this.in_flight.get() -= 1;
            let _ = tx.send(result);
            Ok(Val::None)
        });
        Ok(WriteHandle { address, state, rx })
    }

    pub async fn write(&self, address: u64, data: &[u8]) -> Result<WriteResponse, AxiError> {
        self.init_write(address, data)?.await
    }

    async fn complete_write(
        &self,
        address: u64,
        length: usize,
        beats: Vec<WriteBeat>,
        state: &TbObj<TxnState>,
    ) -> Result<WriteResponse, AxiError> {
        let aw_ids: Vec<(u64, TbObj<bool>)> = beats.iter().map(|b| (b.aw_id, b.pair.clone())).collect();
        let mut w_ids = Vec::new();
        let mut w_acks = Vec::new();
        let mut held = Vec::new();
        let mut aw_acks = Vec::new();
        let mut resps = Vec::new();
        for beat in beats {
            aw_acks.push(beat.aw_ack);
            resps.push(beat.resp);
            match beat.w {
                WData::Queued(id, ack) => {
                    w_ids.push(id);
                    w_acks.push(ack);
                }
                WData::Held(w) => held.push(w),
            }
        }

        let mut held = held.into_iter().zip(aw_ids.iter().map(|(_, pair)| pair));
        for ack in aw_acks {
            if ack.await.is_err() {
                return self.abandon(address, &aw_ids, &w_ids, state);
            }
            if let Some((w, pair)) = held.next() {
                let (id, ack) = self.w_channel.send_paired(w, pair);
                w_ids.push(id);
                w_acks.push(ack);
            }
        }
        *state.get() = TxnState::RequestAccepted;
        for ack in w_acks {
            if ack.await.is_err() {
                return self.abandon(address, &aw_ids, &w_ids, state);
            }
        }
        *state.get() = TxnState::ResponsePending;

        let collect = async move {
            let mut outcome = Outcome::Ok;
            for rx in resps {
                outcome = outcome.max(Outcome::from(rx.await.ok()?.resp));
            }
            Some(outcome)
        };
        match await_response(collect, &self.clk, self.config.timeout_cycles).await {
            Some(outcome) => {
                *state.get() = TxnState::Done;
                if outcome == Outcome::Timeout {
                    self.clk
                        .sim()
                        .warn(&format!("Write to {:#x} got no response in time", address));
                }
                self.clk
                    .sim()
                    .debug(|| format!("write {:#x} done: {:?}", address, outcome));
                Ok(WriteResponse {
                    address,
                    length,
                    outcome,
                })
            }
            None => self.abandon(address, &aw_ids, &w_ids, state),
        }
    }

    /// Withdraws every half the slave has not taken yet. Beats with one accepted half still
    /// complete on the bus, so only the response slots of withdrawn beats are dropped.
    fn abandon(
        &self,
        address: u64,
        aw_ids: &[(u64, TbObj<bool>)],
        w_ids: &[u64],
        state: &TbObj<TxnState>,
    ) -> Result<WriteResponse, AxiError> {
        for (id, _) in aw_ids {
            self.aw_channel.cancel(*id);
        }
        for id in w_ids {
            self.w_channel.cancel(*id);
        }
        let withdrawn: Vec<u64> = aw_ids
            .iter()
            .filter(|(_, pair)| !*pair.get())
            .map(|(id, _)| *id)
            .collect();
        self.slots.get().retain(|s| !withdrawn.contains(&s.id));
        *state.get() = TxnState::Idle;
        self.clk
            .sim()
            .debug(|| format!("write {:#x} cancelled", address));
        Err(AxiError::Cancelled { address })
    }

    pub fn pending(&self) -> usize {
        *self.in_flight.get()
    }

    pub fn idle(&self) -> bool {
        self.pending() == 0 && self.aw_channel.idle() && self.w_channel.idle()
    }

    fn flush(&self) {
        self.slots.get().clear();
    }
}

/*
 * READ
 */
#[derive(Clone)]
pub struct AxiLiteMasterRead {
    clk: SimObject,
    width: usize,
    config: MasterConfig,
    ar_channel: Source<ArBeat>,
    r_channel: Sink<RBeat>,
    slots: Slots<RBeat>,
    in_flight: TbObj<usize>,
}

impl AxiLiteMasterRead {
    fn new(bus: &AxiLiteBus, clk: &SimObject, rst: Option<ResetSignal>, config: MasterConfig) -> Self {
        let label = &bus.prefix;
        let read_if = AxiLiteMasterRead {
            clk: clk.clone(),
            width: bus.width_bytes,
            config,
            ar_channel: Source::new(bus.ar.clone(), clk, rst.clone(), label),
            r_channel: Sink::new(bus.r.clone(), clk, rst, label),
            slots: TbObj::new(VecDeque::new()),
            in_flight: TbObj::new(0),
        };
        clk.sim().spawn(
            &format!("{}_r_dispatch", label),
            dispatch(read_if.r_channel.clone(), read_if.slots.clone(), clk.clone()),
        );
        read_if
    }

    pub fn ar_channel(&self) -> &Source<ArBeat> {
        &self.ar_channel
    }
    pub fn r_channel(&self) -> &Sink<RBeat> {
        &self.r_channel
    }

    pub fn init_read(&self, address: u64, length: usize) -> Result<ReadHandle, AxiError> {
        let words = word_addresses(address, length, self.width)?;
        let mut beats = Vec::with_capacity(words.len());
        for word in words {
            let (ar_id, ar_ack) = self.ar_channel.send(ArBeat {
                addr: word,
                prot: self.config.prot,
            });
            let (tx, resp) = oneshot::channel();
            self.slots.get().push_back(Slot { id: ar_id, tx });
            beats.push((word, ar_id, ar_ack, resp));
        }

        let state = TbObj::new(TxnState::RequestSent);
        *self.in_flight.get() += 1;
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        let txn_state = state.clone();
        self.clk.sim().spawn("axil_read", async move {
            let result = this.complete_read(address, length, beats, &txn_state).await;
            *this.in_flight.get() -= 1;
            let _ = tx.send(result);
            Ok(Val::None)
        });
        Ok(ReadHandle { address, state, rx })
    }

    pub async fn read(&self, address: u64, length: usize) -> Result<ReadResponse, AxiError> {
        self.init_read(address, length)?.await
    }

    #[allow(clippy::type_complexity)]
    async fn complete_read(
        &self,
        address: u64,
        length: usize,
        beats: Vec<(u64, u64, oneshot::Receiver<()>, oneshot::Receiver<RBeat>)>,
        state: &TbObj<TxnState>,
    ) -> Result<ReadResponse, AxiError> {
        let ar_ids: Vec<u64> = beats.iter().map(|b| b.1).collect();
        let mut resps = Vec::with_capacity(beats.len());
        for (word, _, ack, resp) in beats {
            if ack.await.is_err() {
                return self.abandon(address, &ar_ids, state);
            }
            *state.get() = TxnState::RequestAccepted;
            resps.push((word, resp));
        }
        *state.get() = TxnState::ResponsePending;

        let width = self.width;
        let collect = async move {
            let mut outcome = Outcome::Ok;
            let mut data = vec![0u8; length];
            for (word, rx) in resps {
                let beat = rx.await.ok()?;
                outcome = outcome.max(Outcome::from(beat.resp));
                for lane in 0..width {
                    let addr = word + lane as u64;
                    if addr >= address && addr < address + length as u64 {
                        data[(addr - address) as usize] = (beat.data >> (8 * lane)) as u8;
                    }
                }
            }
            Some((outcome, data))
        }
        .boxed();
        let timed_out = vec![0u8; length];
        let result = match self.config.timeout_cycles {
            None => collect.await,
            Some(n) => match select(collect, clock_cycles(self.clk.clone(), n).boxed()).await {
                Either::Left((result, _)) => result,
                Either::Right(_) => Some((Outcome::Timeout, timed_out)),
            },
        };
        match result {
            Some((outcome, data)) => {
                *state.get() = TxnState::Done;
                if outcome == Outcome::Timeout {
                    self.clk
                        .sim()
                        .warn(&format!("Read from {:#x} got no response in time", address));
                }
                self.clk
                    .sim()
                    .debug(|| format!("read {:#x} done: {:?} {:02x?}", address, outcome, data));
                Ok(ReadResponse { address, data, outcome })
            }
            None => self.abandon(address, &ar_ids, state),
        }
    }

    fn abandon(&self, address: u64, ar_ids: &[u64], state: &TbObj<TxnState>) -> Result<ReadResponse, AxiError> {
        for id in ar_ids {
            self.ar_channel.cancel(*id);
        }
        self.slots.get().retain(|s| !ar_ids.contains(&s.id));
        *state.get() = TxnState::Idle;
        Err(AxiError::Cancelled { address })
    }

    pub fn pending(&self) -> usize {
        *self.in_flight.get()
    }

    pub fn idle(&self) -> bool {
        self.pending() == 0 && self.ar_channel.idle()
    }

    fn flush(&self) {
        self.slots.get().clear();
    }
}

/// Waits for `collect`, bounded by `timeout_cycles` rising edges of `clk` if given.
async fn await_response(
    collect: impl Future<Output = Option<Outcome>> + Send + 'static,
    clk: &SimObject,
    timeout_cycles: Option<u32>,
) -> Option<Outcome> {
    match timeout_cycles {
        None => collect.await,
        Some(n) => match select(collect.boxed(), clock_cycles(clk.clone(), n).boxed()).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(_) => Some(Outcome::Timeout),
        },
    }
}

/*
 * MASTER
 */
/// AXI-Lite master issuing reads and writes on a bus.
///
/// While the reset input is at `reset_active_level` all valid outputs are low, queued
/// requests are dropped and pending transactions resolve as cancelled.
#[derive(Clone)]
pub struct AxiLiteMaster {
    pub write_if: AxiLiteMasterWrite,
    pub read_if: AxiLiteMasterRead,
}

impl AxiLiteMaster {
    pub fn new(bus: AxiLiteBus, clk: SimObject, rst: Option<SimObject>, reset_active_level: bool) -> Self {
        AxiLiteMaster::with_config(bus, clk, rst, reset_active_level, MasterConfig::default())
    }

    pub fn with_config(
        bus: AxiLiteBus,
        clk: SimObject,
        rst: Option<SimObject>,
        reset_active_level: bool,
        config: MasterConfig,
    ) -> Self {
        let rst = ResetSignal::new(rst, reset_active_level);
        let master = AxiLiteMaster {
            write_if: AxiLiteMasterWrite::new(&bus, &clk, rst.clone(), config),
            read_if: AxiLiteMasterRead::new(&bus, &clk, rst.clone(), config),
        };
        if let Some(rst) = rst {
            clk.sim().spawn(
                &format!("{}_reset", bus.prefix),
                master.clone().watch_reset(clk.clone(), rst),
            );
        }
        master
    }

    #[allow(unreachable_code)]
    async fn watch_reset(self, clk: SimObject, rst: ResetSignal) -> TbResult {
        loop {
            clk.rising_edge().await;
            if rst.is_active() {
                self.write_if.flush();
                self.read_if.flush();
            }
        }
        Ok(Val::None)
    }

    pub fn init_write(&self, address: u64, data: &[u8]) -> Result<WriteHandle, AxiError> {
        self.write_if.init_write(address, data)
    }

    pub async fn write(&self, address: u64, data: &[u8]) -> Result<WriteResponse, AxiError> {
        self.write_if.write(address, data).await
    }

    pub fn init_read(&self, address: u64, length: usize) -> Result<ReadHandle, AxiError> {
        self.read_if.init_read(address, length)
    }

    pub async fn read(&self, address: u64, length: usize) -> Result<ReadResponse, AxiError> {
        self.read_if.read(address, length).await
    }

    pub fn idle(&self) -> bool {
        self.write_if.idle() && self.read_if.idle()
    }

    pub fn pending(&self) -> usize {
        self.write_if.pending() + self.read_if.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_and_unaligned_words() {
        assert_eq!(word_addresses(8, 8, 4), Ok(vec![8, 12]));
        assert_eq!(word_addresses(6, 4, 4), Ok(vec![4, 8]));
        assert_eq!(word_addresses(0x13, 8, 8), Ok(vec![0x10, 0x18]));
    }

    #[test]
    fn bad_lengths_rejected() {
        assert_eq!(
            word_addresses(0, 0, 4),
            Err(AxiError::Alignment {
                address: 0,
                length: 0,
                width: 4
            })
        );
        assert!(word_addresses(0, 6, 4).is_err());
    }
}
