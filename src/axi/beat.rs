use std::fmt::Debug;

use super::{Channel, Resp};

/// Payload of one channel handshake, converted to and from the channel's field values in
/// the order given by [`Channel::fields`].
pub trait Beat: Clone + Debug + PartialEq + Send + 'static {
    const CHANNEL: Channel;

    fn to_values(&self) -> Vec<u64>;
    fn from_values(values: &[u64]) -> Self;
}

fn field(values: &[u64], i: usize) -> u64 {
    values.get(i).copied().unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AwBeat {
    pub addr: u64,
    pub prot: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WBeat {
    pub data: u64,
    pub strb: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BBeat {
    pub resp: Resp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArBeat {
    pub addr: u64,
    pub prot: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RBeat {
    pub data: u64,
    pub resp: Resp,
}

impl Beat for AwBeat {
    const CHANNEL: Channel = Channel::Aw;
    fn to_values(&self) -> Vec<u64> {
        vec![self.addr, self.prot as u64]
    }
    fn from_values(values: &[u64]) -> Self {
        AwBeat {
            addr: field(values, 0),
            prot: field(values, 1) as u8,
        }
    }
}

impl Beat for WBeat {
    const CHANNEL: Channel = Channel::W;
    fn to_values(&self) -> Vec<u64> {
        vec![self.data, self.strb as u64]
    }
    fn from_values(values: &[u64]) -> Self {
        WBeat {
            data: field(values, 0),
            strb: field(values, 1) as u8,
        }
    }
}

impl Beat for BBeat {
    const CHANNEL: Channel = Channel::B;
    fn to_values(&self) -> Vec<u64> {
        vec![self.resp.bits()]
    }
    fn from_values(values: &[u64]) -> Self {
        BBeat {
            resp: Resp::from_bits(field(values, 0)),
        }
    }
}

impl Beat for ArBeat {
    const CHANNEL: Channel = Channel::Ar;
    fn to_values(&self) -> Vec<u64> {
        vec![self.addr, self.prot as u64]
    }
    fn from_values(values: &[u64]) -> Self {
        ArBeat {
            addr: field(values, 0),
            prot: field(values, 1) as u8,
        }
    }
}

impl Beat for RBeat {
    const CHANNEL: Channel = Channel::R;
    fn to_values(&self) -> Vec<u64> {
        vec![self.data, self.resp.bits()]
    }
    fn from_values(values: &[u64]) -> Self {
        RBeat {
            data: field(values, 0),
            resp: Resp::from_bits(field(values, 1)),
        }
    }
}

impl WBeat {
    /// Word beat covering the bytes of `data` that fall into the word at `word_addr`.
    /// `data` starts at `start`; bytes outside it get a cleared strobe.
    pub(crate) fn from_bytes(word_addr: u64, width: usize, start: u64, data: &[u8]) -> Self {
        let mut beat = WBeat::default();
        for lane in 0..width {
            let addr = word_addr + lane as u64;
            if addr < start {
                continue;
            }
            if let Some(byte) = data.get((addr - start) as usize) {
                beat.data |= (*byte as u64) << (8 * lane);
                beat.strb |= 1 << lane;
            }
        }
        beat
    }
}
