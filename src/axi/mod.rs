//! AXI-Lite bus functional models: a master issuing transactions, a memory-backed slave,
//! channel-level sources and sinks with stall injection, and passive monitors and checkers.

mod beat;
mod bus;
mod channel;
mod checker;
mod master;
mod memory;
mod monitor;
mod pause;
mod ram;

use std::fmt;
use thiserror::Error;

pub use beat::{ArBeat, AwBeat, BBeat, Beat, RBeat, WBeat};
pub use bus::{AxiLiteBus, ChannelSignals};
pub use channel::{Sink, Source};
pub use checker::AxiProtocolChecker;
pub use master::{
    AxiLiteMaster, AxiLiteMasterRead, AxiLiteMasterWrite, MasterConfig, ReadHandle, ReadResponse, TxnState,
    WriteHandle, WriteOrdering, WriteResponse,
};
pub use memory::MemoryRegion;
pub use monitor::ChannelMonitor;
pub use pause::{random_bool, PauseGenerator};
pub use ram::{AxiLiteRam, AxiLiteRamRead, AxiLiteRamWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Aw,
    W,
    B,
    Ar,
    R,
}

impl Channel {
    /// Signal name infix, `s_axi_` + `aw` + `valid`.
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Aw => "aw",
            Channel::W => "w",
            Channel::B => "b",
            Channel::Ar => "ar",
            Channel::R => "r",
        }
    }

    /// Payload fields and their widths for a bus of `width_bytes`.
    pub fn fields(&self, width_bytes: usize) -> Vec<(&'static str, u32)> {
        let data_bits = (width_bytes * 8) as u32;
        match self {
            Channel::Aw | Channel::Ar => vec![("addr", 32), ("prot", 3)],
            Channel::W => vec![("data", data_bits), ("strb", width_bytes as u32)],
            Channel::B => vec![("resp", 2)],
            Channel::R => vec![("data", data_bits), ("resp", 2)],
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_uppercase())
    }
}

/// Response code of a B or R beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Resp {
    #[default]
    Okay,
    ExOkay,
    SlvErr,
    DecErr,
}

impl Resp {
    pub fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Resp::Okay,
            1 => Resp::ExOkay,
            2 => Resp::SlvErr,
            _ => Resp::DecErr,
        }
    }

    pub fn bits(&self) -> u64 {
        match self {
            Resp::Okay => 0,
            Resp::ExOkay => 1,
            Resp::SlvErr => 2,
            Resp::DecErr => 3,
        }
    }
}

/// Result of a completed bus transaction. Bus errors are outcomes, not `Err`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Ok,
    SlvErr,
    DecErr,
    Timeout,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        *self == Outcome::Ok
    }
}

impl From<Resp> for Outcome {
    fn from(resp: Resp) -> Self {
        match resp {
            Resp::Okay | Resp::ExOkay => Outcome::Ok,
            Resp::SlvErr => Outcome::SlvErr,
            Resp::DecErr => Outcome::DecErr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AxiError {
    #[error("length {length} at {address:#x} is not a non-zero multiple of the {width}-byte bus width")]
    Alignment { address: u64, length: usize, width: usize },
    #[error("access of {length} bytes at {address:#x} exceeds memory of {size} bytes")]
    OutOfRange { address: u64, length: usize, size: usize },
    #[error("protocol violation on {channel}: {detail}")]
    ProtocolViolation { channel: Channel, detail: String },
    #[error("transaction at {address:#x} was cancelled")]
    Cancelled { address: u64 },
    #[error("bus signal {0} not found")]
    MissingSignal(String),
}

impl From<AxiError> for crate::value::Val {
    fn from(e: AxiError) -> Self {
        crate::value::Val::String(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_outcome_wins() {
        let outcomes = [Outcome::Ok, Outcome::DecErr, Outcome::SlvErr];
        assert_eq!(outcomes.iter().max(), Some(&Outcome::DecErr));
        assert_eq!(Outcome::from(Resp::ExOkay), Outcome::Ok);
    }

    #[test]
    fn resp_bits() {
        for resp in [Resp::Okay, Resp::ExOkay, Resp::SlvErr, Resp::DecErr] {
            assert_eq!(Resp::from_bits(resp.bits()), resp);
        }
    }

    #[test]
    fn error_messages() {
        let e = AxiError::ProtocolViolation {
            channel: Channel::Aw,
            detail: "valid dropped".to_string(),
        };
        assert_eq!(e.to_string(), "protocol violation on AW: valid dropped");
        let e = AxiError::Alignment {
            address: 0x10,
            length: 3,
            width: 4,
        };
        assert!(e.to_string().contains("0x10"));
    }
}
