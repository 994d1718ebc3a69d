pub use crate::assertion::{Assertion, Assertions};
pub use crate::axi::{
    random_bool, AxiLiteBus, AxiLiteMaster, AxiLiteRam, AxiProtocolChecker, ChannelMonitor, MasterConfig, Outcome,
    PauseGenerator, WriteOrdering,
};
pub use crate::config::{ConfigError, TbConfig};
pub use crate::executor::{JoinHandle, Task};
pub use crate::signal::SimObject;
pub use crate::sim::Sim;
pub use crate::tb_obj::TbObj;
pub use crate::testbench::{clock, reset_pulse, Monitor, Scoreboard};
pub use crate::trigger::Trigger;
pub use crate::utils::{self, clock_cycles};
pub use crate::value::{Logic, Val, Value};
pub use crate::{assertion, check};
pub use crate::{SimpleResult, TbResult};
pub use futures::future::FutureExt;
