use crate::config::ConfigError;
use crate::signal::SimObject;
use crate::sim::Sim;

use super::{AxiError, Channel};

/// Handshake and payload signals of one channel.
#[derive(Debug, Clone)]
pub struct ChannelSignals {
    pub channel: Channel,
    pub valid: SimObject,
    pub ready: SimObject,
    /// Payload signals in [`Channel::fields`] order.
    pub fields: Vec<SimObject>,
}

impl ChannelSignals {
    fn from_prefix(dut: &SimObject, prefix: &str, channel: Channel, width_bytes: usize) -> Result<Self, AxiError> {
        let get = |suffix: &str| {
            let name = format!("{}_{}{}", prefix, channel.name(), suffix);
            dut.get_child(&name).map_err(|_| AxiError::MissingSignal(name))
        };
        let fields = channel
            .fields(width_bytes)
            .iter()
            .map(|(name, _)| get(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChannelSignals {
            channel,
            valid: get("valid")?,
            ready: get("ready")?,
            fields,
        })
    }

    pub fn valid_high(&self) -> bool {
        self.valid.is_high()
    }

    pub fn ready_high(&self) -> bool {
        self.ready.is_high()
    }

    /// Current payload values, undriven fields read as 0.
    pub fn sample(&self) -> Vec<u64> {
        self.fields.iter().map(|f| f.try_u64().unwrap_or(0)).collect()
    }

    pub fn drive(&self, values: &[u64]) {
        for (f, v) in self.fields.iter().zip(values) {
            f.set(*v);
        }
    }

    /// Stops driving the signals a source owns: `valid` and the payload.
    pub fn release_source(&self) {
        self.valid.set_z();
        for f in &self.fields {
            f.set_z();
        }
    }

    /// Stops driving `ready`.
    pub fn release_sink(&self) {
        self.ready.set_z();
    }
}

/// The five channels of one AXI-Lite bus instance, named `<prefix>_<channel><signal>`.
#[derive(Debug, Clone)]
pub struct AxiLiteBus {
    pub prefix: String,
    pub width_bytes: usize,
    pub aw: ChannelSignals,
    pub w: ChannelSignals,
    pub b: ChannelSignals,
    pub ar: ChannelSignals,
    pub r: ChannelSignals,
}

impl AxiLiteBus {
    /// Resolves the signals of bus `prefix` below `dut`. The data width is taken from
    /// `<prefix>_wdata`.
    pub fn from_prefix(dut: &SimObject, prefix: &str) -> Result<Self, AxiError> {
        let wdata_name = format!("{}_wdata", prefix);
        let wdata = dut
            .get_child(&wdata_name)
            .map_err(|_| AxiError::MissingSignal(wdata_name))?;
        let width_bytes = (wdata.size() / 8) as usize;
        let ch = |channel| ChannelSignals::from_prefix(dut, prefix, channel, width_bytes);
        Ok(AxiLiteBus {
            prefix: prefix.to_string(),
            width_bytes,
            aw: ch(Channel::Aw)?,
            w: ch(Channel::W)?,
            b: ch(Channel::B)?,
            ar: ch(Channel::Ar)?,
            r: ch(Channel::R)?,
        })
    }

    /// Declares the nets of a bus below `parent` and resolves them.
    pub fn declare(sim: &Sim, parent: &SimObject, prefix: &str, width_bytes: usize) -> Result<Self, ConfigError> {
        if width_bytes != 4 && width_bytes != 8 {
            return Err(ConfigError::BusWidth(width_bytes));
        }
        for channel in [Channel::Aw, Channel::W, Channel::B, Channel::Ar, Channel::R] {
            let mut nets = vec![("valid", 1), ("ready", 1)];
            nets.extend(channel.fields(width_bytes));
            for (suffix, width) in nets {
                let name = format!("{}_{}{}", prefix, channel.name(), suffix);
                sim.add_net(parent, &name, width)
                    .map_err(|_| ConfigError::Declare(name.clone()))?;
            }
        }
        AxiLiteBus::from_prefix(parent, prefix).map_err(|e| ConfigError::Declare(e.to_string()))
    }

    pub fn channels(&self) -> [&ChannelSignals; 5] {
        [&self.aw, &self.w, &self.b, &self.ar, &self.r]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TbConfig;

    #[test]
    fn declared_bus_resolves_by_prefix() {
        let sim = Sim::new("top", &TbConfig::default());
        let dut = sim.add_scope(&sim.root(), "dut").unwrap();
        let bus = AxiLiteBus::declare(&sim, &dut, "s_axi", 8).unwrap();
        assert_eq!(bus.width_bytes, 8);
        assert_eq!(bus.w.fields[0].size(), 64);
        assert_eq!(bus.b.fields.len(), 1);
        assert_eq!(bus.ar.valid.name(), "top.dut.s_axi_arvalid");

        let again = AxiLiteBus::from_prefix(&dut, "s_axi").unwrap();
        assert_eq!(again.r.fields[1], bus.r.fields[1]);
    }

    #[test]
    fn missing_signals_are_reported() {
        let sim = Sim::new("top", &TbConfig::default());
        let dut = sim.add_scope(&sim.root(), "dut").unwrap();
        assert_eq!(
            AxiLiteBus::from_prefix(&dut, "m_axi").unwrap_err(),
            AxiError::MissingSignal("m_axi_wdata".to_string())
        );
        assert_eq!(
            AxiLiteBus::declare(&sim, &dut, "m_axi", 2).unwrap_err(),
            ConfigError::BusWidth(2)
        );
    }
}
