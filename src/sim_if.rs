use crate::signal::ObjectKind;
use crate::value::Value;
use crate::SimpleResult;

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

/// Access to a simulator: object lookup, values, time and callbacks.
pub trait SimIf {
    /// Schedules `value` on a net. The write becomes visible in the next delta cycle.
    fn set_value(&self, handle: usize, value: Value, force: bool) -> SimpleResult<()>;
    fn release(&self, handle: usize) -> SimpleResult<()>;
    fn get_value(&self, handle: usize) -> SimpleResult<Value>;
    fn get_handle_by_name(&self, name: &str) -> SimpleResult<usize>;
    fn get_full_name(&self, handle: usize) -> SimpleResult<String>;
    fn get_kind(&self, handle: usize) -> ObjectKind;
    fn get_root_handle(&self) -> SimpleResult<usize>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    /// Time callbacks take a delay relative to now and report the absolute time when fired.
    fn register_callback(&self, cb: SimCallback) -> SimpleResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> SimpleResult<()>;
    fn log(&self, msg: &str);
    fn warn(&self, msg: &str);

    fn get_sim_time(&self, unit: &str) -> f64 {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        match time_scale(unit) {
            Ok(scale) => ldexp10(t, precision - scale),
            Err(_) => panic!("Unknown time unit '{}'", unit),
        }
    }

    fn get_sim_steps(&self, time: f64, unit: &str) -> u64 {
        let precision = self.get_sim_precision();
        let scale = time_scale(unit).unwrap_or_else(|_| panic!("Unknown time unit '{}'", unit));
        let steps = ldexp10(time, scale - precision);
        if steps % 1.0 == 0.0 {
            steps as u64
        } else {
            panic!(
                "Can't convert time {} {} to sim steps without rounding (sim precision: {})",
                time,
                unit,
                scale_time(precision).unwrap_or_else(|_| format!("1e{}", precision))
            );
        }
    }
}

pub(crate) fn time_scale(unit: &str) -> SimpleResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(()),
    }
}

pub(crate) fn scale_time(unit: i8) -> SimpleResult<String> {
    match unit {
        -15 => Ok("fs".to_string()),
        -12 => Ok("ps".to_string()),
        -9 => Ok("ns".to_string()),
        -6 => Ok("us".to_string()),
        -3 => Ok("ms".to_string()),
        0 => Ok("sec".to_string()),
        _ => Err(()),
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_round_trip() {
        for unit in ["fs", "ps", "ns", "us", "ms", "sec"] {
            let s = time_scale(unit).unwrap();
            assert_eq!(scale_time(s).unwrap(), unit);
        }
        assert!(time_scale("min").is_err());
    }

    #[test]
    fn ldexp10_both_directions() {
        assert_eq!(ldexp10(2.0, 3), 2000.0);
        assert_eq!(ldexp10(2500.0, -3), 2.5);
    }
}
