use std::fmt;

/// Payload carried by task and test results.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Int(i64),
    String(String),
    None,
}

/// Value of a single bit: driven low, driven high or undriven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logic {
    Zero,
    One,
    Z,
}

impl Logic {
    pub fn from_bool(b: bool) -> Self {
        match b {
            true => Logic::One,
            false => Logic::Zero,
        }
    }

    pub fn is_high(self) -> bool {
        self == Logic::One
    }

    pub fn is_low(self) -> bool {
        self == Logic::Zero
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::Z => 'z',
        };
        write!(f, "{}", c)
    }
}

/// Value held by a net. A net is either undriven as a whole or carries an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Z,
    Int(u64),
}

impl Value {
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Value::Int(v) => Some(v),
            Value::Z => None,
        }
    }

    pub fn is_z(self) -> bool {
        matches!(self, Value::Z)
    }

    /// Least significant bit as three-valued logic.
    pub fn logic(self) -> Logic {
        match self {
            Value::Z => Logic::Z,
            Value::Int(v) => Logic::from_bool(v & 1 == 1),
        }
    }

    /// Truncates the value to `width` bits.
    pub fn masked(self, width: u32) -> Self {
        match self {
            Value::Z => Value::Z,
            Value::Int(v) => Value::Int(v & width_mask(width)),
        }
    }

    pub fn to_bin(self, width: u32) -> String {
        match self {
            Value::Z => "z".repeat(width as usize),
            Value::Int(v) => format!("{:0w$b}", v & width_mask(width), w = width as usize),
        }
    }
}

impl From<Logic> for Value {
    fn from(l: Logic) -> Self {
        match l {
            Logic::Zero => Value::Int(0),
            Logic::One => Value::Int(1),
            Logic::Z => Value::Z,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(b as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v)
    }
}

pub(crate) fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1_u64 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_strings() {
        assert_eq!(Value::Int(5).to_bin(4), "0101");
        assert_eq!(Value::Z.to_bin(3), "zzz");
        assert_eq!(Value::Int(0x1ff).to_bin(8), "11111111");
    }

    #[test]
    fn logic_of_values() {
        assert_eq!(Value::Z.logic(), Logic::Z);
        assert_eq!(Value::Int(2).logic(), Logic::Zero);
        assert_eq!(Value::Int(3).logic(), Logic::One);
        assert_eq!(Logic::Z.to_string(), "z");
    }

    #[test]
    fn masking() {
        assert_eq!(Value::Int(0xabcd).masked(8), Value::Int(0xcd));
        assert_eq!(Value::Int(u64::MAX).masked(64), Value::Int(u64::MAX));
        assert_eq!(Value::Z.masked(8), Value::Z);
    }
}
