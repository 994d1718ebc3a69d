use rand::Rng;

/// Cyclic stall pattern. One element is consumed per clock edge; `true` stalls that cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PauseGenerator {
    pattern: Vec<bool>,
    pos: usize,
}

impl PauseGenerator {
    pub fn new(pattern: Vec<bool>) -> Self {
        PauseGenerator { pattern, pos: 0 }
    }

    /// Stalls on every cycle where `f(cycle)` is true, repeating after `period` cycles.
    pub fn from_fn(period: usize, f: impl Fn(usize) -> bool) -> Self {
        PauseGenerator::new((0..period).map(f).collect())
    }

    pub fn restart(&mut self) {
        self.pos = 0;
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Next element; an empty pattern never stalls.
    pub fn advance(&mut self) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        let pause = self.pattern[self.pos];
        self.pos = (self.pos + 1) % self.pattern.len();
        pause
    }
}

impl Iterator for PauseGenerator {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        match self.pattern.is_empty() {
            true => None,
            false => Some(self.advance()),
        }
    }
}

/// 256 random stall decisions, repeated forever.
pub fn random_bool(rng: &mut impl Rng) -> PauseGenerator {
    PauseGenerator::new((0..256).map(|_| rng.gen::<bool>()).collect())
}
