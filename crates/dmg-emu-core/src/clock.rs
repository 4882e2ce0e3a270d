/// Machine-cycle accumulator for the instruction currently executing.
///
/// Cycles are added while an instruction runs and committed exactly once per
/// CPU step via [`Clock::accept`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Clock {
    pending: u32,
    total: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, m_cycles: u32) {
        self.pending += m_cycles;
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Commit the pending cycles and return how many there were.
    pub fn accept(&mut self) -> u32 {
        let delta = self.pending;
        self.total += delta as u64;
        self.pending = 0;
        delta
    }

    pub fn reject(&mut self) {
        self.pending = 0;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn reset(&mut self) {
        self.pending = 0;
        self.total = 0;
    }
}
