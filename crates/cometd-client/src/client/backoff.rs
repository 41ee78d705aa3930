/// Linear reconnection backoff: grows by `increment` per consecutive failure
/// up to `max`, back to zero on success.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    increment_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(increment_ms: u64, max_ms: u64) -> Self {
        Self {
            increment_ms,
            max_ms,
            current_ms: 0,
        }
    }

    pub fn increment_ms(&self) -> u64 {
        self.increment_ms
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    pub fn increase(&mut self) {
        self.current_ms = self
            .current_ms
            .saturating_add(self.increment_ms)
            .min(self.max_ms);
    }

    pub fn reset(&mut self) {
        self.current_ms = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(1_000, 60_000)
    }
}
