use std::time::Duration;

use tokio::time::Instant;

/// Paces inbound notifications to at most `n` per second. Excess
/// notifications are delayed, never dropped.
#[derive(Debug)]
pub(crate) struct Throttle {
    period: Option<Duration>,
    next_slot: Option<Instant>,
}

impl Throttle {
    pub fn per_second(n: u32) -> Self {
        let period = (n > 0).then(|| Duration::from_secs(1) / n);
        Self {
            period,
            next_slot: None,
        }
    }

    /// Claim the next delivery slot. Returns the instant to wait for, or
    /// `None` if delivery may happen at `now`.
    pub fn reserve(&mut self, now: Instant) -> Option<Instant> {
        let period = self.period?;
        let slot = match self.next_slot {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_slot = Some(slot + period);
        (slot > now).then_some(slot)
    }

    pub async fn acquire(&mut self) {
        if let Some(at) = self.reserve(Instant::now()) {
            tokio::time::sleep_until(at).await;
        }
    }
}
