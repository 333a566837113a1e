use std::time::{Duration, Instant};

use crate::{AudioBackend, Source, SpectrumSample};

/// Why a tick produced no sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The scheduler is cancelled or was never started.
    Unregistered,
    /// Called before the next deadline.
    NotDue,
    /// No backend, or the backend is not playing.
    Idle,
    /// The backend returned an error for this snapshot.
    Failed,
    /// The snapshot length differs from the expected bin count.
    LengthMismatch { len: usize },
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    Sample(SpectrumSample),
    Skipped(SkipReason),
}

impl Poll {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Poll::Sample(_) => None,
            Poll::Skipped(reason) => Some(*reason),
        }
    }
}

/// Fixed-interval spectrum sampler driven by the host's main loop.
///
/// The host sleeps until [`PollingScheduler::next_deadline`] and then calls
/// [`PollingScheduler::tick`]. Late ticks are not replayed: the next deadline
/// is always one interval after the tick that ran. After
/// [`PollingScheduler::cancel`] returns, ticks are ignored until the next
/// [`PollingScheduler::start`].
#[derive(Debug, Clone)]
pub struct PollingScheduler {
    interval: Duration,
    expected_len: usize,
    next_due: Option<Instant>,
}

impl PollingScheduler {
    pub fn new(interval: Duration, expected_len: usize) -> Self {
        Self {
            interval,
            expected_len,
            next_due: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    /// Registers the periodic callback; the first tick is due at `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    /// De-registers the periodic callback.
    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_registered(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn tick(
        &mut self,
        now: Instant,
        backend: Option<&mut dyn AudioBackend>,
        source: Source,
    ) -> Poll {
        let Some(due) = self.next_due else {
            return Poll::Skipped(SkipReason::Unregistered);
        };
        if now < due {
            return Poll::Skipped(SkipReason::NotDue);
        }

        let late = now.duration_since(due);
        if late >= self.interval {
            let missed = (late.as_nanos() / self.interval.as_nanos().max(1)) as u64;
            tracing::trace!(missed, "dropping missed polling ticks");
        }
        self.next_due = Some(now + self.interval);

        let Some(backend) = backend else {
            return Poll::Skipped(SkipReason::Idle);
        };
        if !backend.is_playing() {
            return Poll::Skipped(SkipReason::Idle);
        }

        match backend.spectrum(source) {
            Ok(sample) if sample.len() == self.expected_len => Poll::Sample(sample),
            Ok(sample) => {
                tracing::trace!(
                    len = sample.len(),
                    expected = self.expected_len,
                    "discarding spectrum with unexpected length"
                );
                Poll::Skipped(SkipReason::LengthMismatch { len: sample.len() })
            }
            Err(err) => {
                tracing::debug!(%err, backend = %backend.kind(), "spectrum poll failed");
                Poll::Skipped(SkipReason::Failed)
            }
        }
    }
}
