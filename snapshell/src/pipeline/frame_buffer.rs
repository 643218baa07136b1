use snapshell_core::Frame;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Already rendered past it, or older than everything retained.
    Stale,
    Duplicate,
}

/// Small reorder window between the network and the renderer.
#[derive(Debug)]
pub struct FrameBuffer {
    capacity: usize,
    grace: Duration,
    frames: BTreeMap<u64, Frame>,
    last_rendered: Option<u64>,
    gap_since: Option<Instant>,
}

impl FrameBuffer {
    pub fn new(capacity: usize, grace: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            grace,
            frames: BTreeMap::new(),
            last_rendered: None,
            gap_since: None,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last_rendered(&self) -> Option<u64> {
        self.last_rendered
    }

    pub fn insert(&mut self, frame: Frame) -> InsertOutcome {
        if self.last_rendered.is_some_and(|last| frame.seq <= last) {
            return InsertOutcome::Stale;
        }
        if self.frames.contains_key(&frame.seq) {
            return InsertOutcome::Duplicate;
        }

        if self.frames.len() >= self.capacity {
            match self.frames.keys().next() {
                Some(&oldest) if frame.seq < oldest => return InsertOutcome::Stale,
                _ => {
                    self.frames.pop_first();
                }
            }
        }

        self.frames.insert(frame.seq, frame);
        InsertOutcome::Inserted
    }

    /// Next frame to draw, if one is due at `now`.
    ///
    /// Takes the newest frame of the run that continues the last rendered
    /// seq. A missing seq is waited for up to the grace window (not at all
    /// once the buffer is full), then skipped.
    pub fn take_next(&mut self, now: Instant) -> Option<Frame> {
        let (&oldest, _) = self.frames.first_key_value()?;

        let start = match self.last_rendered {
            None => Some(oldest),
            Some(last) if oldest == last + 1 => Some(oldest),
            Some(_) => None,
        };

        let target = match start {
            Some(start) => self.run_end(start),
            None => {
                let full = self.frames.len() >= self.capacity;
                let since = *self.gap_since.get_or_insert(now);
                if !full && now.duration_since(since) < self.grace {
                    return None;
                }
                *self.frames.keys().next_back()?
            }
        };

        self.take(target)
    }

    /// When a pending gap stops being waited for.
    pub fn gap_deadline(&self) -> Option<Instant> {
        self.gap_since.map(|since| since + self.grace)
    }

    fn run_end(&self, start: u64) -> u64 {
        let mut end = start;
        for &seq in self.frames.range(start + 1..).map(|(seq, _)| seq) {
            if seq != end + 1 {
                break;
            }
            end = seq;
        }
        end
    }

    fn take(&mut self, seq: u64) -> Option<Frame> {
        let frame = self.frames.remove(&seq)?;
        self.frames.retain(|&kept, _| kept > seq);
        self.last_rendered = Some(seq);
        self.gap_since = None;
        Some(frame)
    }
}

/// [`FrameBuffer`] shared between the receive task and the renderer.
#[derive(Debug)]
pub struct SharedFrameBuffer {
    inner: Mutex<FrameBuffer>,
    notify: Notify,
}

impl SharedFrameBuffer {
    pub fn new(capacity: usize, grace: Duration) -> Self {
        Self {
            inner: Mutex::new(FrameBuffer::new(capacity, grace)),
            notify: Notify::new(),
        }
    }

    pub fn insert(&self, frame: Frame) -> InsertOutcome {
        let outcome = self.lock().insert(frame);
        if outcome == InsertOutcome::Inserted {
            self.notify.notify_one();
        }
        outcome
    }

    pub fn take_next(&self, now: Instant) -> Option<Frame> {
        self.lock().take_next(now)
    }

    pub fn gap_deadline(&self) -> Option<Instant> {
        self.lock().gap_deadline()
    }

    pub fn last_rendered(&self) -> Option<u64> {
        self.lock().last_rendered()
    }

    /// Resolves after the next successful insert.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    fn lock(&self) -> MutexGuard<'_, FrameBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
