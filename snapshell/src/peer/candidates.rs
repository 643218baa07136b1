use snapshell_core::IceCandidate;

/// Holds remote candidates until a remote description they can be applied to exists.
#[derive(Debug, Default)]
pub struct CandidateQueue {
    ready: bool,
    pending: Vec<IceCandidate>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the candidate back when it can be applied right away.
    pub fn push(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.ready {
            Some(candidate)
        } else {
            self.pending.push(candidate);
            None
        }
    }

    /// Marks the remote description as applied and drains the queue in arrival order.
    pub fn mark_ready(&mut self) -> Vec<IceCandidate> {
        self.ready = true;
        std::mem::take(&mut self.pending)
    }

    /// Starts queueing again, e.g. while an ICE restart offer is outstanding.
    pub fn reset(&mut self) {
        self.ready = false;
        self.pending.clear();
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
