use tracing::debug;

/// Ordered queue of connectivity candidates waiting for a flush point.
///
/// Local candidates wait here until the local description is set and the
/// peer is known; remote candidates wait until the remote description is set.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    candidates: Vec<String>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, candidate: String) {
        self.candidates.push(candidate);
        debug!(count = self.candidates.len(), "queued ICE candidate");
    }

    /// Hand out everything queued, in arrival order, and leave the buffer empty.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.candidates)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
