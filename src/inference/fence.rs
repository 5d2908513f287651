use crate::extract::FENCE;

/// Removes ``` from a chunked text stream.
///
/// A fence may arrive split across chunks, so up to two trailing backticks are
/// held back until the next chunk decides whether they complete a fence. The
/// concatenated output always equals `concat(chunks).replace("```", "")`.
#[derive(Debug, Default)]
pub struct FenceStripper {
    pending: String,
}

impl FenceStripper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Option<String> {
        if chunk.is_empty() {
            return None;
        }

        self.pending.push_str(chunk);
        let buffered = std::mem::take(&mut self.pending);
        let stripped = buffered.replace(FENCE, "");

        // A run of n backticks loses floor(n/3)*3 of them from the front; the
        // n%3 leftovers at the very end might still pair with what comes next.
        let tail_run = buffered.len() - buffered.trim_end_matches('`').len();
        let held = tail_run % 3;
        let ready_len = stripped.len() - held;
        self.pending.push_str(&stripped[ready_len..]);

        let ready = &stripped[..ready_len];
        if ready.is_empty() {
            None
        } else {
            Some(ready.to_string())
        }
    }

    /// Releases held-back backticks once the stream has ended.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
