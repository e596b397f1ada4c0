use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Token usage reported by a vendor for one completed model invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_token_count: i32,
    pub candidates_token_count: i32,
    pub total_token_count: i32,
}

impl UsageMetadata {
    pub fn new(prompt_tokens: i32, completion_tokens: i32, total_tokens: i32) -> Self {
        Self {
            prompt_token_count: prompt_tokens,
            candidates_token_count: completion_tokens,
            total_token_count: total_tokens,
        }
    }
}

/// Shared slot for usage metadata, written by the draining task and read by the caller.
///
/// Reads before the vendor reported usage return `None`. A reliable read
/// requires the fragment stream to be fully drained first.
#[derive(Debug, Clone, Default)]
pub struct UsageHandle {
    inner: Arc<Mutex<Option<UsageMetadata>>>,
}

impl UsageHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current usage, if captured.
    pub fn get(&self) -> Option<UsageMetadata> {
        *self.lock()
    }

    pub(crate) fn set(&self, usage: UsageMetadata) {
        *self.lock() = Some(usage);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<UsageMetadata>> {
        // The slot holds plain data, so a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_handle_visibility_across_clones() {
        let handle = UsageHandle::new();
        let reader = handle.clone();
        assert_eq!(reader.get(), None);

        handle.set(UsageMetadata::new(12, 30, 42));
        let usage = reader.get().unwrap();
        assert_eq!(usage.total_token_count, usage.prompt_token_count + usage.candidates_token_count);
    }
}
