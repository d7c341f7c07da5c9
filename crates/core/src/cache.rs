use std::sync::{Arc, Mutex};

/// Seam toward the read layer's cache. The workflow engine's only
/// contract is "invalidate tag X after a successful write"; failures on
/// the other side must never reach workflow callers, so the call is
/// infallible here.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, tag: &str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCacheInvalidator;

impl CacheInvalidator for NoopCacheInvalidator {
    fn invalidate(&self, _tag: &str) {}
}

#[derive(Clone, Default)]
pub struct RecordingCacheInvalidator {
    tags: Arc<Mutex<Vec<String>>>,
}

impl RecordingCacheInvalidator {
    pub fn tags(&self) -> Vec<String> {
        match self.tags.lock() {
            Ok(tags) => tags.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CacheInvalidator for RecordingCacheInvalidator {
    fn invalidate(&self, tag: &str) {
        match self.tags.lock() {
            Ok(mut tags) => tags.push(tag.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(tag.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheInvalidator, RecordingCacheInvalidator};

    #[test]
    fn recording_invalidator_keeps_tag_order() {
        let invalidator = RecordingCacheInvalidator::default();
        invalidator.invalidate("overtime-orders");
        invalidator.invalidate("deviations");

        assert_eq!(invalidator.tags(), vec!["overtime-orders", "deviations"]);
    }
}
