use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ConvertError;
use crate::scene::SkeletonId;

/// Advisory per-skeleton locks shared by every converter in the process.
///
/// A second conversion on the same skeleton fails fast instead of waiting.
#[derive(Debug, Clone, Default)]
pub struct SkeletonLocks {
    held: Arc<Mutex<HashSet<SkeletonId>>>,
}

impl SkeletonLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// [`ConvertError::SkeletonBusy`] when another guard for `skeleton` is alive.
    pub fn try_acquire(
        &self,
        skeleton: SkeletonId,
        skeleton_name: &str,
    ) -> Result<SkeletonGuard, ConvertError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(skeleton) {
            return Err(ConvertError::SkeletonBusy {
                skeleton: skeleton_name.to_string(),
            });
        }
        Ok(SkeletonGuard {
            held: Arc::clone(&self.held),
            skeleton,
        })
    }

    pub fn is_locked(&self, skeleton: SkeletonId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&skeleton)
    }
}

/// Releases the skeleton when dropped.
#[derive(Debug)]
pub struct SkeletonGuard {
    held: Arc<Mutex<HashSet<SkeletonId>>>,
    skeleton: SkeletonId,
}

impl Drop for SkeletonGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.skeleton);
    }
}
