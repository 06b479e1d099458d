//! Per-prim dirty bits and the batch version
//!
//! The tracker owns the dirty bits of every prim between syncs. Scene edits
//! OR bits in with [`ChangeTracker::mark_rprim_dirty`]; after a prim syncs,
//! [`ChangeTracker::mark_rprim_clean`] stores whatever it left behind.

use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{new_key_type, SecondaryMap};

use crate::sync::dirty::DirtyBits;

new_key_type! {
    /// Handle of a prim in the render index
    pub struct PrimKey;
}

/// Dirty state of all prims
#[derive(Debug, Default)]
pub struct ChangeTracker {
    rprims: SecondaryMap<PrimKey, DirtyBits>,
    batch_version: AtomicU64,
}

impl ChangeTracker {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `key` with `initial` bits
    pub fn add_rprim(&mut self, key: PrimKey, initial: DirtyBits) {
        self.rprims.insert(key, initial);
    }

    /// Stop tracking `key`
    pub fn remove_rprim(&mut self, key: PrimKey) {
        self.rprims.remove(key);
    }

    /// Current bits of `key`, empty when untracked
    pub fn rprim_dirty_bits(&self, key: PrimKey) -> DirtyBits {
        self.rprims.get(key).copied().unwrap_or_default()
    }

    /// Keys with scene edits to sync
    ///
    /// Custom bits left behind by a sync stay pending on the prim but do not
    /// schedule it on their own.
    pub fn dirty_rprims(&self) -> Vec<PrimKey> {
        self.rprims
            .iter()
            .filter(|(_, bits)| bits.intersects(DirtyBits::ALL_SCENE_DIRTY_BITS))
            .map(|(key, _)| key)
            .collect()
    }

    /// OR `bits` into `key`
    ///
    /// A prim dirtied again after a clean sync is flagged [`DirtyBits::VARYING`]
    /// so it can prefer mutable allocations.
    pub fn mark_rprim_dirty(&mut self, key: PrimKey, bits: DirtyBits) {
        let Some(current) = self.rprims.get_mut(key) else {
            log::warn!("mark_rprim_dirty on untracked prim {:?}", key);
            return;
        };
        if current.contains(bits) {
            return;
        }
        if !current.is_dirty() {
            *current |= DirtyBits::VARYING;
        }
        *current |= bits;
    }

    /// Store the bits left after a sync, keeping the variability marker
    pub fn mark_rprim_clean(&mut self, key: PrimKey, remaining: DirtyBits) {
        if let Some(current) = self.rprims.get_mut(key) {
            *current = (*current & DirtyBits::VARYING) | (remaining - DirtyBits::VARYING);
        }
    }

    /// Take the bits of `key` for syncing, leaving the variability marker
    pub fn take_rprim_dirty_bits(&mut self, key: PrimKey) -> DirtyBits {
        self.rprims.get_mut(key).map_or_else(DirtyBits::empty, |current| {
            let bits = *current;
            *current &= DirtyBits::VARYING;
            bits
        })
    }

    /// Clear the variability marker on every prim
    pub fn reset_varying_state(&mut self) {
        for (_, bits) in &mut self.rprims {
            bits.remove(DirtyBits::VARYING);
        }
    }

    /// Invalidate draw batches built against old ranges or shaders
    pub fn mark_batches_dirty(&self) {
        self.batch_version.fetch_add(1, Ordering::AcqRel);
    }

    /// Bumped whenever batches must be rebuilt
    pub fn batch_version(&self) -> u64 {
        self.batch_version.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn tracked() -> (ChangeTracker, PrimKey) {
        let mut keys: SlotMap<PrimKey, ()> = SlotMap::with_key();
        let key = keys.insert(());
        let mut tracker = ChangeTracker::new();
        tracker.add_rprim(key, DirtyBits::empty());
        (tracker, key)
    }

    #[test]
    fn test_redirtying_marks_varying() {
        let (mut tracker, key) = tracked();
        tracker.mark_rprim_dirty(key, DirtyBits::DIRTY_POINTS);
        assert!(tracker.rprim_dirty_bits(key).contains(DirtyBits::VARYING | DirtyBits::DIRTY_POINTS));
        assert_eq!(tracker.dirty_rprims(), vec![key]);
    }

    #[test]
    fn test_clean_keeps_varying() {
        let (mut tracker, key) = tracked();
        tracker.mark_rprim_dirty(key, DirtyBits::DIRTY_TOPOLOGY);
        let taken = tracker.take_rprim_dirty_bits(key);
        assert!(taken.contains(DirtyBits::DIRTY_TOPOLOGY));
        tracker.mark_rprim_clean(key, DirtyBits::empty());
        assert_eq!(tracker.rprim_dirty_bits(key), DirtyBits::VARYING);
        assert!(tracker.dirty_rprims().is_empty());

        tracker.reset_varying_state();
        assert!(tracker.rprim_dirty_bits(key).is_empty());
    }

    #[test]
    fn test_leftover_custom_bits_stay_pending() {
        let (mut tracker, key) = tracked();
        tracker.mark_rprim_dirty(key, DirtyBits::DIRTY_POINTS);
        tracker.take_rprim_dirty_bits(key);
        tracker.mark_rprim_clean(key, DirtyBits::DIRTY_FLAT_NORMALS);
        assert!(tracker.dirty_rprims().is_empty());

        tracker.mark_rprim_dirty(key, DirtyBits::DIRTY_DISPLAY_STYLE);
        let taken = tracker.take_rprim_dirty_bits(key);
        assert!(taken.contains(DirtyBits::DIRTY_FLAT_NORMALS | DirtyBits::DIRTY_DISPLAY_STYLE));
    }

    #[test]
    fn test_batch_version_increments() {
        let tracker = ChangeTracker::new();
        tracker.mark_batches_dirty();
        tracker.mark_batches_dirty();
        assert_eq!(tracker.batch_version(), 2);
    }
}
