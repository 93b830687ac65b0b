use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::VecDeque;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::atomic::{AtomicU64, AtomicUsize};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::storage::page::FrameId;

/// Sentinel standing in for -inf: frames with fewer than k recorded
/// accesses order before any frame with a full history. Real timestamps
/// start at 1.
const TIMESTAMP_NEG_INF: u64 = 0;

/// Kind of operation that touched a frame. The current policy treats all
/// access types alike; the parameter exists for workload-aware tuning.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AccessType {
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Replacer tracks frame usage and picks eviction victims when the
/// buffer pool is full.
pub trait Replacer: Send + Sync {
    /// Record the event that the given frame id is accessed at the
    /// current timestamp, creating the access history entry if the frame
    /// has not been seen before. New entries start out non-evictable.
    ///
    /// Returns an invalid-argument error if the frame id is out of
    /// range.
    fn record_access(&self, frame_id: FrameId, access_type: AccessType) -> Result<()>;

    /// Find the frame with the largest backward k-distance and evict it.
    /// Only frames marked evictable are candidates.
    ///
    /// A frame with fewer than k recorded accesses has +inf backward
    /// k-distance; ties among those are broken by the earliest first
    /// access (classical LRU).
    ///
    /// Successful eviction removes the frame's access history and
    /// decrements the replacer size. Returns None if no frame can be
    /// evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. This also
    /// controls the replacer size, which equals the number of evictable
    /// entries; toggling to the current state changes nothing.
    ///
    /// Returns an invalid-argument error if the frame id is out of range
    /// or the frame has no access history.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()>;

    /// Remove the given evictable frame along with its access history,
    /// regardless of its backward k-distance, and decrement the replacer
    /// size.
    ///
    /// An unknown frame is ignored; removing a non-evictable frame is an
    /// invalid-argument error.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Number of evictable frames.
    fn size(&self) -> usize;
}

struct LRUKNode {
    /// History of the last k access timestamps, least recent in front.
    history: VecDeque<u64>,
    /// Timestamp of the access that created this entry. Heap snapshots
    /// predating it belong to an earlier occupant of the frame.
    timestamp_added: u64,
    is_evictable: bool,
    present_in_pq: bool,
}

impl LRUKNode {
    fn new(timestamp: u64) -> LRUKNode {
        let mut history = VecDeque::new();
        history.push_back(timestamp);
        LRUKNode { history, timestamp_added: timestamp, is_evictable: false, present_in_pq: false }
    }

    fn oldest(&self) -> u64 {
        // the history always holds at least the creating access
        *self.history.front().unwrap()
    }
}

/// Snapshot of a node's standing at the time it was pushed. The heap is
/// not updated in place when new accesses arrive; `evict` validates each
/// popped snapshot against the live node and re-pushes a fresh one when
/// it turned stale.
#[derive(Debug, Eq, PartialEq)]
struct PQNode {
    frame_id: FrameId,
    /// Timestamp of the k-th most recent access, or TIMESTAMP_NEG_INF if
    /// the frame had fewer than k recorded accesses.
    kth_last_timestamp: u64,
    earliest_timestamp: u64,
}

impl PQNode {
    fn snapshot(frame_id: FrameId, k: usize, node: &LRUKNode) -> PQNode {
        let kth_last_timestamp =
            if node.history.len() == k { node.oldest() } else { TIMESTAMP_NEG_INF };
        PQNode { frame_id, kth_last_timestamp, earliest_timestamp: node.oldest() }
    }
}

impl PartialOrd for PQNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PQNode {
    /// BinaryHeap surfaces its greatest element; reversing the tuple
    /// comparison puts the smallest (kth_last_timestamp,
    /// earliest_timestamp) pair on top, i.e. the best eviction
    /// candidate.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.kth_last_timestamp, other.earliest_timestamp)
            .cmp(&(self.kth_last_timestamp, self.earliest_timestamp))
    }
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The LRU-k algorithm evicts a frame whose backward k-distance is
/// maximum of all frames. Backward k-distance is computed as the
/// difference in time between the current timestamp and the timestamp of
/// the k-th previous access.
///
/// A frame with less than k history references is given +inf as its
/// backward k-distance. When multiple frames have +inf backward
/// k-distance, classical LRU picks the victim.
///
/// Candidates live in a max-at-top binary heap of snapshots. Accesses do
/// not touch the heap; a snapshot that no longer matches its node is
/// reconciled when `evict` pops it. This bounds every operation to
/// amortized O(log n) and lets `record_access` hold nothing but the
/// frame's own lock. Wherever the heap lock and a frame lock are both
/// held, the heap lock is acquired first.
pub struct LRUKReplacer {
    replacer_size: usize,
    k: usize,
    nodes: Vec<Mutex<Option<LRUKNode>>>,
    pq: Mutex<BinaryHeap<PQNode>>,
    num_evictable: AtomicUsize,
    /// Logical clock handing out access timestamps, starting at 1 so
    /// TIMESTAMP_NEG_INF never collides with a real access.
    clock: AtomicU64,
}

impl LRUKReplacer {
    pub fn new(num_frames: usize, k: usize) -> LRUKReplacer {
        assert!(k > 0, "replacer k should be larger than zero");
        let mut nodes = Vec::new();
        nodes.resize_with(num_frames, || Mutex::new(None));
        LRUKReplacer {
            replacer_size: num_frames,
            k,
            nodes,
            pq: Mutex::new(BinaryHeap::new()),
            num_evictable: AtomicUsize::new(0),
            clock: AtomicU64::new(1),
        }
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if frame_id >= self.replacer_size {
            return Err(Error::invalid_argument(format!(
                "frame id {} out of range for replacer of {} frames",
                frame_id, self.replacer_size
            )));
        }
        Ok(())
    }
}

impl Replacer for LRUKReplacer {
    fn record_access(&self, frame_id: FrameId, _access_type: AccessType) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut slot = self.nodes[frame_id].lock();
        // draw the timestamp under the frame lock so one frame's history
        // is strictly increasing
        let timestamp = self.clock.fetch_add(1, AtomicOrdering::SeqCst);
        match slot.take() {
            None => *slot = Some(LRUKNode::new(timestamp)),
            Some(mut node) => {
                if node.history.len() == self.k {
                    node.history.pop_front();
                }
                node.history.push_back(timestamp);
                *slot = Some(node);
            }
        }
        Ok(())
    }

    fn evict(&self) -> Option<FrameId> {
        let mut pq = self.pq.lock();
        while let Some(top) = pq.pop() {
            let mut slot = self.nodes[top.frame_id].lock();
            let node = match slot.as_mut() {
                Some(node) => node,
                // the frame was evicted or removed after the snapshot
                None => continue,
            };
            if top.earliest_timestamp < node.timestamp_added {
                // snapshot of an earlier occupant of this frame
                continue;
            }
            let stale = if node.history.len() == self.k {
                top.kth_last_timestamp != node.oldest()
            } else {
                top.kth_last_timestamp != TIMESTAMP_NEG_INF
                    || top.earliest_timestamp != node.oldest()
            };
            if stale {
                // a newer access moved the node; put a fresh snapshot
                // back and keep looking
                pq.push(PQNode::snapshot(top.frame_id, self.k, node));
                continue;
            }
            if !node.is_evictable {
                node.present_in_pq = false;
                continue;
            }
            *slot = None;
            self.num_evictable.fetch_sub(1, AtomicOrdering::SeqCst);
            return Some(top.frame_id);
        }
        None
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut pq = self.pq.lock();
        let mut slot = self.nodes[frame_id].lock();
        let node = match slot.as_mut() {
            Some(node) => node,
            None => {
                return Err(Error::invalid_argument(format!(
                    "frame {} has no access history",
                    frame_id
                )))
            }
        };
        if node.is_evictable == evictable {
            return Ok(());
        }
        node.is_evictable = evictable;
        if evictable {
            if !node.present_in_pq {
                pq.push(PQNode::snapshot(frame_id, self.k, node));
                node.present_in_pq = true;
            }
            self.num_evictable.fetch_add(1, AtomicOrdering::SeqCst);
        } else {
            self.num_evictable.fetch_sub(1, AtomicOrdering::SeqCst);
        }
        Ok(())
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;
        let mut slot = self.nodes[frame_id].lock();
        let node = match slot.as_ref() {
            Some(node) => node,
            // unknown frames are ignored
            None => return Ok(()),
        };
        if !node.is_evictable {
            return Err(Error::invalid_argument(format!(
                "cannot remove non-evictable frame {}",
                frame_id
            )));
        }
        *slot = None;
        self.num_evictable.fetch_sub(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn size(&self) -> usize {
        self.num_evictable.load(AtomicOrdering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pqnode_heap_order() {
        let mut pq = BinaryHeap::new();
        pq.push(PQNode { frame_id: 1, kth_last_timestamp: 5, earliest_timestamp: 10 });
        pq.push(PQNode { frame_id: 2, kth_last_timestamp: 5, earliest_timestamp: 3 });
        pq.push(PQNode { frame_id: 3, kth_last_timestamp: 8, earliest_timestamp: 1 });
        pq.push(PQNode { frame_id: 4, kth_last_timestamp: TIMESTAMP_NEG_INF, earliest_timestamp: 5 });
        pq.push(PQNode { frame_id: 5, kth_last_timestamp: TIMESTAMP_NEG_INF, earliest_timestamp: 3 });

        // short-history frames pop first, oldest first access breaking
        // ties, then full-history frames by k-th-last timestamp
        let mut ids = Vec::new();
        while let Some(top) = pq.pop() {
            ids.push(top.frame_id);
        }
        assert_eq!(vec![5, 4, 2, 1, 3], ids);
    }

    #[test]
    fn test_lruk_replacer() -> Result<()> {
        let replacer = LRUKReplacer::new(7, 2);

        // Scenario: add six frames to the replacer. We have [1,2,3,4,5].
        // Frame 6 is left non-evictable.
        for frame_id in 1..=6 {
            replacer.record_access(frame_id, AccessType::Unknown)?;
        }
        for frame_id in 1..=5 {
            replacer.set_evictable(frame_id, true)?;
        }
        replacer.set_evictable(6, false)?;
        assert_eq!(5, replacer.size());

        // Scenario: insert access history for frame 1. Now frame 1 has
        // two accesses; all other frames have +inf backward k-distance.
        // The order of eviction is [2,3,4,5,1].
        replacer.record_access(1, AccessType::Unknown)?;

        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(3), replacer.evict());
        assert_eq!(Some(4), replacer.evict());
        assert_eq!(2, replacer.size());

        // Scenario: now the replacer has frames [5,1]. Insert new frames
        // 3 and 4 and update the access history for 5. The eviction
        // order becomes [3,1,5,4].
        replacer.record_access(3, AccessType::Unknown)?;
        replacer.record_access(4, AccessType::Unknown)?;
        replacer.record_access(5, AccessType::Unknown)?;
        replacer.record_access(4, AccessType::Unknown)?;
        replacer.set_evictable(3, true)?;
        replacer.set_evictable(4, true)?;
        assert_eq!(4, replacer.size());

        assert_eq!(Some(3), replacer.evict());
        assert_eq!(3, replacer.size());

        // Set 6 evictable; 6 has the oldest single-access history and
        // should go next.
        replacer.set_evictable(6, true)?;
        assert_eq!(4, replacer.size());
        assert_eq!(Some(6), replacer.evict());
        assert_eq!(3, replacer.size());

        // Now we have [1,5,4]. Pinning 1 leaves [5,4].
        replacer.set_evictable(1, false)?;
        assert_eq!(2, replacer.size());
        assert_eq!(Some(5), replacer.evict());
        assert_eq!(1, replacer.size());

        // Update access history for 1 and unpin it. Now we have [4,1].
        replacer.record_access(1, AccessType::Unknown)?;
        replacer.record_access(1, AccessType::Unknown)?;
        replacer.set_evictable(1, true)?;
        assert_eq!(2, replacer.size());
        assert_eq!(Some(4), replacer.evict());

        assert_eq!(1, replacer.size());
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(0, replacer.size());

        // These operations should not modify the size.
        assert_eq!(None, replacer.evict());
        assert_eq!(0, replacer.size());
        replacer.remove(1)?;
        assert_eq!(0, replacer.size());

        Ok(())
    }

    #[test]
    fn test_short_history_preferred_over_full() -> Result<()> {
        // Accesses A, B, C, A, B, C with k=2: every frame ends up with a
        // full history and A has the earliest k-th-last timestamp.
        let replacer = LRUKReplacer::new(3, 2);
        for frame_id in [0, 1, 2, 0, 1, 2] {
            replacer.record_access(frame_id, AccessType::Unknown)?;
        }
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true)?;
        }
        assert_eq!(Some(0), replacer.evict());

        // With k=3 nobody reached a full history; the earliest first
        // access wins.
        let replacer = LRUKReplacer::new(3, 3);
        for frame_id in [0, 1, 2, 0, 1, 2] {
            replacer.record_access(frame_id, AccessType::Unknown)?;
        }
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true)?;
        }
        assert_eq!(Some(0), replacer.evict());
        assert_eq!(Some(1), replacer.evict());

        Ok(())
    }

    #[test]
    fn test_full_history_loses_to_short() -> Result<()> {
        // Frames 1..3 accessed once each, then frame 1 again: frame 1 now
        // has a full k=2 history while 2 and 3 keep +inf distance.
        let replacer = LRUKReplacer::new(4, 2);
        replacer.record_access(1, AccessType::Unknown)?;
        replacer.record_access(2, AccessType::Unknown)?;
        replacer.record_access(3, AccessType::Unknown)?;
        replacer.set_evictable(1, true)?;
        replacer.set_evictable(2, true)?;
        replacer.set_evictable(3, true)?;
        replacer.record_access(1, AccessType::Unknown)?;

        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(3), replacer.evict());
        assert_eq!(Some(1), replacer.evict());

        Ok(())
    }

    #[test]
    fn test_evict_oldest_first_access() -> Result<()> {
        // Three frames with single accesses: the one touched first goes
        // first.
        let replacer = LRUKReplacer::new(3, 2);
        replacer.record_access(1, AccessType::Unknown)?;
        replacer.record_access(2, AccessType::Unknown)?;
        replacer.record_access(0, AccessType::Unknown)?;
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true)?;
        }
        assert_eq!(3, replacer.size());
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(0), replacer.evict());

        Ok(())
    }

    #[test]
    fn test_access_types_rank_alike() -> Result<()> {
        // the policy orders by recency only, whatever kind of operation
        // touched the frame
        let replacer = LRUKReplacer::new(3, 2);
        replacer.record_access(0, AccessType::Lookup)?;
        replacer.record_access(1, AccessType::Scan)?;
        replacer.record_access(2, AccessType::Index)?;
        replacer.record_access(0, AccessType::Scan)?;
        for frame_id in 0..3 {
            replacer.set_evictable(frame_id, true)?;
        }
        // frame 0 has a full history; 1 and 2 go first by first access
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(0), replacer.evict());
        Ok(())
    }

    #[test]
    fn test_invalid_frame_id() {
        let replacer = LRUKReplacer::new(2, 2);
        assert!(replacer.record_access(2, AccessType::Unknown).is_err());
        assert!(replacer.set_evictable(2, true).is_err());
        assert!(replacer.remove(2).is_err());
    }

    #[test]
    fn test_set_evictable_without_history() {
        let replacer = LRUKReplacer::new(2, 2);
        assert!(replacer.set_evictable(0, true).is_err());
    }

    #[test]
    fn test_remove() -> Result<()> {
        let replacer = LRUKReplacer::new(3, 2);
        replacer.record_access(0, AccessType::Unknown)?;
        replacer.record_access(1, AccessType::Unknown)?;

        // frame 0 is still pinned
        assert!(replacer.remove(0).is_err());

        replacer.set_evictable(0, true)?;
        replacer.set_evictable(1, true)?;
        assert_eq!(2, replacer.size());

        replacer.remove(0)?;
        assert_eq!(1, replacer.size());
        // its history is gone with it, frame 1 is the only candidate
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(None, replacer.evict());

        // removing an unknown frame is fine
        replacer.remove(0)?;
        assert_eq!(0, replacer.size());

        Ok(())
    }

    #[test]
    fn test_frame_reuse_after_eviction() -> Result<()> {
        // A frame re-created after eviction must not be matched by the
        // stale heap snapshots of its former life.
        let replacer = LRUKReplacer::new(2, 2);
        replacer.record_access(0, AccessType::Unknown)?;
        replacer.record_access(1, AccessType::Unknown)?;
        replacer.set_evictable(0, true)?;
        replacer.set_evictable(1, true)?;
        assert_eq!(Some(0), replacer.evict());

        replacer.record_access(0, AccessType::Unknown)?;
        replacer.set_evictable(0, true)?;
        // frame 1 still has the older first access
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(0), replacer.evict());
        assert_eq!(None, replacer.evict());

        Ok(())
    }
}
