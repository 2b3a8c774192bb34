//! Folds per-frame detections into durable [`AggregatedItem`]s.
//!
//! The detector's tracking id is the primary key. When the detector loses an
//! object and hands it back under a fresh tracking id, the new detection is
//! re-associated with the item it overlaps (IoU at or above the configured
//! threshold) as long as that item was seen within the re-association window
//! and has not already absorbed a detection of the current frame.
//!
//! A tracking id whose item went stale (outside the window) and whose new box
//! does not overlap the old one is treated as recycled by the detector and no
//! longer maps to that item.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::AggregatorConfig;
use crate::detection::RawDetection;
use crate::frame::Frame;
use crate::item::{AggregatedItem, ItemId};

pub struct ItemAggregator {
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
    items: BTreeMap<ItemId, AggregatedItem>,
    by_tracking_id: HashMap<i64, ItemId>,
    next_id: u64,
}

impl ItemAggregator {
    pub fn new(config: AggregatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            items: BTreeMap::new(),
            by_tracking_id: HashMap::new(),
            next_id: 1,
        }
    }

    /// Merges a single detection.
    ///
    /// Items already updated at the current clock instant are considered part of
    /// the same frame: they are never targets of re-association, and another
    /// detection with their tracking id does not bump `merge_count` again. A
    /// tracking id switch reported at the same instant as the previous sighting
    /// therefore creates a new item. Callers feeding single detections must
    /// advance the clock between frames, or use [`ItemAggregator::merge_frame`].
    pub fn merge(&mut self, det: &RawDetection) -> &AggregatedItem {
        let now = self.clock.now_ms();
        let claimed: HashSet<ItemId> = self
            .items
            .values()
            .filter(|item| item.last_seen_ms() == now)
            .map(AggregatedItem::id)
            .collect();

        let id = self.merge_at(det, now, &claimed);
        &self.items[&id]
    }

    /// Merges every detection of a frame and returns the touched item ids, in
    /// processing order and without duplicates.
    ///
    /// Detections with a known tracking id are merged first so that a fresh
    /// tracking id can never take over an item still tracked in this frame. A
    /// tracking id repeated within the frame counts as one frame seen.
    pub fn merge_frame(&mut self, frame: &Frame) -> Vec<ItemId> {
        let now = self.clock.now_ms();
        let (known, fresh): (Vec<&RawDetection>, Vec<&RawDetection>) = frame
            .iter()
            .partition(|det| self.by_tracking_id.contains_key(&det.tracking_id));

        let mut claimed = HashSet::with_capacity(frame.len());
        let mut touched = Vec::with_capacity(frame.len());

        for det in known.into_iter().chain(fresh) {
            let id = self.merge_at(det, now, &claimed);
            if claimed.insert(id) {
                touched.push(id);
            }
        }

        touched
    }

    fn merge_at(&mut self, det: &RawDetection, now: u64, claimed: &HashSet<ItemId>) -> ItemId {
        if let Some(id) = self.lookup_tracking_id(det, now) {
            if let Some(item) = self.items.get_mut(&id) {
                if claimed.contains(&id) {
                    item.absorb_same_frame(det);
                    tracing::debug!(
                        item = %id,
                        tracking_id = det.tracking_id,
                        "Tracking id repeated within one frame"
                    );
                    return id;
                }

                item.absorb(det, now);
                tracing::trace!(
                    item = %id,
                    tracking_id = det.tracking_id,
                    merges = item.merge_count(),
                    "Merged detection"
                );
                return id;
            }
        }

        if let Some(id) = self.find_reassociation(det, now, claimed) {
            if let Some(item) = self.items.get_mut(&id) {
                let previous = item.tracking_id();
                self.by_tracking_id.remove(&previous);
                self.by_tracking_id.insert(det.tracking_id, id);

                item.rebind(det.tracking_id);
                item.absorb(det, now);

                tracing::debug!(
                    item = %id,
                    from = previous,
                    to = det.tracking_id,
                    "Re-associated new tracking id with existing item"
                );
                return id;
            }
        }

        self.create(det, now)
    }

    fn lookup_tracking_id(&mut self, det: &RawDetection, now: u64) -> Option<ItemId> {
        let id = *self.by_tracking_id.get(&det.tracking_id)?;
        let item = self.items.get(&id)?;

        let stale = now.saturating_sub(item.last_seen_ms()) > self.config.reassociation_window_ms;
        let moved = det.has_usable_geometry()
            && !item.bbox().is_degenerate()
            && item.bbox().iou(&det.bbox) < self.config.iou_threshold;

        if stale && moved {
            tracing::debug!(
                item = %id,
                tracking_id = det.tracking_id,
                "Tracking id recycled by detector, unbinding"
            );
            self.by_tracking_id.remove(&det.tracking_id);
            return None;
        }

        Some(id)
    }

    fn find_reassociation(
        &self,
        det: &RawDetection,
        now: u64,
        claimed: &HashSet<ItemId>,
    ) -> Option<ItemId> {
        if !det.has_usable_geometry() {
            return None;
        }

        self.items
            .values()
            .filter(|item| !claimed.contains(&item.id()))
            .filter(|item| item.tracking_id() != det.tracking_id)
            .filter(|item| {
                now.saturating_sub(item.last_seen_ms()) <= self.config.reassociation_window_ms
            })
            .map(|item| (item, item.bbox().iou(&det.bbox)))
            .filter(|(_, iou)| *iou >= self.config.iou_threshold)
            .max_by(|(a, a_iou), (b, b_iou)| {
                a_iou
                    .total_cmp(b_iou)
                    .then(a.last_seen_ms().cmp(&b.last_seen_ms()))
            })
            .map(|(item, _)| item.id())
    }

    fn create(&mut self, det: &RawDetection, now: u64) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;

        let item = AggregatedItem::new(id, det, now, self.config.label_history);
        self.items.insert(id, item);
        self.by_tracking_id.insert(det.tracking_id, id);

        tracing::debug!(item = %id, tracking_id = det.tracking_id, "Created item");

        id
    }

    /// Evicts an item. Its id is never handed out again.
    pub fn remove(&mut self, id: ItemId) -> Option<AggregatedItem> {
        let item = self.items.remove(&id)?;
        self.by_tracking_id.retain(|_, bound| *bound != id);

        tracing::debug!(item = %id, merges = item.merge_count(), "Removed item");

        Some(item)
    }

    #[inline]
    pub fn get(&self, id: ItemId) -> Option<&AggregatedItem> {
        self.items.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut AggregatedItem> {
        self.items.get_mut(&id)
    }

    pub fn item_for_tracking_id(&self, tracking_id: i64) -> Option<&AggregatedItem> {
        self.by_tracking_id
            .get(&tracking_id)
            .and_then(|id| self.items.get(id))
    }

    /// Items in creation order.
    #[inline]
    pub fn items(&self) -> impl Iterator<Item = &AggregatedItem> {
        self.items.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
