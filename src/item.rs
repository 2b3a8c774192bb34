use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::bbox::{BBox, Ltrb};
use crate::circular_queue::CircularQueue;
use crate::detection::RawDetection;
use crate::domain_pack::Attributes;
use crate::mapper::MappingResult;
use crate::rolling_avg::RollingAvg;
use crate::thumbnail::Thumbnail;

/// Aggregator-level identity. Allocated once per physical object and never reused.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Estimated resale price, supplied by an external pricing collaborator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PriceRange {
    pub low: f64,
    pub high: f64,
    pub currency: String,
}

/// Fine-grained category written back from a mapping result.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainAssignment {
    pub category_id: String,
    pub display_label: String,
    pub confidence: f32,
    pub attributes: Attributes,
}

/// Detector label as reported, plus the normalized form used for voting.
#[derive(Debug, Clone)]
struct SeenLabel {
    text: String,
    key: String,
}

#[derive(Debug, Clone)]
pub struct AggregatedItem {
    id: ItemId,
    tracking_id: i64,
    bbox: BBox<Ltrb>,
    confidence: RollingAvg,
    labels: CircularQueue<SeenLabel>,
    thumbnail: Option<Thumbnail>,
    thumbnail_quality: f32,
    merge_count: u32,
    first_seen_ms: u64,
    last_seen_ms: u64,
    domain: Option<DomainAssignment>,
    price_range: Option<PriceRange>,
}

impl AggregatedItem {
    pub(crate) fn new(id: ItemId, det: &RawDetection, now_ms: u64, label_history: usize) -> Self {
        let mut item = Self {
            id,
            tracking_id: det.tracking_id,
            bbox: det.bbox,
            confidence: RollingAvg::new(),
            labels: CircularQueue::with_capacity(label_history),
            thumbnail: None,
            thumbnail_quality: 0.0,
            merge_count: 1,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            domain: None,
            price_range: None,
        };

        item.observe(det);
        item
    }

    /// Folds one more frame into the item. The frame always counts, even when it
    /// carries nothing usable.
    pub(crate) fn absorb(&mut self, det: &RawDetection, now_ms: u64) {
        self.merge_count = self.merge_count.saturating_add(1);
        self.tracking_id = det.tracking_id;
        self.last_seen_ms = self.last_seen_ms.max(now_ms);

        if det.has_usable_geometry() {
            self.bbox = det.bbox;
        }

        self.observe(det);
    }

    /// Folds a second detection of a frame that was already counted. Geometry
    /// and crop are refreshed; counters and confidence samples are not.
    pub(crate) fn absorb_same_frame(&mut self, det: &RawDetection) {
        if det.has_usable_geometry() {
            self.bbox = det.bbox;
            self.observe_crop(det);
        }
    }

    fn observe(&mut self, det: &RawDetection) {
        if !det.has_usable_geometry() {
            return;
        }

        self.observe_crop(det);

        if let Some(top) = det.top_label() {
            if self.confidence.push(top.confidence) {
                let text = top.text.trim();
                self.labels.push(SeenLabel {
                    text: text.to_string(),
                    key: text.to_lowercase(),
                });
            }
        }
    }

    fn observe_crop(&mut self, det: &RawDetection) {
        if let Some(thumbnail) = &det.thumbnail {
            let quality = crop_quality(&det.bbox);
            if self.thumbnail.is_none() || quality >= self.thumbnail_quality {
                self.thumbnail = Some(thumbnail.clone());
                self.thumbnail_quality = quality;
            }
        }
    }

    pub(crate) fn rebind(&mut self, tracking_id: i64) {
        self.tracking_id = tracking_id;
    }

    /// Writes a resolved category back. Uncategorized results leave the item as is.
    pub fn apply_mapping(&mut self, result: &MappingResult) -> bool {
        let (Some(category_id), Some(display_label)) =
            (result.category_id.as_ref(), result.display_label.as_ref())
        else {
            return false;
        };

        self.domain = Some(DomainAssignment {
            category_id: category_id.clone(),
            display_label: display_label.clone(),
            confidence: result.score,
            attributes: result.attributes.clone(),
        });

        true
    }

    pub fn set_price_range(&mut self, price_range: PriceRange) {
        self.price_range = Some(price_range);
    }

    #[inline]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Detector tracking id of the most recent detection merged into this item.
    #[inline]
    pub fn tracking_id(&self) -> i64 {
        self.tracking_id
    }

    /// Domain category id once classified, otherwise the most frequent recent
    /// detector label, lowercased.
    pub fn category(&self) -> Option<&str> {
        if let Some(domain) = &self.domain {
            return Some(&domain.category_id);
        }

        self.voted_label()
    }

    /// Domain display label once classified, otherwise the latest detector label
    /// as the detector reported it.
    pub fn label_text(&self) -> Option<&str> {
        if let Some(domain) = &self.domain {
            return Some(&domain.display_label);
        }

        self.labels.front().map(|l| l.text.as_str())
    }

    #[inline]
    pub fn domain(&self) -> Option<&DomainAssignment> {
        self.domain.as_ref()
    }

    #[inline]
    pub fn bbox(&self) -> &BBox<Ltrb> {
        &self.bbox
    }

    #[inline]
    pub fn max_confidence(&self) -> f32 {
        self.confidence.max()
    }

    #[inline]
    pub fn average_confidence(&self) -> f32 {
        self.confidence.mean()
    }

    #[inline]
    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        self.thumbnail.as_ref()
    }

    #[inline]
    pub fn merge_count(&self) -> u32 {
        self.merge_count
    }

    #[inline]
    pub fn first_seen_ms(&self) -> u64 {
        self.first_seen_ms
    }

    #[inline]
    pub fn last_seen_ms(&self) -> u64 {
        self.last_seen_ms
    }

    #[inline]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.first_seen_ms)
    }

    #[inline]
    pub fn price_range(&self) -> Option<&PriceRange> {
        self.price_range.as_ref()
    }

    // ties go to the most recent label
    fn voted_label(&self) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;

        for label in self.labels.iter() {
            let votes = self.labels.iter().filter(|l| l.key == label.key).count();
            if best.map_or(true, |(_, v)| votes > v) {
                best = Some((label.key.as_str(), votes));
            }
        }

        best.map(|(label, _)| label)
    }
}

/// Bigger and more centered crops are better.
fn crop_quality(bbox: &BBox<Ltrb>) -> f32 {
    bbox.area() * bbox.centeredness()
}
