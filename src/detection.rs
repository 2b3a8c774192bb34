use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::thumbnail::Thumbnail;

/// Label candidate reported by the detector or the remote classifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LabelCandidate {
    pub text: String,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl LabelCandidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Single per-frame observation of a tracked object.
#[derive(Debug, Clone)]
pub struct RawDetection {
    /// Detector-assigned id, stable while the detector keeps the lock on the object.
    pub tracking_id: i64,
    pub bbox: BBox<Ltrb>,
    pub labels: Vec<LabelCandidate>,
    pub thumbnail: Option<Thumbnail>,
}

impl RawDetection {
    /// Accepts the box in any format; it is stored as [`Ltrb`].
    pub fn new(
        tracking_id: i64,
        bbox: impl Into<BBox<Ltrb>>,
        labels: Vec<LabelCandidate>,
    ) -> Self {
        Self {
            tracking_id,
            bbox: bbox.into(),
            labels,
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<Thumbnail>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Highest-confidence label with a usable text and a finite confidence.
    pub fn top_label(&self) -> Option<&LabelCandidate> {
        self.labels
            .iter()
            .filter(|l| !l.text.trim().is_empty() && l.confidence.is_finite())
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    #[inline]
    pub fn has_usable_geometry(&self) -> bool {
        !self.bbox.is_degenerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_label_skips_blank_and_nan() {
        let det = RawDetection::new(
            1,
            BBox::ltrb(0.1, 0.1, 0.2, 0.2),
            vec![
                LabelCandidate::new("   ", 0.99),
                LabelCandidate::new("cup", f32::NAN),
                LabelCandidate::new("mug", 0.4),
                LabelCandidate::new("bottle", 0.7),
            ],
        );

        assert_eq!(det.top_label().map(|l| l.text.as_str()), Some("bottle"));
    }

    #[test]
    fn detector_box_formats_are_normalized() {
        let center = RawDetection::new(1, BBox::xywh(0.5, 0.4, 0.2, 0.2), vec![]);
        let corner = RawDetection::new(1, BBox::ltwh(0.4, 0.3, 0.2, 0.2), vec![]);

        for det in [&center, &corner] {
            let expected = [0.4, 0.3, 0.6, 0.5];
            for (a, b) in det.bbox.as_slice().iter().zip(expected) {
                assert!((a - b).abs() < 1e-6, "{:?}", det.bbox);
            }
            assert!(det.has_usable_geometry());
        }
    }

    #[test]
    fn empty_labels_have_no_top() {
        let det = RawDetection::new(1, BBox::ltrb(0.1, 0.1, 0.2, 0.2), vec![]);
        assert!(det.top_label().is_none());
    }
}
