use crate::detection::RawDetection;

/// All detections the detector produced for one camera frame.
pub struct Frame {
    pub detections: Vec<RawDetection>,
}

impl Frame {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RawDetection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

impl From<Vec<RawDetection>> for Frame {
    fn from(detections: Vec<RawDetection>) -> Self {
        Self::new(detections)
    }
}
