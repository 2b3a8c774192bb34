/// Running max/mean over the confidences folded into an item.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingAvg {
    max: f32,
    mean: f32,
    samples: u32,
}

impl RollingAvg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_first(value: f32) -> Self {
        let mut avg = Self::new();
        avg.push(value);
        avg
    }

    /// Folds one sample in. Non-finite values are ignored.
    pub fn push(&mut self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }

        let value = value.clamp(0.0, 1.0);
        self.samples += 1;
        self.mean += (value - self.mean) / self.samples as f32;
        self.max = if self.samples == 1 {
            value
        } else {
            self.max.max(value)
        };

        true
    }

    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }

    #[inline]
    pub fn mean(&self) -> f32 {
        self.mean
    }

    #[inline]
    pub fn samples(&self) -> u32 {
        self.samples
    }
}
