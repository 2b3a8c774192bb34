//! Admission control for remote classification calls.
//!
//! The gate never issues a call itself. Callers ask [`ClassificationGate::can_classify`]
//! and, once they have dispatched the request, report it through
//! [`ClassificationGate::on_classification_triggered`] so the cooldown starts at
//! dispatch time rather than at completion.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::GateConfig;
use crate::item::{AggregatedItem, ItemId};
use crate::thumbnail::Thumbnail;

/// Capability check for remote classification (user opt-in, connectivity, ...).
pub type CloudPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    CloudDisabled,
    /// Neither enough frames nor enough age yet.
    Unstable { merge_count: u32, age_ms: u64 },
    CoolingDown { remaining_ms: u64 },
    /// Thumbnail is byte-identical to the one last submitted.
    DuplicateContent,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::CloudDisabled => write!(f, "cloud classification disabled"),
            Denial::Unstable {
                merge_count,
                age_ms,
            } => write!(f, "unstable ({} frames, {} ms old)", merge_count, age_ms),
            Denial::CoolingDown { remaining_ms } => {
                write!(f, "cooling down ({} ms left)", remaining_ms)
            }
            Denial::DuplicateContent => write!(f, "thumbnail unchanged since last submission"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Approved,
    Denied(Denial),
}

impl Admission {
    #[inline]
    pub fn is_approved(&self) -> bool {
        matches!(self, Admission::Approved)
    }
}

#[derive(Debug, Clone)]
struct ClassificationAttempt {
    last_triggered_ms: u64,
    thumbnail: Option<Thumbnail>,
}

pub struct ClassificationGate {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    cloud_enabled: CloudPredicate,
    attempts: HashMap<ItemId, ClassificationAttempt>,
}

impl ClassificationGate {
    pub fn new(config: GateConfig, clock: Arc<dyn Clock>, cloud_enabled: CloudPredicate) -> Self {
        Self {
            config,
            clock,
            cloud_enabled,
            attempts: HashMap::new(),
        }
    }

    /// Gate that is always cloud-enabled.
    pub fn always_enabled(config: GateConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config, clock, Arc::new(|| true))
    }

    #[inline]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    #[inline]
    pub fn can_classify(&self, item: &AggregatedItem, thumbnail: Option<&Thumbnail>) -> bool {
        self.evaluate(item, thumbnail).is_approved()
    }

    pub fn evaluate(&self, item: &AggregatedItem, thumbnail: Option<&Thumbnail>) -> Admission {
        let admission = self.check(item, thumbnail);

        match &admission {
            Admission::Approved => tracing::debug!(item = %item.id(), "Classification admitted"),
            Admission::Denied(denial) => {
                tracing::trace!(item = %item.id(), %denial, "Classification not admitted")
            }
        }

        admission
    }

    fn check(&self, item: &AggregatedItem, thumbnail: Option<&Thumbnail>) -> Admission {
        if !(self.cloud_enabled)() {
            return Admission::Denied(Denial::CloudDisabled);
        }

        let now = self.clock.now_ms();
        let age_ms = item.age_ms(now);
        let stable = item.merge_count() >= self.config.min_stability_frames
            || age_ms >= self.config.min_stability_age_ms;

        if !stable {
            return Admission::Denied(Denial::Unstable {
                merge_count: item.merge_count(),
                age_ms,
            });
        }

        let Some(attempt) = self.attempts.get(&item.id()) else {
            return Admission::Approved;
        };

        let elapsed = now.saturating_sub(attempt.last_triggered_ms);
        if elapsed < self.config.cooldown_ms {
            return Admission::Denied(Denial::CoolingDown {
                remaining_ms: self.config.cooldown_ms - elapsed,
            });
        }

        if let (Some(new), Some(last)) = (thumbnail, attempt.thumbnail.as_ref()) {
            if new.same_content(last) {
                return Admission::Denied(Denial::DuplicateContent);
            }
        }

        Admission::Approved
    }

    /// Records that a request for `item` with `thumbnail` was just dispatched.
    pub fn on_classification_triggered(
        &mut self,
        item: &AggregatedItem,
        thumbnail: Option<&Thumbnail>,
    ) {
        let now = self.clock.now_ms();

        self.attempts.insert(
            item.id(),
            ClassificationAttempt {
                last_triggered_ms: now,
                thumbnail: thumbnail.cloned(),
            },
        );

        tracing::debug!(item = %item.id(), at = now, "Classification triggered");
    }

    /// Drops the bookkeeping of an evicted item.
    pub fn forget(&mut self, id: ItemId) -> bool {
        self.attempts.remove(&id).is_some()
    }

    #[inline]
    pub fn attempts(&self) -> usize {
        self.attempts.len()
    }
}
