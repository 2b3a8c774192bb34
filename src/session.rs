//! One camera session: aggregator, gate and mapper owned by the frame thread,
//! with remote classification running on a background worker.
//!
//! All item state is mutated only from the thread that calls into the session.
//! Classification results travel back over the worker channel, keyed by item id,
//! and are applied on the next [`Session::process_frame`] (or explicitly via
//! [`Session::apply_results`]). Item ids are never reused, so a result for an
//! evicted item finds nothing to update and is dropped.

use std::sync::Arc;

use crate::aggregator::ItemAggregator;
use crate::classifier::{
    ClassificationRequest, ClassificationResponse, ClassificationWorker, Classifier,
};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::domain_pack::DomainPack;
use crate::error::Error;
use crate::frame::Frame;
use crate::gate::{ClassificationGate, CloudPredicate};
use crate::item::{AggregatedItem, ItemId};
use crate::mapper::CategoryMapper;

/// What happened while processing one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Items that absorbed a detection of this frame.
    pub touched: Vec<ItemId>,
    /// Items sent for remote classification.
    pub dispatched: Vec<ItemId>,
    /// Items that received a category from an earlier classification.
    pub categorized: Vec<ItemId>,
}

pub struct Session {
    aggregator: ItemAggregator,
    gate: ClassificationGate,
    mapper: CategoryMapper,
    worker: ClassificationWorker,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        pack: Arc<DomainPack>,
        clock: Arc<dyn Clock>,
        cloud_enabled: CloudPredicate,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            aggregator: ItemAggregator::new(config.aggregator, clock.clone()),
            gate: ClassificationGate::new(config.gate, clock, cloud_enabled),
            mapper: CategoryMapper::new(pack),
            worker: ClassificationWorker::spawn(classifier)?,
        })
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport, Error> {
        let categorized = self.apply_results();
        let touched = self.aggregator.merge_frame(frame);
        let mut dispatched = Vec::new();

        for &id in &touched {
            let Some(item) = self.aggregator.get(id) else {
                continue;
            };

            // nothing to send without a crop
            let Some(thumbnail) = item.thumbnail() else {
                continue;
            };

            if !self.gate.can_classify(item, Some(thumbnail)) {
                continue;
            }

            self.worker.submit(ClassificationRequest {
                item: id,
                thumbnail: thumbnail.clone(),
            })?;
            self.gate.on_classification_triggered(item, Some(thumbnail));
            dispatched.push(id);
        }

        Ok(FrameReport {
            touched,
            dispatched,
            categorized,
        })
    }

    /// Applies every classification result that is ready, without blocking.
    pub fn apply_results(&mut self) -> Vec<ItemId> {
        let responses = self.worker.drain();
        self.apply(responses)
    }

    /// Blocks until all dispatched classifications came back, then applies them.
    pub fn wait_idle(&mut self) -> Result<Vec<ItemId>, Error> {
        let responses = self.worker.wait_all()?;
        Ok(self.apply(responses))
    }

    fn apply(&mut self, responses: Vec<ClassificationResponse>) -> Vec<ItemId> {
        let mut categorized = Vec::new();

        for response in responses {
            let labels = match response.outcome {
                Ok(labels) => labels,
                Err(err) => {
                    tracing::warn!(item = %response.item, error = %err, "Classification failed");
                    continue;
                }
            };

            let Some(item) = self.aggregator.get_mut(response.item) else {
                tracing::debug!(item = %response.item, "Dropping classification for evicted item");
                continue;
            };

            let result = self.mapper.resolve(&labels);
            if item.apply_mapping(&result) {
                categorized.push(response.item);
            } else {
                tracing::debug!(
                    item = %response.item,
                    reason = %result.reason,
                    "Item left uncategorized"
                );
            }
        }

        categorized
    }

    /// Evicts an item; any classification still in flight for it is discarded.
    pub fn evict(&mut self, id: ItemId) -> Option<AggregatedItem> {
        self.gate.forget(id);
        self.aggregator.remove(id)
    }

    #[inline]
    pub fn item(&self, id: ItemId) -> Option<&AggregatedItem> {
        self.aggregator.get(id)
    }

    #[inline]
    pub fn items(&self) -> impl Iterator<Item = &AggregatedItem> {
        self.aggregator.items()
    }

    #[inline]
    pub fn aggregator(&self) -> &ItemAggregator {
        &self.aggregator
    }

    #[inline]
    pub fn gate(&self) -> &ClassificationGate {
        &self.gate
    }

    #[inline]
    pub fn mapper(&self) -> &CategoryMapper {
        &self.mapper
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.worker.in_flight()
    }
}
