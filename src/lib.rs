//! Turns a noisy stream of per-frame object detections into a few stable,
//! classified items.
//!
//! * [`ItemAggregator`] merges detections into durable [`AggregatedItem`]s.
//! * [`ClassificationGate`] decides when an item is worth a remote classification.
//! * [`mapper::resolve`] maps the classifier's labels onto a [`DomainPack`] category.
//! * [`Session`] wires the three together around a background classification worker.

pub mod aggregator;
pub mod bbox;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod detection;
pub mod domain_pack;
pub mod error;
pub mod frame;
pub mod gate;
pub mod item;
pub mod mapper;
pub mod rolling_avg;
pub mod session;
pub mod thumbnail;

mod circular_queue;

pub use aggregator::ItemAggregator;
pub use classifier::Classifier;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AggregatorConfig, GateConfig, SessionConfig};
pub use detection::{LabelCandidate, RawDetection};
pub use domain_pack::{DomainCategory, DomainPack};
pub use error::{ClassifierError, Error};
pub use frame::Frame;
pub use gate::{Admission, ClassificationGate, Denial};
pub use item::{AggregatedItem, ItemId, PriceRange};
pub use mapper::{CategoryMapper, MappingResult};
pub use session::{FrameReport, Session};
pub use thumbnail::Thumbnail;
