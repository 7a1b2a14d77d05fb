#![doc = include_str!("../README.md")]

pub mod delivery;
pub mod error;
pub mod event;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod store;

pub use error::ProcessError;
pub use event::{EnvelopeMessage, NotificationEvent, PushEnvelope};
pub use pipeline::{CampaignReport, FanoutPipeline, RoadDistance};
pub use publish::EventPublisher;
