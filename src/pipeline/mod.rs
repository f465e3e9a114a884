//! Frame Pipeline (C7): governed frame acquisition, detector fan-out and
//! client publication.

mod coordinator;
mod events;
mod source;

pub use coordinator::FramePipeline;
pub use events::{NoOpPipelineSink, PipelineEventSink};
pub use source::FrameSource;
