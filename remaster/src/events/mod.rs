//! Event sinks for workflow observers.
//!
//! The pipeline reports every state change through an [`EventSink`]; a
//! presentation layer subscribes with a [`ChannelEventSink`].

mod sink;

pub use sink::{ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
