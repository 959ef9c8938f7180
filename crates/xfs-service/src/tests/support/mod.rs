//! Test harness utilities for the dispatch suites.

mod harness;
mod listeners;
mod reporter;
mod transport;
mod world;

pub use harness::{Harness, WAIT};
pub use listeners::ChannelListener;
pub use reporter::{DispatchEvent, RecordingReporter};
pub use transport::RecordingTransport;
pub use world::{DispatchWorld, world};
