//! The `publisher` module pushes each topic's full state to its subscribers
//! on a fixed interval, fetched from a [`SnapshotSource`].

pub mod periodic;

pub use periodic::{PeriodicPublisher, PublisherStats, SnapshotSource, StatsSnapshot};

#[cfg(test)]
mod tests;
