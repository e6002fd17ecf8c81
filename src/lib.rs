//! Polling-based live metrics for a 389 Directory Server instance.
//!
//! Once per tick the sampler runs a chain of privileged commands (process
//! lookup, resource snapshot, system memory, connection count), normalizes
//! the results, and maintains bounded chart windows with adaptive axis
//! scaling. The last-committed state is published as a [`sampler::Snapshot`]
//! through a watch channel for the presentation layer to read.

pub mod acquire;
pub mod chart;
pub mod command;
pub mod display;
pub mod logging;
pub mod sampler;
