//! Nightly newsletter pipeline: aggregate per ticker, render per subscriber, deliver per
//! recipient, fan out across subscribers with a fixed worker budget.

pub mod aggregate;
pub mod delivery;
pub mod dispatch;
pub mod job;
pub mod render;

#[cfg(test)]
pub(crate) mod fakes;
