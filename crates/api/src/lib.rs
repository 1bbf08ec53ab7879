//! HTTP surface of the survey agent.

pub mod app;
pub mod presenter;
