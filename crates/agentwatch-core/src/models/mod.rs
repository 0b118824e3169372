//! Data models for AgentWatch

mod alert;
mod report;
mod request;
mod span;

pub use alert::*;
pub use report::*;
pub use request::*;
pub use span::*;
