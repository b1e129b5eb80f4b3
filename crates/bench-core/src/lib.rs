pub mod config;
pub mod controller;
pub mod error;
pub mod ordered;
pub mod report;
pub mod sender;
pub mod snapshot;
pub mod stats;
pub mod worker;

pub use config::*;
pub use controller::*;
pub use error::*;
pub use ordered::*;
pub use report::*;
pub use sender::*;
pub use snapshot::*;
pub use stats::*;
pub use worker::*;
