//! Proflens core library: metric resolution, flat aggregation, flame trees
//! and snapshot leak diffs over decoded profiles.

mod aggregate;
mod cmd;
mod config;
mod diff;
mod error;
mod flame;
mod format;
mod profile;
mod report;
mod resolve;

pub use aggregate::*;
pub use cmd::*;
pub use config::*;
pub use diff::*;
pub use error::*;
pub use flame::*;
pub use format::*;
pub use profile::*;
pub use report::*;
pub use resolve::*;
