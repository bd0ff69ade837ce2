pub mod config;
pub mod enforcer;

pub use config::{FailMode, PolicyConfig};
pub use enforcer::{BundleFailure, Decision, EnforceError, PolicyEnforcer, QuickCheck, Reason};
