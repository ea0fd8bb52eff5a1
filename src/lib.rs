//! Client-side license lifecycle for LemonSqueezy license keys.
//!
//! - Activation and deactivation of one license per installation
//! - Rate-limited background re-validation with fixed-delay retries
//! - Offline grace: a recent licensed verdict survives network outages
//! - A cheap, synchronous feature gate
//!
//! ```no_run
//! use std::sync::Arc;
//! use lemonlock::{Config, FeatureGate, MemoryStore, PremiumFeature};
//!
//! # async fn run() -> lemonlock::Result<()> {
//! let handle = lemonlock::init(Config::default(), Arc::new(MemoryStore::new()))?;
//! handle.activate("AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE").await?;
//!
//! let gate = FeatureGate::new(handle.clone());
//! gate.require(PremiumFeature::WordCount)?;
//!
//! lemonlock::dispose(handle);
//! # Ok(())
//! # }
//! ```

pub mod authority;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod key;
pub mod manager;
pub mod models;
pub mod offline;
pub mod retry;
pub mod storage;

pub use authority::{AuthorityClient, AuthorityResult, RejectionReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{ErrorCode, LicenseError, Result};
pub use gate::{FeatureGate, PremiumFeature};
pub use key::LicenseKey;
pub use manager::{
    DeactivationReport, LicenseHandle, LicenseManager, MIN_VALIDATION_INTERVAL, dispose, init,
};
pub use models::{LicenseEvent, LicenseSnapshot, LicenseState};
pub use storage::{FileStore, LicenseStore, MemoryStore, StateStore};
