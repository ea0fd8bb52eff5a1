//! Remote licensing authority: validate, activate and deactivate requests.
//!
//! Every call returns an [`AuthorityResult`] instead of an error so callers
//! can tell a definitive rejection apart from a transient transport failure.

mod client;
mod result;

pub use client::*;
pub use result::*;
