//! Feature gate consumed by every premium action.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{LicenseError, Result};
use crate::manager::LicenseHandle;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PremiumFeature {
    WordCount,
    BracketHighlight,
    KeywordHighlight,
    Base64Encode,
    Base64Decode,
}

impl PremiumFeature {
    pub fn all() -> impl Iterator<Item = PremiumFeature> {
        Self::iter()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureGate {
    manager: LicenseHandle,
}

impl FeatureGate {
    pub fn new(manager: LicenseHandle) -> Self {
        Self { manager }
    }

    pub fn is_available(&self) -> bool {
        self.manager.is_feature_available()
    }

    /// `Ok(())` if `feature` may run right now.
    pub fn require(&self, feature: PremiumFeature) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            tracing::debug!(feature = feature.as_ref(), "Premium feature locked");
            Err(LicenseError::FeatureLocked {
                feature: feature.as_ref().to_string(),
            })
        }
    }
}
