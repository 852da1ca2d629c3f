//! Active region discovery with a static fallback.

use crate::{CloudProvider, Scope};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Regions tried when discovery fails or comes back empty.
pub const FALLBACK_REGIONS: [&str; 6] = [
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "ap-south-1",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionScan {
    pub regions: Vec<String>,
    /// False when `regions` is the fallback list.
    pub discovered: bool,
}

#[derive(Debug, Clone)]
pub struct RegionScanner {
    fallback: Vec<String>,
}

impl Default for RegionScanner {
    fn default() -> Self {
        Self {
            fallback: FALLBACK_REGIONS.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl RegionScanner {
    pub fn with_fallback(fallback: Vec<String>) -> Self {
        if fallback.is_empty() {
            return Self::default();
        }
        Self { fallback }
    }

    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }

    /// Never fails: discovery errors degrade to the fallback list.
    pub async fn list_active_regions(&self, provider: &dyn CloudProvider, scope: &Scope) -> RegionScan {
        match provider.list_regions(scope).await {
            Ok(regions) if !regions.is_empty() => {
                info!(count = regions.len(), "active regions discovered");
                RegionScan {
                    regions,
                    discovered: true,
                }
            }
            Ok(_) => {
                warn!("region discovery returned nothing, using fallback list");
                self.fallback_scan()
            }
            Err(e) => {
                warn!(error = %e, "region discovery failed, using fallback list");
                self.fallback_scan()
            }
        }
    }

    fn fallback_scan(&self) -> RegionScan {
        RegionScan {
            regions: self.fallback.clone(),
            discovered: false,
        }
    }
}
