//! Resource tier catalog
//!
//! An ordered, finite set of resource configurations plus the transition
//! rules between them. Past the largest tier, scaling up doubles the
//! replica count at the largest tier's CPU and memory; configurations the
//! catalog does not know scale down by halving replicas.

use crate::error::ConfigError;
use crate::models::{ResourceTier, ScaleDirection};
use crate::quantity::{parse_cpu_millis, parse_memory_mib};
use serde::{Deserialize, Serialize};

/// Largest replica count a Deployment can carry
pub const MAX_REPLICAS: u32 = i32::MAX as u32;

/// A tier as written in configuration, with Kubernetes quantities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub cpu: String,
    pub memory: String,
    pub replicas: u32,
}

impl TierSpec {
    pub fn new(name: &str, cpu: &str, memory: &str, replicas: u32) -> Self {
        Self {
            name: name.to_string(),
            cpu: cpu.to_string(),
            memory: memory.to_string(),
            replicas,
        }
    }
}

/// The catalog shipped by default: 250m/250Mi x1, 250m/500Mi x1, 250m/500Mi x2
pub fn default_tier_specs() -> Vec<TierSpec> {
    vec![
        TierSpec::new("c1", "250m", "250Mi", 1),
        TierSpec::new("c2", "250m", "500Mi", 1),
        TierSpec::new("c3", "250m", "500Mi", 2),
    ]
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedTier {
    pub name: String,
    pub tier: ResourceTier,
}

/// Where a configuration sits relative to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPosition {
    /// Exactly matches the catalog entry at this index
    Known(usize),
    /// Matches no entry (overflow or external drift)
    Unknown,
}

/// Totally ordered set of resource tiers
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: Vec<NamedTier>,
}

impl TierCatalog {
    /// Build a catalog; every tier must strictly dominate its predecessor
    pub fn new(tiers: Vec<NamedTier>) -> Result<Self, ConfigError> {
        if tiers.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        for entry in &tiers {
            if entry.tier.replicas == 0 {
                return Err(ConfigError::ZeroReplicas(entry.name.clone()));
            }
        }

        for pair in tiers.windows(2) {
            if !pair[1].tier.dominates(&pair[0].tier) {
                return Err(ConfigError::UnorderedCatalog {
                    lower: pair[0].name.clone(),
                    upper: pair[1].name.clone(),
                });
            }
        }

        Ok(Self { tiers })
    }

    /// Build a catalog from configuration entries
    pub fn from_specs(specs: &[TierSpec]) -> Result<Self, ConfigError> {
        let tiers = specs
            .iter()
            .map(|spec| -> Result<NamedTier, ConfigError> {
                Ok(NamedTier {
                    name: spec.name.clone(),
                    tier: ResourceTier::new(
                        parse_cpu_millis(&spec.cpu)?,
                        parse_memory_mib(&spec.memory)?,
                        spec.replicas,
                    ),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(tiers)
    }

    pub fn tiers(&self) -> &[NamedTier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// The floor every service is bootstrapped to
    pub fn smallest(&self) -> &NamedTier {
        &self.tiers[0]
    }

    pub fn largest(&self) -> &NamedTier {
        &self.tiers[self.tiers.len() - 1]
    }

    /// Match a configuration against the catalog by value
    pub fn resolve(&self, tier: &ResourceTier) -> TierPosition {
        self.tiers
            .iter()
            .position(|entry| entry.tier == *tier)
            .map(TierPosition::Known)
            .unwrap_or(TierPosition::Unknown)
    }

    /// Catalog name of a configuration, or its resources if unknown
    pub fn describe(&self, tier: &ResourceTier) -> String {
        match self.resolve(tier) {
            TierPosition::Known(idx) => self.tiers[idx].name.clone(),
            TierPosition::Unknown => format!("overflow({})", tier),
        }
    }

    /// The configuration one step from `current` in `direction`
    ///
    /// Returns `None` below the floor, and whenever the step would land on
    /// `current` itself.
    pub fn next(&self, current: &ResourceTier, direction: ScaleDirection) -> Option<ResourceTier> {
        let position = self.resolve(current);
        let last = self.tiers.len() - 1;

        let target = match (direction, position) {
            (ScaleDirection::Up, TierPosition::Known(idx)) if idx < last => self.tiers[idx + 1].tier,
            (ScaleDirection::Up, _) => self.overflow(current.replicas.saturating_mul(2).max(1)),
            (ScaleDirection::Down, TierPosition::Known(0)) => return None,
            (ScaleDirection::Down, TierPosition::Known(idx)) => self.tiers[idx - 1].tier,
            (ScaleDirection::Down, TierPosition::Unknown) => self.overflow((current.replicas / 2).max(1)),
        };

        (target != *current).then_some(target)
    }

    /// Top tier's resources at `replicas`, capped at [`MAX_REPLICAS`]
    fn overflow(&self, replicas: u32) -> ResourceTier {
        let replicas = replicas.min(MAX_REPLICAS);
        let top = self.largest().tier;
        ResourceTier::new(top.cpu_millis, top.memory_mib, replicas)
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self {
            tiers: vec![
                NamedTier {
                    name: "c1".to_string(),
                    tier: ResourceTier::new(250, 250, 1),
                },
                NamedTier {
                    name: "c2".to_string(),
                    tier: ResourceTier::new(250, 500, 1),
                },
                NamedTier {
                    name: "c3".to_string(),
                    tier: ResourceTier::new(250, 500, 2),
                },
            ],
        }
    }
}
