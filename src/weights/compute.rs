// src/weights/compute.rs
//! Weight computation: additive raw score per validator followed by a
//! min-max rescale into `[0, max_percentage]`.
//!
//! Both scan bounds start at zero, so zero is always inside the range:
//! an all-positive set keeps `min = 0` and an all-negative set keeps
//! `max = 0`. Only an all-zero map is flat, and it scales by 1.

use crate::abci::provider::SignalProvider;
use crate::error::{Result, WeightError};
use crate::types::{Weight, WeightMap};

/// Raw per-validator metrics for one height.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    pub uptime: WeightMap,
    pub governance: WeightMap,
    pub contribution: WeightMap,
}

impl Signals {
    /// Query every source. Any unavailable source fails the whole height.
    pub fn collect(provider: &dyn SignalProvider, height: i64) -> Result<Self> {
        Ok(Self {
            uptime: provider.uptime(height)?,
            governance: provider.governance_participation(height)?,
            contribution: provider.contribution_activity(height)?,
        })
    }

    /// `uptime + governance + contribution` for every validator in the
    /// uptime set. Missing entries in the other sources count as zero.
    pub fn raw_scores(&self) -> Result<WeightMap> {
        let mut raw = WeightMap::new();
        for (address, uptime) in &self.uptime {
            let governance = self.governance.get(address).copied().unwrap_or(0);
            let contribution = self.contribution.get(address).copied().unwrap_or(0);
            let score = uptime
                .checked_add(governance)
                .and_then(|s| s.checked_add(contribution))
                .ok_or_else(|| WeightError::Overflow(address.to_hex()))?;
            raw.insert(address.clone(), score);
        }
        Ok(raw)
    }
}

/// Scaling bounds and factor for a merged weight map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub min: Weight,
    pub max: Weight,
    pub factor: Weight,
}

impl Scale {
    pub fn of(weights: &WeightMap, max_percentage: Weight) -> Result<Self> {
        let (min, max) = weights
            .values()
            .fold((0, 0), |(lo, hi): (Weight, Weight), &w| (lo.min(w), hi.max(w)));
        let range = max
            .checked_sub(min)
            .ok_or_else(|| WeightError::Overflow("weight range".to_string()))?;
        let factor = if range > 0 { max_percentage / range } else { 1 };
        Ok(Self { min, max, factor })
    }

    fn apply(&self, weight: Weight) -> Option<Weight> {
        weight.checked_sub(self.min)?.checked_mul(self.factor)
    }
}

/// Merge fresh raw scores over `current` and rescale the fresh entries.
///
/// Validators without a fresh signal keep their stored weight unchanged but
/// still take part in the min/max scan.
pub fn compute_weights(
    current: &WeightMap,
    signals: &Signals,
    max_percentage: Weight,
) -> Result<WeightMap> {
    let raw = signals.raw_scores()?;

    let mut merged = current.clone();
    for (address, score) in &raw {
        merged.insert(address.clone(), *score);
    }

    let scale = Scale::of(&merged, max_percentage)?;
    log::debug!(
        "weight scale: min={} max={} factor={}",
        scale.min,
        scale.max,
        scale.factor
    );

    let mut scaled = WeightMap::new();
    for (address, weight) in &merged {
        let value = if raw.contains_key(address) {
            scale
                .apply(*weight)
                .ok_or_else(|| WeightError::Overflow(address.to_hex()))?
        } else {
            *weight
        };
        scaled.insert(address.clone(), value);
    }
    Ok(scaled)
}

/// Every entry of `weights` lies in `[0, max_percentage]`.
pub fn check_bounds(weights: &WeightMap, max_percentage: Weight) -> Result<()> {
    match weights
        .iter()
        .find(|(_, w)| **w < 0 || **w > max_percentage)
    {
        Some((address, weight)) => Err(WeightError::InvalidWeights(format!(
            "{} has weight {} outside [0, {}]",
            address, weight, max_percentage
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidatorAddress;

    fn addr(s: &str) -> ValidatorAddress {
        ValidatorAddress::from(s.as_bytes())
    }

    fn map(entries: &[(&str, Weight)]) -> WeightMap {
        entries.iter().map(|(a, w)| (addr(a), *w)).collect()
    }

    fn uptime_only(entries: &[(&str, Weight)]) -> Signals {
        Signals {
            uptime: map(entries),
            ..Default::default()
        }
    }

    #[test]
    fn test_scores_are_additive() {
        let signals = Signals {
            uptime: map(&[("val1", 40), ("val2", 10)]),
            governance: map(&[("val1", 40), ("val2", 10)]),
            contribution: map(&[("val1", 2), ("val2", 100)]),
        };
        assert_eq!(
            signals.raw_scores().unwrap(),
            map(&[("val1", 82), ("val2", 120)])
        );
    }

    #[test]
    fn test_only_uptime_keys_are_scored() {
        let signals = Signals {
            uptime: map(&[("val1", 5)]),
            governance: map(&[("val1", 1), ("val9", 50)]),
            contribution: WeightMap::new(),
        };
        assert_eq!(signals.raw_scores().unwrap(), map(&[("val1", 6)]));
    }

    #[test]
    fn test_zero_floor_scaling() {
        // min stays at 0, max = 20, factor = 100 / 20 = 5
        let out = compute_weights(&WeightMap::new(), &uptime_only(&[("a", 10), ("b", 20)]), 100)
            .unwrap();
        assert_eq!(out, map(&[("a", 50), ("b", 100)]));
    }

    #[test]
    fn test_integer_factor_truncates() {
        // factor = 55 / 120 = 0
        let signals = Signals {
            uptime: map(&[("val1", 40), ("val2", 10)]),
            governance: map(&[("val1", 40), ("val2", 10)]),
            contribution: map(&[("val1", 2), ("val2", 100)]),
        };
        let out = compute_weights(&WeightMap::new(), &signals, 55).unwrap();
        assert_eq!(out, map(&[("val1", 0), ("val2", 0)]));
    }

    #[test]
    fn test_negative_inputs_shift_to_zero() {
        let out =
            compute_weights(&WeightMap::new(), &uptime_only(&[("a", -10), ("b", -5)]), 100).unwrap();
        // min = -10, max = 0 (floor), factor = 10
        assert_eq!(out, map(&[("a", 0), ("b", 50)]));
    }

    #[test]
    fn test_flat_distribution_uses_identity_factor() {
        let scale = Scale::of(&map(&[("a", 0), ("b", 0)]), 100).unwrap();
        assert_eq!(scale.factor, 1);

        let out = compute_weights(&WeightMap::new(), &uptime_only(&[("a", 0), ("b", 0)]), 100)
            .unwrap();
        assert_eq!(out, map(&[("a", 0), ("b", 0)]));
    }

    #[test]
    fn test_empty_inputs_give_empty_output() {
        let out = compute_weights(&WeightMap::new(), &Signals::default(), 100).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_absent_validators_keep_stored_weight() {
        let current = map(&[("old", 30), ("a", 99)]);
        let out = compute_weights(&current, &uptime_only(&[("a", 10), ("b", 20)]), 100).unwrap();

        // merged = {old:30, a:10, b:20}; min 0, max 30, factor 3
        assert_eq!(out, map(&[("a", 30), ("b", 60), ("old", 30)]));
    }

    #[test]
    fn test_scaled_weights_stay_in_bounds() {
        let cases: Vec<Vec<(&str, Weight)>> = vec![
            vec![("a", 1), ("b", 2), ("c", 3)],
            vec![("a", -7), ("b", 13), ("c", 0)],
            vec![("a", 1_000), ("b", 3)],
            vec![("a", 33), ("b", 33), ("c", 34)],
        ];
        for entries in cases {
            let out = compute_weights(&WeightMap::new(), &uptime_only(&entries), 100).unwrap();
            for (address, weight) in &out {
                assert!(
                    (0..=100).contains(weight),
                    "{} out of bounds: {}",
                    address,
                    weight
                );
            }
        }
    }

    #[test]
    fn test_overflowing_signals_fail() {
        let signals = Signals {
            uptime: map(&[("a", i64::MAX)]),
            governance: map(&[("a", 1)]),
            contribution: WeightMap::new(),
        };
        assert!(matches!(
            compute_weights(&WeightMap::new(), &signals, 100),
            Err(WeightError::Overflow(_))
        ));
    }

    #[test]
    fn test_check_bounds() {
        assert!(check_bounds(&map(&[("a", 0), ("b", 100)]), 100).is_ok());
        assert!(check_bounds(&WeightMap::new(), 100).is_ok());
        assert!(matches!(
            check_bounds(&map(&[("a", 50), ("b", 101)]), 100),
            Err(WeightError::InvalidWeights(_))
        ));
        assert!(check_bounds(&map(&[("a", -1)]), 100).is_err());
    }
}
