//! Value ranges used to normalize statistics before coloring.
//!
//! Each statistic has an optional general range plus optional per-zoom
//! ranges. Either endpoint of a range may be unset; unset endpoints are
//! discovered from built rasters one zoom level at a time, while endpoints
//! that are already set are never replaced by discovery.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{StatisticConfig, ZoomConfig};
use crate::{PyramidError, PyramidResult};

/// A `(min, max)` pair where either endpoint may be unset.
///
/// Serialized as a two-element array, `[0, null]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Option<f64>, Option<f64>)", into = "(Option<f64>, Option<f64>)")]
pub struct ValueRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ValueRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn get(&self, endpoint: RangeEndpoint) -> Option<f64> {
        match endpoint {
            RangeEndpoint::Min => self.min,
            RangeEndpoint::Max => self.max,
        }
    }

    fn set(&mut self, endpoint: RangeEndpoint, value: Option<f64>) {
        match endpoint {
            RangeEndpoint::Min => self.min = value,
            RangeEndpoint::Max => self.max = value,
        }
    }

    /// Fill unset endpoints from `fallback`.
    pub fn or(self, fallback: ValueRange) -> ValueRange {
        ValueRange {
            min: self.min.or(fallback.min),
            max: self.max.or(fallback.max),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }
}

impl From<(Option<f64>, Option<f64>)> for ValueRange {
    fn from((min, max): (Option<f64>, Option<f64>)) -> Self {
        Self { min, max }
    }
}

impl From<ValueRange> for (Option<f64>, Option<f64>) {
    fn from(r: ValueRange) -> Self {
        (r.min, r.max)
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<f64>| v.map_or_else(|| "none".to_string(), |v| v.to_string());
        write!(f, "[{}, {}]", show(self.min), show(self.max))
    }
}

/// Which end of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeEndpoint {
    Min,
    Max,
}

impl fmt::Display for RangeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
        }
    }
}

/// Extrema observed for one statistic over one zoom level.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredRange {
    pub stat: String,
    pub z: u32,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// A single endpoint filled in by [`ValueRangeTracker::reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct RangeUpdate {
    pub stat: String,
    pub z: u32,
    pub endpoint: RangeEndpoint,
    pub value: f64,
}

impl fmt::Display for RangeUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} z={} {} = {}", self.stat, self.z, self.endpoint, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StatRanges {
    general: Option<ValueRange>,
    per_zoom: BTreeMap<u32, ValueRange>,
}

/// Ranges for every configured statistic, keyed by `(stat, Option<z>)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRangeTracker {
    stats: BTreeMap<String, StatRanges>,
}

impl ValueRangeTracker {
    /// A tracker with no ranges for the given statistic names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stats: names
                .into_iter()
                .map(|n| (n.into(), StatRanges::default()))
                .collect(),
        }
    }

    /// Seed the tracker with the ranges declared in the statistic configs.
    pub fn from_statistics(statistics: &[StatisticConfig]) -> Self {
        let stats = statistics
            .iter()
            .map(|s| {
                let per_zoom = s
                    .z_config
                    .iter()
                    .filter_map(|(z, c)| c.val_range.map(|r| (*z, r)))
                    .collect();
                (
                    s.name.clone(),
                    StatRanges {
                        general: s.val_range,
                        per_zoom,
                    },
                )
            })
            .collect();
        Self { stats }
    }

    /// Write the tracked ranges back into the statistic configs.
    pub fn apply_to(&self, statistics: &mut [StatisticConfig]) {
        for stat in statistics.iter_mut() {
            let Some(ranges) = self.stats.get(&stat.name) else {
                continue;
            };
            stat.val_range = ranges.general;
            for (z, range) in &ranges.per_zoom {
                stat.z_config
                    .entry(*z)
                    .or_insert_with(ZoomConfig::default)
                    .val_range = Some(*range);
            }
        }
    }

    pub fn stat_names(&self) -> impl Iterator<Item = &str> {
        self.stats.keys().map(String::as_str)
    }

    fn ranges(&self, stat: &str) -> PyramidResult<&StatRanges> {
        self.stats
            .get(stat)
            .ok_or_else(|| PyramidError::RangeResolution(stat.to_string()))
    }

    fn ranges_mut(&mut self, stat: &str) -> PyramidResult<&mut StatRanges> {
        self.stats
            .get_mut(stat)
            .ok_or_else(|| PyramidError::RangeResolution(stat.to_string()))
    }

    /// Resolve the range for `stat` at zoom `z`.
    ///
    /// With `z == None` the general range is returned. Otherwise the
    /// per-zoom range is returned; when `substitute_general` is set, a
    /// missing per-zoom range or missing endpoints are taken from the
    /// general range.
    pub fn get(
        &self,
        stat: &str,
        z: Option<u32>,
        substitute_general: bool,
    ) -> PyramidResult<Option<ValueRange>> {
        let ranges = self.ranges(stat)?;
        let Some(z) = z else {
            return Ok(ranges.general);
        };

        let zoom = ranges.per_zoom.get(&z).copied();
        if !substitute_general {
            return Ok(zoom);
        }

        Ok(match (zoom, ranges.general) {
            (Some(zoom), Some(general)) => Some(zoom.or(general)),
            (Some(zoom), None) => Some(zoom),
            (None, general) => general,
        })
    }

    /// Create the `(stat, z)` range if absent, or reset it when `overwrite`.
    pub fn create_range(
        &mut self,
        stat: &str,
        z: Option<u32>,
        overwrite: bool,
    ) -> PyramidResult<ValueRange> {
        let ranges = self.ranges_mut(stat)?;
        let slot = match z {
            None => &mut ranges.general,
            Some(z) => {
                let entry = ranges.per_zoom.entry(z).or_default();
                if overwrite {
                    *entry = ValueRange::default();
                }
                return Ok(*entry);
            }
        };
        if slot.is_none() || overwrite {
            *slot = Some(ValueRange::default());
        }
        Ok((*slot).unwrap_or_default())
    }

    fn set_endpoint(
        &mut self,
        endpoint: RangeEndpoint,
        value: Option<f64>,
        stat: &str,
        z: Option<u32>,
    ) -> PyramidResult<()> {
        let ranges = self.ranges_mut(stat)?;
        let range = match z {
            None => ranges.general.get_or_insert_with(ValueRange::default),
            Some(z) => ranges.per_zoom.entry(z).or_default(),
        };
        range.set(endpoint, value);
        Ok(())
    }

    /// Set the minimum at `(stat, z)`, creating the range if needed.
    pub fn set_min(&mut self, value: f64, stat: &str, z: Option<u32>) -> PyramidResult<()> {
        self.set_endpoint(RangeEndpoint::Min, Some(value), stat, z)
    }

    /// Set the maximum at `(stat, z)`, creating the range if needed.
    pub fn set_max(&mut self, value: f64, stat: &str, z: Option<u32>) -> PyramidResult<()> {
        self.set_endpoint(RangeEndpoint::Max, Some(value), stat, z)
    }

    /// True when `endpoint` is unset at `(stat, z)` and, with
    /// `substitute_general`, also unset in the general range.
    pub fn missing(
        &self,
        endpoint: RangeEndpoint,
        stat: &str,
        z: Option<u32>,
        substitute_general: bool,
    ) -> PyramidResult<bool> {
        let resolved = self.get(stat, z, substitute_general)?;
        Ok(resolved.and_then(|r| r.get(endpoint)).is_none())
    }

    /// Fill endpoints that are missing (with general substitution) from the
    /// discovered extrema. Returns every endpoint that was set.
    pub fn reconcile(&mut self, discovered: &[DiscoveredRange]) -> PyramidResult<Vec<RangeUpdate>> {
        let mut updates = Vec::new();

        for found in discovered {
            let candidates = [
                (RangeEndpoint::Min, found.min),
                (RangeEndpoint::Max, found.max),
            ];
            for (endpoint, value) in candidates {
                let Some(value) = value.filter(|v| v.is_finite()) else {
                    continue;
                };
                if self.missing(endpoint, &found.stat, Some(found.z), true)? {
                    self.set_endpoint(endpoint, Some(value), &found.stat, Some(found.z))?;
                    updates.push(RangeUpdate {
                        stat: found.stat.clone(),
                        z: found.z,
                        endpoint,
                        value,
                    });
                }
            }
        }

        Ok(updates)
    }
}
