use crate::error::{Error, Result};
use crate::orbit::Frame;
use crate::product::ProductTypeVersion;
use crate::timestamp;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpatialFilter {
    None,
    BoundingBox {
        lat_south: f64,
        lon_west: f64,
        lat_north: f64,
        lon_east: f64,
    },
    Radius {
        radius_m: u64,
        lat: f64,
        lon: f64,
    },
}

impl SpatialFilter {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Optional constraints of a [`SearchRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
    /// Search for products containing this exact instant.
    pub timestamp: Option<DateTime<Utc>>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
    pub orbit_numbers: Option<Vec<u32>>,
    pub frame: Option<Frame>,
    pub spatial: SpatialFilter,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            timestamp: None,
            time_start: None,
            time_end: None,
            orbit_numbers: None,
            frame: None,
            spatial: SpatialFilter::None,
        }
    }
}

/// One catalogue query, fully determined at planning time.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    collections: Vec<String>,
    product: ProductTypeVersion,
    filters: Filters,
}

impl SearchRequest {
    /// Validates the filter combination. A timestamp search cannot carry
    /// time window, orbit, frame or spatial constraints, and an orbit list
    /// must hold between one and `max_orbits` entries.
    pub fn new(
        product: ProductTypeVersion,
        collections: Vec<String>,
        filters: Filters,
        max_orbits: usize,
    ) -> Result<Self> {
        if filters.timestamp.is_some()
            && (filters.time_start.is_some()
                || filters.time_end.is_some()
                || filters.orbit_numbers.is_some()
                || filters.frame.is_some()
                || !filters.spatial.is_none())
        {
            return Err(Error::invalid_input(
                "a timestamp search cannot be combined with time range, orbit, frame or spatial filters",
            ));
        }
        if let Some(orbits) = &filters.orbit_numbers {
            if orbits.is_empty() || orbits.len() > max_orbits {
                return Err(Error::invalid_input(format!(
                    "a search request must hold 1 to {max_orbits} orbit numbers, got {}",
                    orbits.len()
                )));
            }
        }
        Ok(Self {
            collections,
            product,
            filters,
        })
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn product(&self) -> &ProductTypeVersion {
        &self.product
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Keeps only the candidate collections the user may access, preserving
    /// their priority order.
    pub fn restrict_collections(&mut self, allowed: &[String]) {
        self.collections.retain(|c| allowed.contains(c));
    }

    pub fn time_bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        match self.filters.timestamp {
            Some(t) => (Some(t), Some(t)),
            None => (self.filters.time_start, self.filters.time_end),
        }
    }

    /// OpenSearch parameters for this request.
    pub fn query_params(&self, max_results: usize) -> QueryParams {
        let (start, end) = self.time_bounds();
        let mut params = QueryParams::new();
        params
            .set("count", max_results.to_string())
            .set("eo:productType", format!("[{}]", self.product.type_code))
            .set_opt("eo:productVersion", self.product.query_version())
            .set_opt("time:start", start.map(|t| timestamp::format(&t)))
            .set_opt("time:end", end.map(|t| timestamp::format(&t)))
            .set_opt("eo:frame", self.filters.frame.map(|f| f.to_string()))
            .set_opt(
                "eo:orbitNumber",
                self.filters.orbit_numbers.as_ref().map(|orbits| {
                    let list: Vec<String> = orbits.iter().map(u32::to_string).collect();
                    format!("[{}]", list.join(","))
                }),
            );
        match self.filters.spatial {
            SpatialFilter::None => {}
            SpatialFilter::BoundingBox {
                lat_south,
                lon_west,
                lat_north,
                lon_east,
            } => {
                params.set("geo:box", format!("{lon_west},{lat_south},{lon_east},{lat_north}"));
            }
            SpatialFilter::Radius { radius_m, lat, lon } => {
                params
                    .set("geo:radius", radius_m.to_string())
                    .set("geo:lat", lat.to_string())
                    .set("geo:lon", lon.to_string());
            }
        }
        params
    }
}

impl fmt::Display for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self.query_params(0);
        let shown: Vec<String> = params
            .iter()
            .filter(|(k, _)| *k != "count")
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{} [{}]", shown.join(" "), self.collections.join(", "))
    }
}

/// Named OpenSearch parameters; only parameters holding a value are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn set_opt<S: Into<String>>(&mut self, name: &str, value: Option<S>) -> &mut Self {
        if let Some(value) = value {
            self.set(name, value);
        }
        self
    }

    /// Looks up a parameter, also matching names written with the default
    /// `os:` namespace (`os:count` finds `count`).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .or_else(|| name.strip_prefix("os:").and_then(|n| self.values.get(n)))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
