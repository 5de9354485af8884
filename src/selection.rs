//! Raw user search criteria and their validation into planned requests.
use crate::context::Limits;
use crate::error::{Error, Result};
use crate::orbit::{self, Frame, OrbitFrame};
use crate::planner::{self, PlanInputs, TimeSelection};
use crate::product::{self, ProductTypeVersion, LATEST};
use crate::request::{SearchRequest, SpatialFilter};
use crate::timestamp;

#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub product_types: Vec<String>,
    /// Overrides the version of every product type.
    pub product_version: Option<String>,
    pub timestamps: Vec<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub orbit_numbers: Vec<i64>,
    pub start_orbit_number: Option<i64>,
    pub end_orbit_number: Option<i64>,
    pub frame_ids: Vec<String>,
    pub orbit_and_frames: Vec<String>,
    pub start_orbit_and_frame: Option<String>,
    pub end_orbit_and_frame: Option<String>,
    /// `radius_m lat lon`
    pub radius_search: Option<[f64; 3]>,
    /// `lat_south lon_west lat_north lon_east`
    pub bounding_box: Option<[f64; 4]>,
}

impl SearchCriteria {
    pub fn products(&self) -> Result<Vec<ProductTypeVersion>> {
        if self.product_types.is_empty() {
            return Err(Error::invalid_input("no product type given"));
        }
        let override_version = match &self.product_version {
            Some(v) if v.eq_ignore_ascii_case(LATEST) => Some(LATEST.to_string()),
            Some(v) if product::is_valid_baseline(v) => Some(v.clone()),
            Some(v) => {
                return Err(Error::invalid_input(format!(
                    "product version '{v}' is not valid; use 'latest' or a two-letter baseline like 'AC'"
                )))
            }
            None => None,
        };
        self.product_types
            .iter()
            .map(|name| {
                let mut product = product::resolve_product_type(name)?;
                if let Some(v) = &override_version {
                    product.version = v.clone();
                }
                Ok(product)
            })
            .collect()
    }

    pub fn time_selection(&self) -> Result<TimeSelection> {
        let parse_opt = |s: &Option<String>| s.as_deref().map(timestamp::parse).transpose();
        let time = TimeSelection {
            timestamps: self
                .timestamps
                .iter()
                .map(|t| timestamp::parse(t))
                .collect::<Result<_>>()?,
            start: parse_opt(&self.start_time)?,
            end: parse_opt(&self.end_time)?,
        };
        if let (Some(start), Some(end)) = (time.start, time.end) {
            if end < start {
                return Err(Error::invalid_input("end time lies before start time"));
            }
        }
        Ok(time)
    }

    pub fn spatial_filter(&self) -> Result<SpatialFilter> {
        match (self.radius_search, self.bounding_box) {
            (Some(_), Some(_)) => Err(Error::invalid_input(
                "radius search and bounding box cannot be combined",
            )),
            (Some([radius, lat, lon]), None) => {
                if radius <= 0.0 || !valid_lat(lat) || !valid_lon(lon) {
                    return Err(Error::invalid_input(format!(
                        "invalid radius search '{radius} {lat} {lon}'"
                    )));
                }
                Ok(SpatialFilter::Radius {
                    radius_m: radius as u64,
                    lat,
                    lon,
                })
            }
            (None, Some([lat_south, lon_west, lat_north, lon_east])) => {
                if ![lat_south, lat_north].into_iter().all(valid_lat)
                    || ![lon_west, lon_east].into_iter().all(valid_lon)
                    || lat_north < lat_south
                {
                    return Err(Error::invalid_input(format!(
                        "invalid bounding box '{lat_south} {lon_west} {lat_north} {lon_east}'"
                    )));
                }
                Ok(SpatialFilter::BoundingBox {
                    lat_south,
                    lon_west,
                    lat_north,
                    lon_east,
                })
            }
            (None, None) => Ok(SpatialFilter::None),
        }
    }

    fn orbit_numbers(&self) -> Result<Vec<u32>> {
        let mut orbits = self
            .orbit_numbers
            .iter()
            .map(|o| orbit::validate_orbit_number(*o))
            .collect::<Result<Vec<_>>>()?;
        match (self.start_orbit_number, self.end_orbit_number) {
            (Some(start), Some(end)) => {
                let start = orbit::validate_orbit_number(start)?;
                let end = orbit::validate_orbit_number(end)?;
                if end < start {
                    return Err(Error::invalid_input(format!(
                        "orbit range ends ({end}) before it starts ({start})"
                    )));
                }
                orbits.extend(start..=end);
            }
            (None, None) => {}
            _ => {
                return Err(Error::invalid_input(
                    "an orbit number range needs both a start and an end orbit",
                ))
            }
        }
        Ok(orbits)
    }

    fn orbit_and_frame_range(&self) -> Result<Option<(OrbitFrame, OrbitFrame)>> {
        match (&self.start_orbit_and_frame, &self.end_orbit_and_frame) {
            (Some(start), Some(end)) => Ok(Some((start.parse()?, end.parse()?))),
            (None, None) => Ok(None),
            _ => Err(Error::invalid_input(
                "an orbit and frame range needs both a start and an end",
            )),
        }
    }

    fn uses_orbit_selectors(&self) -> bool {
        !self.orbit_numbers.is_empty()
            || self.start_orbit_number.is_some()
            || !self.frame_ids.is_empty()
            || !self.orbit_and_frames.is_empty()
            || self.start_orbit_and_frame.is_some()
    }

    /// Validates all criteria and plans the catalogue requests. Every input
    /// error is reported here, before anything touches the network.
    pub fn plan(&self, limits: &Limits) -> Result<Vec<SearchRequest>> {
        let products = self.products()?;
        let time = self.time_selection()?;
        let spatial = self.spatial_filter()?;

        if !time.timestamps.is_empty() && (self.uses_orbit_selectors() || !spatial.is_none()) {
            return Err(Error::invalid_input(
                "a timestamp search cannot be combined with orbit, frame or spatial selectors",
            ));
        }
        if !time.timestamps.is_empty() && (time.start.is_some() || time.end.is_some()) {
            return Err(Error::invalid_input(
                "--time cannot be combined with --start_time or --end_time",
            ));
        }

        let orbits = self.orbit_numbers()?;
        let frames = self
            .frame_ids
            .iter()
            .map(|f| f.parse::<Frame>())
            .collect::<Result<Vec<_>>>()?;
        let tokens = self
            .orbit_and_frames
            .iter()
            .map(|t| t.parse::<OrbitFrame>())
            .collect::<Result<Vec<_>>>()?;
        let range = self.orbit_and_frame_range()?;

        let pairs = orbit::combine_orbit_frame_inputs(&orbits, &frames, &tokens, range)?;
        let partition = orbit::partition_complete_incomplete(&pairs);
        let plain_frames: &[Frame] = if orbits.is_empty() { &frames } else { &[] };

        let inputs = PlanInputs {
            time: &time,
            spatial,
            orbits: &partition,
            frames: plain_frames,
        };
        planner::plan_requests(&products, &inputs, limits)
    }
}

fn valid_lat(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

fn valid_lon(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon)
}

/// Resolves a 1-based (or negative, from the end) index into the found list.
pub fn select_index(total: usize, index: i64) -> Result<usize> {
    let out_of_range = || {
        Error::invalid_input(format!(
            "index {index} is out of range; {total} files were found (indices start at 1)"
        ))
    };
    let total_i = i64::try_from(total).map_err(|_| out_of_range())?;
    let position = match index {
        0 => return Err(Error::invalid_input("the indices in the found files list start at 1")),
        i if i > 0 => i - 1,
        i => total_i + i,
    };
    if position < 0 || position >= total_i {
        return Err(out_of_range());
    }
    Ok(position as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            product_types: vec!["ANOM".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_range_with_orbit_list_is_rejected() {
        let c = SearchCriteria {
            orbit_numbers: vec![981],
            start_orbit_and_frame: Some("00010F".to_string()),
            end_orbit_and_frame: Some("00012C".to_string()),
            ..criteria()
        };
        assert!(matches!(c.plan(&Limits::default()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_range_with_token_list_is_accepted() {
        let c = SearchCriteria {
            orbit_and_frames: vec!["00020A".to_string()],
            start_orbit_and_frame: Some("00010F".to_string()),
            end_orbit_and_frame: Some("00012C".to_string()),
            ..criteria()
        };
        let requests = c.plan(&Limits::default()).unwrap();
        // complete orbit 11, then frame A holds orbits 12 and 20 in one chunk
        assert_eq!(requests.len(), 7);
        assert_eq!(requests[1].filters().orbit_numbers, Some(vec![12, 20]));
    }

    #[test]
    fn test_timestamp_with_orbits_is_rejected() {
        let c = SearchCriteria {
            timestamps: vec!["2024-07-31 13:45".to_string()],
            orbit_numbers: vec![981],
            ..criteria()
        };
        assert!(matches!(c.plan(&Limits::default()), Err(Error::InvalidInput(_))));

        let c = SearchCriteria {
            timestamps: vec!["2024-07-31 13:45".to_string()],
            bounding_box: Some([37.7, 14.9, 37.78, 14.99]),
            ..criteria()
        };
        assert!(matches!(c.plan(&Limits::default()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_timestamp_with_time_range_is_rejected() {
        let c = SearchCriteria {
            timestamps: vec!["2024-07-31 13:45".to_string()],
            start_time: Some("2024-07-31".to_string()),
            ..criteria()
        };
        assert!(matches!(c.plan(&Limits::default()), Err(Error::InvalidInput(_))));

        let c = SearchCriteria {
            timestamps: vec!["2024-07-31 13:45".to_string()],
            end_time: Some("2024-08-01".to_string()),
            ..criteria()
        };
        assert!(matches!(c.plan(&Limits::default()), Err(Error::InvalidInput(_))));

        let c = SearchCriteria {
            start_time: Some("2024-07-31".to_string()),
            end_time: Some("2024-08-01".to_string()),
            ..criteria()
        };
        assert!(c.plan(&Limits::default()).is_ok());
    }

    #[test]
    fn test_orbit_number_range() {
        let c = SearchCriteria {
            start_orbit_number: Some(100),
            end_orbit_number: Some(219),
            ..criteria()
        };
        let requests = c.plan(&Limits::default()).unwrap();
        assert_eq!(requests.len(), 3);

        let c = SearchCriteria {
            start_orbit_number: Some(100),
            ..criteria()
        };
        assert!(c.plan(&Limits::default()).is_err());
    }

    #[test]
    fn test_orbit_out_of_range() {
        let c = SearchCriteria {
            orbit_numbers: vec![100_000],
            ..criteria()
        };
        assert!(matches!(c.plan(&Limits::default()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_version_override() {
        let c = SearchCriteria {
            product_types: vec!["ANOM:AC".to_string(), "AEBD".to_string()],
            product_version: Some("AD".to_string()),
            ..Default::default()
        };
        assert!(c.products().unwrap().iter().all(|p| p.version == "AD"));

        let c = SearchCriteria {
            product_version: Some("latest".to_string()),
            ..c
        };
        assert!(c.products().unwrap().iter().all(|p| p.query_version().is_none()));

        let c = SearchCriteria {
            product_version: Some("A".to_string()),
            ..c
        };
        assert!(c.products().is_err());
    }

    #[test]
    fn test_frames_only() {
        let c = SearchCriteria {
            frame_ids: vec!["a".to_string(), "H".to_string()],
            ..criteria()
        };
        let requests = c.plan(&Limits::default()).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].filters().frame, Some(Frame::A));
        assert!(requests[0].filters().orbit_numbers.is_none());
    }

    #[test]
    fn test_spatial_filters() {
        let c = SearchCriteria {
            bounding_box: Some([37.7, 14.9, 37.78, 14.99]),
            ..criteria()
        };
        let requests = c.plan(&Limits::default()).unwrap();
        let params = requests[0].query_params(10);
        assert_eq!(params.get("geo:box"), Some("14.9,37.7,14.99,37.78"));

        let c = SearchCriteria {
            radius_search: Some([25000.0, 51.35, 12.43]),
            bounding_box: Some([37.7, 14.9, 37.78, 14.99]),
            ..criteria()
        };
        assert!(c.plan(&Limits::default()).is_err());
    }

    #[test]
    fn test_select_index() {
        assert_eq!(select_index(5, 1).unwrap(), 0);
        assert_eq!(select_index(5, 5).unwrap(), 4);
        assert_eq!(select_index(5, -1).unwrap(), 4);
        assert_eq!(select_index(5, -5).unwrap(), 0);
        assert!(select_index(5, 0).is_err());
        assert!(select_index(5, 6).is_err());
        assert!(select_index(5, -6).is_err());
        assert!(select_index(0, 1).is_err());
    }
}
