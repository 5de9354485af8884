//! Turns normalised search inputs into an ordered list of catalogue queries.
use crate::context::Limits;
use crate::error::Result;
use crate::orbit::{Frame, OrbitPartition};
use crate::product::{ProductTypeVersion, JAXA_L2_TYPES, ORBIT_TYPES};
use crate::request::{Filters, SearchRequest, SpatialFilter};
use crate::timestamp;
use chrono::{DateTime, Utc};
use tracing::warn;

const L1_COLLECTIONS: [&str; 3] = [
    "EarthCAREL0L1Products",
    "EarthCAREL1InstChecked",
    "EarthCAREL1Validated",
];
const ESA_L2_COLLECTIONS: [&str; 3] = [
    "EarthCAREL2Products",
    "EarthCAREL2InstChecked",
    "EarthCAREL2Validated",
];
const JAXA_L2_COLLECTIONS: [&str; 3] = ["JAXAL2Products", "JAXAL2InstChecked", "JAXAL2Validated"];
const AUX_COLLECTIONS: [&str; 1] = ["EarthCAREAuxiliary"];
const ORBIT_COLLECTIONS: [&str; 2] = ["EarthCAREOrbitData", "EarthCAREAuxiliary"];

/// Collections a product type may live in, in the order they are tried.
pub fn collections_for(type_code: &str) -> Vec<String> {
    let level = type_code.rsplit('_').next().unwrap_or("");
    let collections: &[&str] = if ORBIT_TYPES.contains(&type_code) {
        &ORBIT_COLLECTIONS
    } else {
        match level {
            "1B" | "1C" => &L1_COLLECTIONS,
            "1D" => &AUX_COLLECTIONS,
            "2A" | "2B" if JAXA_L2_TYPES.contains(&type_code) => &JAXA_L2_COLLECTIONS,
            "2A" | "2B" => &ESA_L2_COLLECTIONS,
            _ => &[],
        }
    };
    collections.iter().map(|c| c.to_string()).collect()
}

/// Time selection after parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSelection {
    pub timestamps: Vec<DateTime<Utc>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Everything the planner needs besides the product list.
#[derive(Debug, Clone)]
pub struct PlanInputs<'a> {
    pub time: &'a TimeSelection,
    pub spatial: SpatialFilter,
    pub orbits: &'a OrbitPartition,
    /// Frame letters given without any orbit number.
    pub frames: &'a [Frame],
}

pub fn plan_requests(
    products: &[ProductTypeVersion],
    inputs: &PlanInputs,
    limits: &Limits,
) -> Result<Vec<SearchRequest>> {
    let mut products = products.to_vec();
    products.sort();
    products.dedup();

    let mut requests = vec![];
    for product in products {
        requests.extend(plan_product(&product, inputs, limits, Utc::now())?);
    }
    Ok(requests)
}

fn plan_product(
    product: &ProductTypeVersion,
    inputs: &PlanInputs,
    limits: &Limits,
    now: DateTime<Utc>,
) -> Result<Vec<SearchRequest>> {
    let collections = collections_for(&product.type_code);
    let cap = limits.max_orbits_per_request;
    let request = |filters: Filters| SearchRequest::new(product.clone(), collections.clone(), filters, cap);
    let time = inputs.time;
    let window = Filters {
        time_start: time.start,
        time_end: time.end,
        spatial: inputs.spatial,
        ..Default::default()
    };

    if !time.timestamps.is_empty() {
        return time
            .timestamps
            .iter()
            .map(|t| {
                request(Filters {
                    timestamp: Some(*t),
                    ..Default::default()
                })
            })
            .collect();
    }

    let orbits = inputs.orbits;
    if !orbits.is_empty() {
        if !inputs.frames.is_empty() {
            warn!("Frame IDs without orbit numbers are ignored when orbits are selected");
        }
        let mut requests = vec![];
        for chunk in orbits.complete.chunks(cap.max(1)) {
            requests.push(request(Filters {
                orbit_numbers: Some(chunk.to_vec()),
                ..window.clone()
            })?);
        }
        for (frame, frame_orbits) in &orbits.incomplete {
            for chunk in frame_orbits.chunks(cap.max(1)) {
                requests.push(request(Filters {
                    orbit_numbers: Some(chunk.to_vec()),
                    frame: Some(*frame),
                    ..window.clone()
                })?);
            }
        }
        return Ok(requests);
    }

    // Without orbit data a time-scoped search always gets a closed interval.
    let window = if time.start.is_some() || time.end.is_some() {
        Filters {
            time_start: Some(time.start.unwrap_or_else(timestamp::mission_start)),
            time_end: Some(time.end.unwrap_or(now)),
            ..window
        }
    } else {
        window
    };

    if !inputs.frames.is_empty() {
        return inputs
            .frames
            .iter()
            .map(|f| {
                request(Filters {
                    frame: Some(*f),
                    ..window.clone()
                })
            })
            .collect();
    }

    Ok(vec![request(window)?])
}
