//! Product naming rules: canonical product type codes, their accepted
//! spellings, and the fixed-width layout of product file names.
use crate::error::{Error, Result};
use crate::timestamp;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const LATEST: &str = "latest";

pub const ARCHIVE_EXTENSION: &str = "ZIP";

pub const PRODUCT_TYPES: [&str; 52] = [
    // ATLID level 1b
    "ATL_NOM_1B",
    "ATL_DCC_1B",
    "ATL_CSC_1B",
    "ATL_FSC_1B",
    // MSI level 1b
    "MSI_NOM_1B",
    "MSI_BBS_1B",
    "MSI_SD1_1B",
    "MSI_SD2_1B",
    // BBR level 1b
    "BBR_NOM_1B",
    "BBR_SNG_1B",
    "BBR_SOL_1B",
    "BBR_LIN_1B",
    // CPR level 1b
    "CPR_NOM_1B",
    // MSI level 1c
    "MSI_RGR_1C",
    // level 1d
    "AUX_MET_1D",
    "AUX_JSG_1D",
    // ATLID level 2a
    "ATL_FM__2A",
    "ATL_AER_2A",
    "ATL_ICE_2A",
    "ATL_TC__2A",
    "ATL_EBD_2A",
    "ATL_CTH_2A",
    "ATL_ALD_2A",
    "ATL_CLA_2A",
    // MSI level 2a
    "MSI_CM__2A",
    "MSI_COP_2A",
    "MSI_AOT_2A",
    "MSI_CLP_2A",
    // CPR level 2a
    "CPR_FMR_2A",
    "CPR_CD__2A",
    "CPR_TC__2A",
    "CPR_CLD_2A",
    "CPR_APC_2A",
    "CPR_ECO_2A",
    "CPR_CLP_2A",
    // ATLID-MSI level 2b
    "AM__MO__2B",
    "AM__CTH_2B",
    "AM__ACD_2B",
    // ATLID-CPR level 2b
    "AC__TC__2B",
    "AC__CLP_2B",
    // BBR-MSI-(ATLID) level 2b
    "BM__RAD_2B",
    "BMA_FLX_2B",
    // ATLID-CPR-MSI level 2b
    "ACM_CAP_2B",
    "ACM_COM_2B",
    "ACM_RT__2B",
    "ACM_CLP_2B",
    // ATLID-CPR-MSI-BBR level 2b
    "ALL_DF__2B",
    "ALL_3D__2B",
    "ALL_RAD_2B",
    // Orbit data
    "MPL_ORBSCT",
    "AUX_ORBPRE",
    "AUX_ORBRES",
];

/// Level 2 products processed by JAXA, published in their own collections.
pub const JAXA_L2_TYPES: [&str; 7] = [
    "ATL_CLA_2A",
    "MSI_CLP_2A",
    "CPR_ECO_2A",
    "CPR_CLP_2A",
    "AC__CLP_2B",
    "ACM_CLP_2B",
    "ALL_RAD_2B",
];

pub const ORBIT_TYPES: [&str; 3] = ["MPL_ORBSCT", "AUX_ORBPRE", "AUX_ORBRES"];

const ABBREVIATIONS: [(&str, &str); 5] = [
    ("atl", "a"),
    ("msi", "m"),
    ("bbr", "b"),
    ("cpr", "c"),
    ("aux", "x"),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductTypeVersion {
    pub type_code: String,
    /// Two letter processor baseline or [`LATEST`].
    pub version: String,
}

impl ProductTypeVersion {
    /// The version to put into a catalogue query, `None` meaning unconstrained.
    pub fn query_version(&self) -> Option<&str> {
        if self.version == LATEST {
            None
        } else {
            Some(&self.version)
        }
    }
}

/// The three interchangeable spellings of a product type, plus the `ACMB`
/// aliases of the four-instrument products.
fn spellings(type_code: &str) -> Vec<String> {
    let long = type_code.replace('_', "").to_lowercase();
    let medium = long[..long.len() - 2].to_string();
    let short = ABBREVIATIONS
        .iter()
        .fold(medium.clone(), |name, (from, to)| name.replace(from, to));

    let mut names = vec![long.clone(), medium, short.clone()];
    if type_code.starts_with("ALL_") {
        names.push(format!("acmb{}", &long[3..]));
        names.push(format!("acmb{}", &short[3..]));
    }
    names
}

fn short_name(type_code: &str) -> String {
    spellings(type_code)[2].to_uppercase()
}

pub fn is_valid_baseline(baseline: &str) -> bool {
    let re = Regex::new(r"^[A-Z]{2}$").expect("Regex pattern should always compile");
    re.is_match(baseline)
}

/// Resolves a user supplied product name such as `ATL-NOM-1B`, `anom` or
/// `ANOM:AD` into its canonical type code and version.
pub fn resolve_product_type(input: &str) -> Result<ProductTypeVersion> {
    let normalized: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .to_lowercase();

    let (name, version) = match normalized.split_once(':') {
        Some((name, baseline)) => {
            let baseline = baseline.to_uppercase();
            if !is_valid_baseline(&baseline) {
                return Err(Error::invalid_input(format!(
                    "product version in '{input}' is not valid; give the two-letter processor \
                     baseline after the colon (e.g. ':AC')"
                )));
            }
            (name.to_string(), baseline)
        }
        None => (normalized, LATEST.to_string()),
    };

    PRODUCT_TYPES
        .iter()
        .find(|code| spellings(code).contains(&name))
        .map(|code| ProductTypeVersion {
            type_code: code.to_string(),
            version,
        })
        .ok_or_else(|| Error::invalid_input(unknown_product_message(input)))
}

fn unknown_product_message(input: &str) -> String {
    let table = |names: Vec<String>| {
        names
            .chunks(6)
            .map(|row| row.join("\t"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let long = table(PRODUCT_TYPES.iter().map(|c| c.to_string()).collect());
    let short = table(PRODUCT_TYPES.iter().map(|c| short_name(c)).collect());
    format!(
        "'{input}' is not a supported product name. Valid names are:\n{long}\n\n\
         or their short hands (separators like - or _ are allowed, e.g. A-NOM):\n{short}"
    )
}

/// Fields encoded in a product file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductMetadata {
    pub filename: String,
    pub mission_id: String,
    pub agency: String,
    pub latency_indicator: String,
    pub baseline: String,
    pub file_category: String,
    pub semantic_descriptor: String,
    pub product_level: String,
    /// Type code, e.g. `ATL_NOM_1B`.
    pub product_name: String,
    pub sensing_start_time: DateTime<Utc>,
    pub processing_start_time: DateTime<Utc>,
    /// `-1` when the name is too short to carry an orbit.
    pub orbit_number: i64,
    /// `'-'` when the name is too short to carry a frame.
    pub frame_id: char,
}

impl ProductMetadata {
    pub fn orbit_and_frame(&self) -> Option<String> {
        if self.orbit_number < 0 {
            return None;
        }
        Some(format!("{:05}{}", self.orbit_number, self.frame_id))
    }
}

fn field(name: &str, start: usize, end: usize) -> &str {
    name.get(start..end.min(name.len())).unwrap_or("")
}

/// Parses a product file name (directory and extensions are ignored), e.g.
/// `ECA_EXAC_ATL_NOM_1B_20240731T134500Z_20240801T010101Z_01234E.ZIP`.
pub fn parse_filename(path: &str) -> ProductMetadata {
    let basename = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let filename = basename.split('.').next().unwrap_or("").to_string();

    let (orbit_number, frame_id) = if filename.len() < 60 {
        (-1, '-')
    } else {
        let orbit = field(&filename, 54, 59).parse::<i64>().unwrap_or(-1);
        let frame = filename
            .get(59..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or('-');
        (orbit, frame)
    };

    ProductMetadata {
        mission_id: field(&filename, 0, 3).to_string(),
        agency: field(&filename, 4, 5).to_string(),
        latency_indicator: field(&filename, 5, 6).to_string(),
        baseline: field(&filename, 6, 8).to_string(),
        file_category: field(&filename, 9, 13).to_string(),
        semantic_descriptor: field(&filename, 13, 17).to_string(),
        product_level: field(&filename, 17, 19).to_string(),
        product_name: field(&filename, 9, 19).to_string(),
        sensing_start_time: timestamp::parse_compact_or_min(field(&filename, 20, 36)),
        processing_start_time: timestamp::parse_compact_or_min(field(&filename, 37, 53)),
        orbit_number,
        frame_id,
        filename,
    }
}

/// Level folder a product type is stored under.
pub fn product_subdirectory(type_code: &str) -> Option<&'static str> {
    let lower = type_code.to_lowercase();
    if ["AUX_JSG_1D", "AUX_MET_1D"].contains(&type_code) {
        Some("Meteo_Supporting_Files")
    } else if ORBIT_TYPES.contains(&type_code) {
        Some("Orbit_Data_Files")
    } else if type_code.contains('0') {
        Some("L0")
    } else if type_code.contains('1') {
        Some("L1")
    } else if lower.contains("2a") {
        Some("L2a")
    } else if lower.contains("2b") {
        Some("L2b")
    } else {
        None
    }
}

/// Strips any number of trailing `.zip` extensions (any case) and appends
/// exactly one `.ZIP`. Some products are served without an extension.
pub fn ensure_single_zip_extension(filename: &str) -> String {
    let mut base = filename;
    while let Some((stem, ext)) = base.rsplit_once('.') {
        if !ext.eq_ignore_ascii_case("zip") || stem.is_empty() {
            break;
        }
        base = stem;
    }
    format!("{base}.{ARCHIVE_EXTENSION}")
}

/// Local directory for a product file:
/// `root/<level>/<type>/<year>/<month>/<day>`, or `root` when subdirectories
/// are disabled.
pub fn local_product_dir(root: &Path, filename: &str, create_subdirs: bool) -> Result<PathBuf> {
    if !create_subdirs {
        return Ok(root.to_path_buf());
    }
    let meta = parse_filename(filename);
    let level = product_subdirectory(&meta.product_name).ok_or_else(|| {
        Error::invalid_input(format!(
            "unable to derive a storage folder for '{filename}' (product '{}')",
            meta.product_name
        ))
    })?;
    let t = meta.sensing_start_time;
    Ok(root
        .join(level)
        .join(&meta.product_name)
        .join(format!("{:04}", t.year()))
        .join(format!("{:02}", t.month()))
        .join(format!("{:02}", t.day())))
}
