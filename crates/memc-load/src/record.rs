//! Installed-apps records and the TSV line parser
//!
//! # Line Format
//! ```text
//! dev_type \t dev_id \t lat \t lon \t app,app,app
//! idfa     \t 1rfw45 \t 55.55 \t 42.42 \t 1423,43,567
//! ```
//!
//! Coordinates must parse as `f64` (non-finite values are accepted). Apps are
//! permissive: anything that is not a decimal `u32` is dropped.

use memc_common::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device-type tag; selects the memcached shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Idfa,
    Gaid,
    Adid,
    Dvid,
}

impl DeviceType {
    /// Every recognized tag, in configuration order
    pub const ALL: [DeviceType; 4] = [
        DeviceType::Idfa,
        DeviceType::Gaid,
        DeviceType::Adid,
        DeviceType::Dvid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Idfa => "idfa",
            DeviceType::Gaid => "gaid",
            DeviceType::Adid => "adid",
            DeviceType::Dvid => "dvid",
        }
    }
}

impl FromStr for DeviceType {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idfa" => Ok(DeviceType::Idfa),
            "gaid" => Ok(DeviceType::Gaid),
            "adid" => Ok(DeviceType::Adid),
            "dvid" => Ok(DeviceType::Dvid),
            other => Err(LoadError::UnknownDevice(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed input line
///
/// `dev_type` is kept as the raw tag; unknown tags are rejected by the
/// router, not the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct AppsInstalled {
    pub dev_type: String,
    pub dev_id: String,
    pub lat: f64,
    pub lon: f64,
    pub apps: Vec<u32>,
}

impl AppsInstalled {
    /// Memcached key: `"<dev_type>:<dev_id>"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.dev_type, self.dev_id)
    }

    /// Render back to the TSV line format
    pub fn to_tsv(&self) -> String {
        let apps: Vec<String> = self.apps.iter().map(u32::to_string).collect();
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.dev_type,
            self.dev_id,
            self.lat,
            self.lon,
            apps.join(",")
        )
    }
}

/// Parse a single TSV line
pub fn parse_line(line: &str) -> Result<AppsInstalled> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    let fields: Vec<&str> = line.split('\t').collect();
    let [dev_type, dev_id, raw_lat, raw_lon, raw_apps] = fields.as_slice() else {
        return Err(LoadError::BadLine(line.to_string()));
    };

    if dev_id.is_empty() {
        return Err(LoadError::BadLine(line.to_string()));
    }

    Ok(AppsInstalled {
        dev_type: dev_type.to_string(),
        dev_id: dev_id.to_string(),
        lat: parse_coordinate(raw_lat)?,
        lon: parse_coordinate(raw_lon)?,
        apps: parse_apps(raw_apps),
    })
}

fn parse_coordinate(raw: &str) -> Result<f64> {
    raw.parse::<f64>().map_err(|source| LoadError::BadNumber {
        value: raw.to_string(),
        source,
    })
}

fn parse_apps(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter(|app| !app.starts_with('+'))
        .filter_map(|app| app.parse::<u32>().ok())
        .collect()
}
