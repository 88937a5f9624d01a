//! Protobuf payload stored in memcached
//!
//! `UserApps` mirrors `proto/appsinstalled.proto`. It is a proto2 message, so
//! `apps` is encoded unpacked (one tag per element) and the coordinates are
//! always present.

use memc_common::{LoadError, Result};
use prost::Message;
use tracing::debug;

use crate::record::{parse_line, AppsInstalled};

/// Installed apps and last known position of a device
#[derive(Clone, PartialEq, Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl From<&AppsInstalled> for UserApps {
    fn from(record: &AppsInstalled) -> Self {
        Self {
            apps: record.apps.clone(),
            lat: Some(record.lat),
            lon: Some(record.lon),
        }
    }
}

/// Serialize a record's payload
pub fn encode_user_apps(record: &AppsInstalled) -> Result<Vec<u8>> {
    let message = UserApps::from(record);
    let mut payload = Vec::with_capacity(message.encoded_len());
    message
        .encode(&mut payload)
        .map_err(|e| LoadError::Encode(e.to_string()))?;
    Ok(payload)
}

/// Key and payload for one record
pub fn encode_record(record: &AppsInstalled) -> Result<(String, Vec<u8>)> {
    Ok((record.key(), encode_user_apps(record)?))
}

/// Decode a payload previously produced by [`encode_user_apps`]
pub fn decode_user_apps(payload: &[u8]) -> Result<UserApps> {
    UserApps::decode(payload).map_err(|e| LoadError::Encode(e.to_string()))
}

const SELF_CHECK_SAMPLE: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
                                 gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424";

/// Encode and decode a couple of sample lines, failing on any mismatch
///
/// Run by `memc-load --test` to check the payload schema before a load.
pub fn self_check() -> Result<()> {
    for line in SELF_CHECK_SAMPLE.lines() {
        let record = parse_line(line)?;
        let (key, payload) = encode_record(&record)?;
        let decoded = decode_user_apps(&payload)?;

        if decoded != UserApps::from(&record) {
            return Err(LoadError::Encode(format!(
                "round trip mismatch for {}: {:?}",
                key, decoded
            )));
        }
        debug!(key = %key, bytes = payload.len(), "Self-check passed");
    }
    Ok(())
}
