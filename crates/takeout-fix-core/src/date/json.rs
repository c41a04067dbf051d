use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Subset of a Takeout sidecar that carries usable metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photo_taken_time: Option<TimeField>,
    #[serde(default)]
    pub creation_time: Option<TimeField>,
    #[serde(default)]
    pub geo_data: Option<GeoData>,
    #[serde(default)]
    pub geo_data_exif: Option<GeoData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeField {
    /// Epoch seconds, written as a string by the exporter but sometimes a number
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct GeoData {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
}

impl TimeField {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        let epoch = match self.timestamp.as_ref()? {
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
            _ => return None,
        };
        DateTime::from_timestamp(epoch, 0)
    }
}

impl GeoData {
    /// 0/0 is the exporter's placeholder for "no location".
    pub fn is_placeholder(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

impl Sidecar {
    pub fn parse(json_bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(json_bytes)
    }

    /// Capture time candidates in priority order.
    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        [&self.photo_taken_time, &self.creation_time]
            .into_iter()
            .filter_map(|t| t.as_ref()?.instant())
    }

    pub fn location(&self) -> Option<GeoData> {
        [self.geo_data, self.geo_data_exif]
            .into_iter()
            .flatten()
            .find(|g| !g.is_placeholder())
    }
}
