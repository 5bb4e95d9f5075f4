//! Episode records as exported by the episode store

use crate::{PescaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Weather conditions recorded with an episode
///
/// Every field is optional; `null` and absent values fall back to the
/// documented defaults when features are extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherObservation {
    pub temp: Option<f64>,
    pub wind: Option<f64>,
    pub pressure: Option<f64>,
    pub clouds: Option<f64>,
    pub wave_height: Option<f64>,
    pub water_temp: Option<f64>,
    pub current_speed: Option<f64>,
    pub moon_phase: Option<f64>,
    /// -1 falling, 0 stable, 1 rising
    pub pressure_trend: Option<f64>,
}

impl WeatherObservation {
    pub const DEFAULT_TEMP: f64 = 15.0;
    pub const DEFAULT_WIND: f64 = 10.0;
    pub const DEFAULT_PRESSURE: f64 = 1013.0;
    pub const DEFAULT_CLOUDS: f64 = 50.0;
    pub const DEFAULT_WAVE_HEIGHT: f64 = 1.0;
    pub const DEFAULT_WATER_TEMP: f64 = 16.0;
    pub const DEFAULT_CURRENT_SPEED: f64 = 0.5;
    pub const DEFAULT_MOON_PHASE: f64 = 0.5;
    pub const DEFAULT_PRESSURE_TREND: f64 = 0.0;

    /// Decode the JSON-encoded weather string stored on an episode
    pub fn from_json(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A single recorded fishing outing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Episode {
    #[serde(default)]
    pub id: Option<i64>,
    /// Weather sub-fields, serialized as a JSON string
    #[serde(default)]
    pub weather_json: Option<String>,
    #[serde(default)]
    pub location_lat: Option<f64>,
    #[serde(default)]
    pub location_lon: Option<f64>,
    /// Creation time in epoch milliseconds
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub pesca_score_final: Option<f64>,
    #[serde(default)]
    pub user_feedback: Option<f64>,
}

impl Episode {
    /// Both halves of the blended label are present
    pub fn has_label(&self) -> bool {
        self.pesca_score_final.is_some() && self.user_feedback.is_some()
    }

    /// Location and timestamp needed for the geographic and temporal features
    pub fn has_context(&self) -> bool {
        self.location_lat.is_some() && self.location_lon.is_some() && self.created_at.is_some()
    }

    /// Decode the weather observation; an absent string is an empty observation
    pub fn weather(&self) -> std::result::Result<WeatherObservation, serde_json::Error> {
        match self.weather_json.as_deref() {
            Some(raw) if !raw.trim().is_empty() => WeatherObservation::from_json(raw),
            _ => Ok(WeatherObservation::default()),
        }
    }
}

/// Document produced by the episode export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeExport {
    pub episodes: Vec<Episode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
}

impl EpisodeExport {
    /// Load an export document from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PescaError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", path.display(), e),
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Write the document to disk, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weather_camel_case_fields() {
        let weather = WeatherObservation::from_json(
            r#"{"temp": 21.5, "waveHeight": 0.8, "waterTemp": 18, "pressureTrend": -1}"#,
        )
        .unwrap();
        assert_eq!(weather.temp, Some(21.5));
        assert_eq!(weather.wave_height, Some(0.8));
        assert_eq!(weather.water_temp, Some(18.0));
        assert_eq!(weather.pressure_trend, Some(-1.0));
        assert_eq!(weather.wind, None);
    }

    #[test]
    fn test_weather_null_is_missing() {
        let weather = WeatherObservation::from_json(r#"{"temp": null, "clouds": 20}"#).unwrap();
        assert_eq!(weather.temp, None);
        assert_eq!(weather.clouds, Some(20.0));
    }

    #[test]
    fn test_missing_weather_json_is_empty_observation() {
        let episode = Episode::default();
        assert_eq!(episode.weather().unwrap(), WeatherObservation::default());
    }

    #[test]
    fn test_malformed_weather_json_is_error() {
        let episode = Episode {
            weather_json: Some("{not json".to_string()),
            ..Default::default()
        };
        assert!(episode.weather().is_err());
    }

    #[test]
    fn test_export_ignores_unknown_columns() {
        let export = EpisodeExport::from_json(
            r#"{
                "episodes": [{
                    "id": 4,
                    "session_id": "abc",
                    "weather_json": "{\"temp\": 12}",
                    "location_lat": 44.1,
                    "location_lon": 9.8,
                    "created_at": 1718000000000,
                    "pesca_score_final": 6.5,
                    "user_feedback": null
                }],
                "count": 1,
                "exported_at": "2024-06-10T00:00:00Z"
            }"#,
        )
        .unwrap();

        assert_eq!(export.len(), 1);
        let episode = &export.episodes[0];
        assert_eq!(episode.pesca_score_final, Some(6.5));
        assert_eq!(episode.user_feedback, None);
        assert!(!episode.has_label());
        assert!(episode.has_context());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = EpisodeExport::load("/nonexistent/training_data.json").unwrap_err();
        assert!(matches!(err, PescaError::Io(_)));
    }
}
