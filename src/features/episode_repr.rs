//! Fixed feature vector extracted from a fishing episode
//!
//! The order of the fields is shared with the scaler document and the model
//! input, so it must never change between training and inference.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::data::episode::{Episode, WeatherObservation};
use crate::{PescaError, Result};

/// Feature names, in model input order
pub const FEATURE_NAMES: [&str; EpisodeFeatures::DIM] = [
    "temperature",
    "wind_speed",
    "pressure",
    "clouds",
    "wave_height",
    "water_temp",
    "current_speed",
    "moon_phase",
    "pressure_trend",
    "latitude",
    "longitude",
    "hour",
    "day_of_week",
    "month",
];

/// Numeric representation of one episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeFeatures {
    // Atmospheric
    pub temperature: f64,
    pub wind_speed: f64,
    pub pressure: f64,
    pub clouds: f64,
    // Marine
    pub wave_height: f64,
    pub water_temp: f64,
    pub current_speed: f64,
    // Astronomical
    pub moon_phase: f64,
    /// -1, 0 or 1
    pub pressure_trend: f64,
    // Geographic
    pub latitude: f64,
    pub longitude: f64,
    // Temporal (UTC)
    /// 0-23
    pub hour: f64,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: f64,
    /// 1-12
    pub month: f64,
}

impl EpisodeFeatures {
    /// Dimension of feature vector
    pub const DIM: usize = 14;

    /// Build features from weather, location and time
    pub fn from_conditions(
        weather: &WeatherObservation,
        latitude: f64,
        longitude: f64,
        at: DateTime<Utc>,
    ) -> Self {
        EpisodeFeatures {
            temperature: weather.temp.unwrap_or(WeatherObservation::DEFAULT_TEMP),
            wind_speed: weather.wind.unwrap_or(WeatherObservation::DEFAULT_WIND),
            pressure: weather.pressure.unwrap_or(WeatherObservation::DEFAULT_PRESSURE),
            clouds: weather.clouds.unwrap_or(WeatherObservation::DEFAULT_CLOUDS),
            wave_height: weather
                .wave_height
                .unwrap_or(WeatherObservation::DEFAULT_WAVE_HEIGHT),
            water_temp: weather
                .water_temp
                .unwrap_or(WeatherObservation::DEFAULT_WATER_TEMP),
            current_speed: weather
                .current_speed
                .unwrap_or(WeatherObservation::DEFAULT_CURRENT_SPEED),
            moon_phase: weather
                .moon_phase
                .unwrap_or(WeatherObservation::DEFAULT_MOON_PHASE),
            pressure_trend: weather
                .pressure_trend
                .unwrap_or(WeatherObservation::DEFAULT_PRESSURE_TREND),
            latitude,
            longitude,
            hour: at.hour() as f64,
            day_of_week: at.weekday().num_days_from_monday() as f64,
            month: at.month() as f64,
        }
    }

    /// Extract features from an exported episode
    ///
    /// `index` is the position of the episode in the export and is only used
    /// for error reporting.
    pub fn from_episode(episode: &Episode, index: usize) -> Result<Self> {
        let invalid = |message: String| PescaError::InvalidEpisode { index, message };

        let weather = episode
            .weather()
            .map_err(|e| invalid(format!("malformed weather_json: {}", e)))?;
        let (Some(latitude), Some(longitude), Some(created_at)) =
            (episode.location_lat, episode.location_lon, episode.created_at)
        else {
            return Err(invalid("missing location or timestamp".to_string()));
        };
        let at = timestamp_from_millis(created_at)
            .ok_or_else(|| invalid(format!("timestamp out of range: {}", created_at)))?;

        Ok(Self::from_conditions(&weather, latitude, longitude, at))
    }

    /// Feature names as owned strings, in vector order
    pub fn names() -> Vec<String> {
        FEATURE_NAMES.iter().map(|n| n.to_string()).collect()
    }

    /// Convert to a flat vector
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.temperature,
            self.wind_speed,
            self.pressure,
            self.clouds,
            self.wave_height,
            self.water_temp,
            self.current_speed,
            self.moon_phase,
            self.pressure_trend,
            self.latitude,
            self.longitude,
            self.hour,
            self.day_of_week,
            self.month,
        ]
    }
}

/// Convert epoch milliseconds to a UTC timestamp
pub fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-06-15 (Saturday) 05:30:00 UTC
    const SATURDAY_DAWN_MS: i64 = 1_718_429_400_000;

    fn episode_with_weather(weather_json: &str) -> Episode {
        Episode {
            id: Some(1),
            weather_json: Some(weather_json.to_string()),
            location_lat: Some(44.4),
            location_lon: Some(8.9),
            created_at: Some(SATURDAY_DAWN_MS),
            pesca_score_final: Some(7.0),
            user_feedback: Some(4.0),
        }
    }

    #[test]
    fn test_defaults_for_missing_weather() {
        let features = EpisodeFeatures::from_episode(&episode_with_weather("{}"), 0).unwrap();
        assert_eq!(features.temperature, 15.0);
        assert_eq!(features.wind_speed, 10.0);
        assert_eq!(features.pressure, 1013.0);
        assert_eq!(features.clouds, 50.0);
        assert_eq!(features.wave_height, 1.0);
        assert_eq!(features.water_temp, 16.0);
        assert_eq!(features.current_speed, 0.5);
        assert_eq!(features.moon_phase, 0.5);
        assert_eq!(features.pressure_trend, 0.0);
    }

    #[test]
    fn test_weather_values_are_used() {
        let features = EpisodeFeatures::from_episode(
            &episode_with_weather(r#"{"temp": 22, "wind": 3.5, "moonPhase": 0.9}"#),
            0,
        )
        .unwrap();
        assert_eq!(features.temperature, 22.0);
        assert_eq!(features.wind_speed, 3.5);
        assert_eq!(features.moon_phase, 0.9);
    }

    #[test]
    fn test_temporal_fields() {
        let features = EpisodeFeatures::from_episode(&episode_with_weather("{}"), 0).unwrap();
        assert_eq!(features.hour, 5.0);
        assert_eq!(features.day_of_week, 5.0);
        assert_eq!(features.month, 6.0);
        assert_eq!(features.latitude, 44.4);
        assert_eq!(features.longitude, 8.9);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let episode = episode_with_weather(r#"{"temp": 18.25, "clouds": 80}"#);
        let first = EpisodeFeatures::from_episode(&episode, 0).unwrap().to_vec();
        let second = EpisodeFeatures::from_episode(&episode, 0).unwrap().to_vec();

        let first_bits: Vec<u64> = first.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn test_vector_order_matches_names() {
        let features = EpisodeFeatures::from_episode(&episode_with_weather("{}"), 0).unwrap();
        let vec = features.to_vec();
        assert_eq!(vec.len(), EpisodeFeatures::DIM);
        assert_eq!(EpisodeFeatures::names().len(), EpisodeFeatures::DIM);
        assert_eq!(FEATURE_NAMES[2], "pressure");
        assert_eq!(vec[2], 1013.0);
        assert_eq!(FEATURE_NAMES[13], "month");
        assert_eq!(vec[13], 6.0);
    }

    #[test]
    fn test_missing_location_is_invalid() {
        let mut episode = episode_with_weather("{}");
        episode.location_lat = None;
        let err = EpisodeFeatures::from_episode(&episode, 3).unwrap_err();
        assert!(matches!(err, PescaError::InvalidEpisode { index: 3, .. }));
    }
}
