//! Synthetic episodes shared by unit tests

use super::episode::{Episode, EpisodeExport};

/// 2024-06-01 00:00:00 UTC
const START_MS: i64 = 1_717_200_000_000;
const HOUR_MS: i64 = 3_600_000;

/// Build `n` labelled episodes whose score depends on wind and temperature
pub fn synthetic_episodes(n: usize) -> Vec<Episode> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let temp = 10.0 + (t * 0.37).sin() * 8.0;
            let wind = 5.0 + (i % 17) as f64;
            let clouds = ((i * 13) % 100) as f64;
            let score = (10.0 - wind * 0.4 + temp * 0.2).clamp(0.0, 10.0);
            let feedback = ((i % 5) + 1) as f64;
            let weather = format!(
                r#"{{"temp": {:.3}, "wind": {:.1}, "clouds": {:.0}, "pressureTrend": {}}}"#,
                temp,
                wind,
                clouds,
                (i % 3) as i64 - 1
            );
            Episode {
                id: Some(i as i64 + 1),
                weather_json: Some(weather),
                location_lat: Some(44.0 + (i % 7) as f64 * 0.1),
                location_lon: Some(8.5 + (i % 11) as f64 * 0.05),
                created_at: Some(START_MS + i as i64 * 7 * HOUR_MS),
                pesca_score_final: Some(score),
                user_feedback: Some(feedback),
            }
        })
        .collect()
}

pub fn synthetic_export(n: usize) -> EpisodeExport {
    let episodes = synthetic_episodes(n);
    EpisodeExport {
        count: Some(episodes.len()),
        episodes,
        exported_at: None,
    }
}
