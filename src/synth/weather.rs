//! Synthetic weather table generation.
//!
//! Each row is built as a chain of conditional draws hanging off a synthesized
//! timestamp: timestamp → season → temperature/humidity → rain → condition →
//! wind/visibility/pressure. Defect injection happens inline, field by field,
//! so a corrupted upstream value (a nulled humidity, an outlier temperature)
//! flows into the downstream rules exactly as it would in a messy real feed.
//! Clean-value invariants therefore hold only before injection.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::config::GeneratorConfig;
use crate::synth::defects::{DefectInjector, Derived, FallbackReason};
use crate::synth::records::{Season, Visibility, WeatherCondition, WeatherRecord, CITY, WEATHER_ID_BASE};
use crate::synth::rng::RunRng;
use crate::synth::timestamp::{parse_flexible, synth_timestamp};
use crate::synth::{duplicate_tail, round2};

/// Textual garbage a broken visibility sensor can emit (~3% of rows).
const VISIBILITY_SENTINELS: [&str; 4] = ["unknown", "N/A", "error", "???"];

/// Probability that a visibility reading is a textual sentinel.
const VISIBILITY_SENTINEL_RATIO: f64 = 0.03;

// Documented normal ranges, used as `with_outliers` parameters.
const TEMPERATURE_RANGE: (f64, f64) = (-30.0, 60.0);
const HUMIDITY_RANGE: (i64, i64) = (-10, 150);
const RAIN_RANGE: (f64, f64) = (100.0, 200.0);
const WIND_RANGE: (f64, f64) = (200.0, 350.0);
const VISIBILITY_RANGE: (i64, i64) = (50_000, 120_000);
const PRESSURE_RANGE: (f64, f64) = (900.0, 1100.0);

/// Per-run audit counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeatherStats {
    pub base_rows: usize,
    pub duplicate_rows: usize,
    /// Rows whose season fell back to a random draw (bad or nulled timestamp).
    pub random_seasons: u64,
    /// Rows whose visibility was generated as a textual sentinel.
    pub sentinel_visibility: u64,
}

pub struct WeatherGenerator {
    config: GeneratorConfig,
    injector: DefectInjector,
}

impl WeatherGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let injector = DefectInjector::new(config.null_ratio, config.outlier_ratio);
        Self { config, injector }
    }

    /// Produce the ordered table plus its duplicate tail.
    pub fn generate(&self, rng: &mut RunRng) -> (Vec<WeatherRecord>, WeatherStats) {
        let n = self.config.rows;
        let mut rows = Vec::with_capacity(n + (n as f64 * self.config.duplicate_ratio) as usize);
        let mut stats = WeatherStats::default();

        for i in 0..n {
            rows.push(self.generate_row(rng, i, &mut stats));
        }
        stats.base_rows = n;

        let tail = duplicate_tail(rng, &rows, n, self.config.duplicate_ratio);
        stats.duplicate_rows = tail.len();
        rows.extend(tail);

        info!(
            rows = rows.len(),
            duplicates = stats.duplicate_rows,
            random_seasons = stats.random_seasons,
            sentinel_visibility = stats.sentinel_visibility,
            "weather table generated"
        );
        (rows, stats)
    }

    fn generate_row(&self, rng: &mut RunRng, index: usize, stats: &mut WeatherStats) -> WeatherRecord {
        let inj = &self.injector;
        let g = rng.general();

        let raw_ts = synth_timestamp(g, index, self.config.malformed_ratio);
        let date_time = inj.maybe_null(g, raw_ts);

        let season_derived = derive_season(g, date_time.as_deref());
        if season_derived.is_recovered() {
            stats.random_seasons += 1;
        }
        let season = inj.maybe_null(g, season_derived.value());

        let clean_temp = temperature_by_season(g, season);
        let shifted_temp =
            inj.with_outliers_f64(g, clean_temp, TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1);
        let temperature_c = inj.maybe_null(g, shifted_temp);

        let clean_humidity = humidity_by_season(g, season);
        let shifted_humidity =
            inj.with_outliers_i64(g, clean_humidity, HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);
        let humidity = inj.maybe_null(g, shifted_humidity);

        let clean_rain = rain_for_humidity(g, humidity);
        let shifted_rain = inj.with_outliers_f64(g, clean_rain, RAIN_RANGE.0, RAIN_RANGE.1);
        let rain_mm = inj.maybe_null(g, shifted_rain);

        let condition = condition_for(g, rain_mm, temperature_c);
        let weather_condition = inj.maybe_null(g, condition);

        let clean_wind = wind_for_condition(g, weather_condition);
        let shifted_wind = inj.with_outliers_f64(g, clean_wind, WIND_RANGE.0, WIND_RANGE.1);
        let wind_speed_kmh = inj.maybe_null(g, shifted_wind);

        let mut visibility = visibility_for_condition(g, weather_condition);
        if matches!(visibility, Visibility::Sentinel(_)) {
            stats.sentinel_visibility += 1;
        }
        // An outlier replaces the reading wholesale, sentinel or not.
        if inj.roll_outlier(g) {
            let shifted = inj.outlier_band_i64(g, VISIBILITY_RANGE.0, VISIBILITY_RANGE.1);
            visibility = Visibility::Meters(shifted);
        }
        let visibility_m = inj.maybe_null(g, visibility);

        let clean_pressure = pressure_for(g, weather_condition, temperature_c);
        let shifted_pressure =
            inj.with_outliers_f64(g, clean_pressure, PRESSURE_RANGE.0, PRESSURE_RANGE.1);
        let air_pressure_hpa = inj.maybe_null(g, shifted_pressure);

        let weather_id = inj.maybe_null(g, WEATHER_ID_BASE + index as i64);
        let city = inj.maybe_null(g, CITY.to_string());

        WeatherRecord {
            weather_id,
            date_time,
            city,
            season,
            temperature_c,
            humidity,
            rain_mm,
            weather_condition,
            wind_speed_kmh,
            visibility_m,
            air_pressure_hpa,
        }
    }
}

// =============================================================================
// FIELD RULES
// =============================================================================

/// Season from the timestamp month; a timestamp that is null or fails to parse
/// falls back to a uniformly random season. The random fallback (rather than a
/// null) is intentional and load-bearing for downstream consumers.
fn derive_season(rng: &mut ChaCha8Rng, raw: Option<&str>) -> Derived<Season> {
    let reason = match raw {
        None => FallbackReason::MissingInput,
        Some(s) => match parse_flexible(s) {
            Some(dt) => {
                use chrono::Datelike;
                return Derived::Clean(Season::from_month(dt.month()));
            }
            None => FallbackReason::UnparseableTimestamp,
        },
    };
    let pick = Season::ALL[rng.gen_range(0..Season::ALL.len())];
    Derived::Recovered(pick, reason)
}

fn temperature_by_season(rng: &mut ChaCha8Rng, season: Option<Season>) -> f64 {
    let (low, high) = match season {
        Some(Season::Winter) => (-5.0, 15.0),
        Some(Season::Spring) => (5.0, 20.0),
        Some(Season::Summer) => (10.0, 35.0),
        Some(Season::Autumn) => (5.0, 25.0),
        None => (0.0, 30.0),
    };
    round2(rng.gen_range(low..high))
}

fn humidity_by_season(rng: &mut ChaCha8Rng, season: Option<Season>) -> i64 {
    let (low, high) = match season {
        Some(Season::Winter) => (40, 90),
        Some(Season::Spring) => (30, 80),
        Some(Season::Summer) => (20, 70),
        Some(Season::Autumn) => (50, 100),
        None => (20, 100),
    };
    rng.gen_range(low..=high)
}

/// Rain conditioned on humidity: dry below 60%, otherwise it rains 30% of the
/// time, with the magnitude band picked by how humid it is.
fn rain_for_humidity(rng: &mut ChaCha8Rng, humidity: Option<i64>) -> f64 {
    let h = match humidity {
        Some(h) => h,
        None => return round2(rng.gen_range(0.0..20.0)),
    };
    if h < 60 {
        return 0.0;
    }
    if rng.gen::<f64>() > 0.3 {
        return 0.0;
    }
    if h < 80 {
        round2(rng.gen_range(1.0..15.0)) // light rain
    } else {
        round2(rng.gen_range(10.0..80.0)) // heavy rain
    }
}

/// Ordered rule cascade. The snow gate runs first and short-circuits: snow is
/// only ever considered at or below 5 °C.
fn condition_for(rng: &mut ChaCha8Rng, rain_mm: Option<f64>, temperature_c: Option<f64>) -> WeatherCondition {
    if let Some(t) = temperature_c {
        if t <= 5.0 && rng.gen::<f64>() < 0.4 {
            return WeatherCondition::Snow;
        }
    }

    let rain = match rain_mm {
        Some(r) => r,
        None => {
            return if rng.gen::<f64>() < 0.5 {
                WeatherCondition::Clear
            } else {
                WeatherCondition::Fog
            }
        }
    };

    if rain >= 50.0 {
        if rng.gen::<f64>() < 0.6 {
            WeatherCondition::Storm
        } else {
            WeatherCondition::Rain
        }
    } else if rain >= 25.0 {
        WeatherCondition::Rain
    } else if rain >= 10.0 {
        if rng.gen::<f64>() < 0.6 {
            WeatherCondition::Rain
        } else {
            WeatherCondition::Clear
        }
    } else if rain > 0.0 {
        if rng.gen::<f64>() < 0.5 {
            WeatherCondition::Clear
        } else {
            WeatherCondition::Fog
        }
    } else {
        WeatherCondition::Clear
    }
}

/// Storms bias wind toward a strong band, with a small chance of an extreme one.
fn wind_for_condition(rng: &mut ChaCha8Rng, condition: Option<WeatherCondition>) -> f64 {
    if condition == Some(WeatherCondition::Storm) {
        if rng.gen::<f64>() < 0.2 {
            return round2(rng.gen_range(100.0..150.0));
        }
        if rng.gen::<f64>() < 0.6 {
            return round2(rng.gen_range(50.0..80.0));
        }
    }
    round2(rng.gen_range(0.0..80.0))
}

fn visibility_for_condition(rng: &mut ChaCha8Rng, condition: Option<WeatherCondition>) -> Visibility {
    if rng.gen::<f64>() < VISIBILITY_SENTINEL_RATIO {
        let pick = VISIBILITY_SENTINELS[rng.gen_range(0..VISIBILITY_SENTINELS.len())];
        return Visibility::Sentinel(pick.to_string());
    }
    if condition.is_some_and(|c| c.is_adverse()) {
        if rng.gen::<f64>() < 0.15 {
            return Visibility::Meters(rng.gen_range(50..=1000)); // extreme low
        }
        if rng.gen::<f64>() < 0.6 {
            return Visibility::Meters(rng.gen_range(1000..=8000)); // poor to moderate
        }
    }
    Visibility::Meters(rng.gen_range(8000..=12000))
}

/// Pressure band driven primarily by condition, shifted by extreme temperature.
fn pressure_for(rng: &mut ChaCha8Rng, condition: Option<WeatherCondition>, temperature_c: Option<f64>) -> f64 {
    let (mut low, mut high) = (990.0f64, 1030.0f64);

    match condition {
        Some(WeatherCondition::Storm) => {
            low = rng.gen_range(950.0..970.0);
            high = rng.gen_range(980.0..1000.0);
        }
        Some(WeatherCondition::Rain) | Some(WeatherCondition::Snow) => {
            low = rng.gen_range(960.0..990.0);
            high = rng.gen_range(1000.0..1050.0);
        }
        _ => {}
    }

    if let Some(t) = temperature_c {
        if t > 30.0 {
            low -= 10.0;
            high -= 10.0;
        } else if t < 0.0 {
            low += 10.0;
            high += 10.0;
        }
    }

    round2(rng.gen_range(low..high))
}
