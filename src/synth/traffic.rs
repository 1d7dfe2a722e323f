//! Synthetic traffic table generation, conditioned on the weather table.
//!
//! The generator walks the complete, already-materialized weather table and
//! emits exactly one traffic row per weather row, in the same order. The
//! pairing is positional; the copied timestamp is what later makes the merge
//! key line up. Per-field derivations that depend on a weather value must
//! absorb whatever corruption that value carries — a malformed timestamp, a
//! nulled condition, a sentinel visibility — via a local fallback, never by
//! failing the row.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::config::GeneratorConfig;
use crate::synth::defects::{DefectInjector, Derived, FallbackReason};
use crate::synth::records::{
    CongestionLevel, District, RoadCondition, TrafficRecord, Visibility, WeatherCondition,
    WeatherRecord, CITY, TRAFFIC_ID_BASE,
};
use crate::synth::rng::RunRng;
use crate::synth::timestamp::hour_of;
use crate::synth::{duplicate_tail, round2};

/// Substitute when the paired weather visibility is not numeric.
const DEFAULT_VISIBILITY_M: i64 = 10_000;

/// Bounded sensor disagreement between the two visibility readings, meters.
const VISIBILITY_NOISE_M: i64 = 500;

const MIN_SPEED_KMH: f64 = 3.0;

// Outlier parameters per numeric field.
const VEHICLE_COUNT_RANGE: (i64, i64) = (20_000, 30_000);
const AVG_SPEED_RANGE: (f64, f64) = (-1.0, 500.0);
const ACCIDENT_RANGE: (i64, i64) = (20, 50);
const VISIBILITY_RANGE: (i64, i64) = (50_000, 120_000);

/// Weighted small-integer accident severities.
const ACCIDENT_CHOICES: [i64; 6] = [1, 1, 1, 2, 2, 3];

/// Per-run audit counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrafficStats {
    pub base_rows: usize,
    pub duplicate_rows: usize,
    /// Vehicle counts drawn from the wide fallback range (bad timestamp).
    pub fallback_vehicle_counts: u64,
    /// Speed bases drawn from the fallback range (nulled vehicle count).
    pub fallback_speed_bases: u64,
    /// Congestion levels defaulted to Low (nulled inputs).
    pub fallback_congestion: u64,
    /// Visibility readings defaulted (sentinel or nulled weather visibility).
    pub fallback_visibility: u64,
}

pub struct TrafficGenerator {
    config: GeneratorConfig,
    injector: DefectInjector,
}

impl TrafficGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let injector = DefectInjector::new(config.null_ratio, config.outlier_ratio);
        Self { config, injector }
    }

    /// Produce one traffic row per weather row, plus a duplicate tail sized
    /// from the weather table length.
    pub fn generate(&self, weather: &[WeatherRecord], rng: &mut RunRng) -> (Vec<TrafficRecord>, TrafficStats) {
        let n = weather.len();
        let mut rows = Vec::with_capacity(n + (n as f64 * self.config.duplicate_ratio) as usize);
        let mut stats = TrafficStats::default();

        for (i, weather_row) in weather.iter().enumerate() {
            rows.push(self.generate_row(rng, i, weather_row, &mut stats));
        }
        stats.base_rows = n;

        let tail = duplicate_tail(rng, &rows, n, self.config.duplicate_ratio);
        stats.duplicate_rows = tail.len();
        rows.extend(tail);

        info!(
            rows = rows.len(),
            duplicates = stats.duplicate_rows,
            fallback_vehicle_counts = stats.fallback_vehicle_counts,
            fallback_congestion = stats.fallback_congestion,
            fallback_visibility = stats.fallback_visibility,
            "traffic table generated"
        );
        (rows, stats)
    }

    fn generate_row(
        &self,
        rng: &mut RunRng,
        index: usize,
        weather: &WeatherRecord,
        stats: &mut TrafficStats,
    ) -> TrafficRecord {
        let inj = &self.injector;
        let g = rng.general();

        // Copied verbatim: this is the merge key anchor.
        let date_time = weather.date_time.clone();
        let weather_condition = weather.weather_condition;

        let area_pick = District::ALL[g.gen_range(0..District::ALL.len())];
        let area = inj.maybe_null(g, area_pick);

        let count_derived = vehicle_count_for(g, date_time.as_deref());
        if count_derived.is_recovered() {
            stats.fallback_vehicle_counts += 1;
        }
        let shifted_count = inj.with_outliers_i64(
            g,
            count_derived.value(),
            VEHICLE_COUNT_RANGE.0,
            VEHICLE_COUNT_RANGE.1,
        );
        let vehicle_count = inj.maybe_null(g, shifted_count);

        let road = road_condition_for(g, weather_condition);
        let road_condition = inj.maybe_null(g, road);

        let speed_derived = avg_speed_for(g, vehicle_count, weather_condition, road_condition);
        if speed_derived.is_recovered() {
            stats.fallback_speed_bases += 1;
        }
        let shifted_speed = inj.with_outliers_f64(
            g,
            speed_derived.value(),
            AVG_SPEED_RANGE.0,
            AVG_SPEED_RANGE.1,
        );
        let avg_speed_kmh = inj.maybe_null(g, shifted_speed);

        let congestion_derived = congestion_for(vehicle_count, avg_speed_kmh);
        if congestion_derived.is_recovered() {
            stats.fallback_congestion += 1;
        }
        let congestion_level = inj.maybe_null(g, congestion_derived.value());

        let accidents = accidents_for(g, weather_condition, congestion_level);
        let shifted_accidents =
            inj.with_outliers_i64(g, accidents, ACCIDENT_RANGE.0, ACCIDENT_RANGE.1);
        let accident_count = inj.maybe_null(g, shifted_accidents);

        let vis_derived = visibility_for(g, weather.visibility_m.as_ref());
        if vis_derived.is_recovered() {
            stats.fallback_visibility += 1;
        }
        let shifted_vis = inj.with_outliers_i64(
            g,
            vis_derived.value(),
            VISIBILITY_RANGE.0,
            VISIBILITY_RANGE.1,
        );
        let visibility_m = inj.maybe_null(g, shifted_vis);

        let traffic_id = inj.maybe_null(g, TRAFFIC_ID_BASE + index as i64);
        let city = inj.maybe_null(g, CITY.to_string());

        TrafficRecord {
            traffic_id,
            date_time,
            city,
            area,
            vehicle_count,
            road_condition,
            avg_speed_kmh,
            congestion_level,
            accident_count,
            visibility_m,
        }
    }
}

// =============================================================================
// FIELD RULES
// =============================================================================

/// Vehicle count conditioned on the hour parsed out of the weather timestamp.
/// Rush hours 07-09 and 16-19 get the high band, late night 00-05 the low
/// band. A timestamp that is null or unparseable silently falls back to a
/// wide unconditioned range.
fn vehicle_count_for(rng: &mut ChaCha8Rng, raw_ts: Option<&str>) -> Derived<i64> {
    let hour = match raw_ts {
        None => {
            let v = rng.gen_range(100..=3000);
            return Derived::Recovered(v, FallbackReason::MissingInput);
        }
        Some(s) => match hour_of(s) {
            Some(h) => h,
            None => {
                let v = rng.gen_range(100..=3000);
                return Derived::Recovered(v, FallbackReason::UnparseableTimestamp);
            }
        },
    };
    let v = if (7..=9).contains(&hour) || (16..=19).contains(&hour) {
        rng.gen_range(2000..=5000)
    } else if hour <= 5 {
        rng.gen_range(0..=500)
    } else {
        rng.gen_range(800..=2500)
    };
    Derived::Clean(v)
}

/// Snow forces snowy roads, rain or storm forces wet ones; otherwise a small
/// residual chance of damage.
fn road_condition_for(rng: &mut ChaCha8Rng, weather: Option<WeatherCondition>) -> RoadCondition {
    match weather {
        Some(WeatherCondition::Snow) => return RoadCondition::Snowy,
        Some(WeatherCondition::Rain) | Some(WeatherCondition::Storm) => return RoadCondition::Wet,
        _ => {}
    }
    if rng.gen::<f64>() < 0.05 {
        RoadCondition::Damaged
    } else {
        RoadCondition::Dry
    }
}

/// Base speed from the vehicle-count band, decremented for adverse weather and
/// damaged roads, jittered, floored at the minimum.
fn avg_speed_for(
    rng: &mut ChaCha8Rng,
    vehicle_count: Option<i64>,
    weather: Option<WeatherCondition>,
    road: Option<RoadCondition>,
) -> Derived<f64> {
    let (mut speed, recovered) = match vehicle_count {
        Some(c) if c > 3000 => (round2(rng.gen_range(10.0..30.0)), false),
        Some(c) if c > 1500 => (round2(rng.gen_range(30.0..50.0)), false),
        Some(_) => (round2(rng.gen_range(50.0..90.0)), false),
        None => (round2(rng.gen_range(60.0..90.0)), true),
    };

    match weather {
        Some(WeatherCondition::Rain) | Some(WeatherCondition::Snow) | Some(WeatherCondition::Storm) => {
            speed -= 15.0;
        }
        Some(WeatherCondition::Fog) => speed -= 10.0,
        _ => {}
    }
    if road == Some(RoadCondition::Damaged) {
        speed -= 20.0;
    }

    speed += rng.gen_range(-10.0..10.0);
    let speed = round2(speed).max(MIN_SPEED_KMH);

    if recovered {
        Derived::Recovered(speed, FallbackReason::MissingInput)
    } else {
        Derived::Clean(speed)
    }
}

/// Deterministic thresholds, checked in rule order: a count above the High
/// threshold decides on its own, even when the speed is missing. Every later
/// comparison needs both inputs; a null there defaults the level to Low.
pub(super) fn congestion_for(
    vehicle_count: Option<i64>,
    avg_speed: Option<f64>,
) -> Derived<CongestionLevel> {
    if vehicle_count.is_some_and(|c| c > 3500) {
        return Derived::Clean(CongestionLevel::High);
    }
    let (count, speed) = match (vehicle_count, avg_speed) {
        (Some(c), Some(s)) => (c, s),
        _ => return Derived::Recovered(CongestionLevel::Low, FallbackReason::MissingInput),
    };
    let level = if speed < 15.0 {
        CongestionLevel::High
    } else if count > 1500 || speed < 35.0 {
        CongestionLevel::Medium
    } else {
        CongestionLevel::Low
    };
    Derived::Clean(level)
}

/// Accident probability: 0.05 base, +0.15 under adverse weather, +0.10 under
/// High congestion; severity from a weighted small-integer distribution.
fn accidents_for(
    rng: &mut ChaCha8Rng,
    weather: Option<WeatherCondition>,
    congestion: Option<CongestionLevel>,
) -> i64 {
    let mut prob = 0.05;
    if weather.is_some_and(|w| w.is_adverse()) {
        prob += 0.15;
    }
    if congestion == Some(CongestionLevel::High) {
        prob += 0.10;
    }
    if rng.gen::<f64>() < prob {
        ACCIDENT_CHOICES[rng.gen_range(0..ACCIDENT_CHOICES.len())]
    } else {
        0
    }
}

/// The traffic sensor re-reads visibility near the weather station; bounded
/// signed noise models the disagreement. Non-numeric weather readings fall
/// back to a fixed default rather than propagating.
fn visibility_for(rng: &mut ChaCha8Rng, weather_vis: Option<&Visibility>) -> Derived<i64> {
    match weather_vis.and_then(|v| v.meters()) {
        Some(base) => {
            let noise = rng.gen_range(-VISIBILITY_NOISE_M..=VISIBILITY_NOISE_M);
            Derived::Clean((base + noise).max(0))
        }
        None => {
            let reason = match weather_vis {
                Some(Visibility::Sentinel(_)) => FallbackReason::NonNumericVisibility,
                _ => FallbackReason::MissingInput,
            };
            Derived::Recovered(DEFAULT_VISIBILITY_M, reason)
        }
    }
}
