//! Deterministic synthetic flight records.

use fd_frame::{CLASS_LEVELS, Dataset, FrameError, STOP_LEVELS, Schema, TIME_SLOT_LEVELS};
use fd_types::Scalar;

pub const AIRLINES: [(&str, &str); 6] = [
    ("SpiceJet", "SG"),
    ("AirAsia", "I5"),
    ("Vistara", "UK"),
    ("GO_FIRST", "G8"),
    ("Indigo", "6E"),
    ("Air_India", "AI"),
];

pub const CITIES: [&str; 6] = [
    "Delhi",
    "Mumbai",
    "Bangalore",
    "Kolkata",
    "Hyderabad",
    "Chennai",
];

pub const DEFAULT_SEED: u64 = 0x5eed_f11e;

/// 64-bit LCG (Knuth MMIX constants).
#[derive(Debug, Clone)]
pub struct Lcg(u64);

impl Lcg {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 32) as u32
    }

    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        (u64::from(self.next_u32()) % bound as u64) as usize
    }

    /// Uniform in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        f64::from(self.next_u32()) / (f64::from(u32::MAX) + 1.0)
    }
}

pub fn synthetic_flights(rows: usize) -> Result<Dataset, FrameError> {
    synthetic_flights_seeded(rows, DEFAULT_SEED)
}

/// `rows` plausible flight records; the same seed always yields the same
/// dataset.
pub fn synthetic_flights_seeded(rows: usize, seed: u64) -> Result<Dataset, FrameError> {
    let mut rng = Lcg::new(seed);
    let mut records = Vec::with_capacity(rows);

    for _ in 0..rows {
        let (airline, code) = AIRLINES[rng.below(AIRLINES.len())];
        let source = rng.below(CITIES.len());
        let destination = (source + 1 + rng.below(CITIES.len() - 1)) % CITIES.len();
        let departure = TIME_SLOT_LEVELS[rng.below(TIME_SLOT_LEVELS.len())];
        let arrival = TIME_SLOT_LEVELS[rng.below(TIME_SLOT_LEVELS.len())];
        let stops = rng.below(STOP_LEVELS.len());
        let class = if rng.below(10) < 7 { 0 } else { 1 };
        let days_left = 1 + rng.below(49) as i64;

        let duration = 1.0 + stops as f64 * 6.0 + rng.unit() * 8.0;
        let duration = (duration * 100.0).round() / 100.0;

        let mut price = 2_500.0 + duration * 250.0 + stops as f64 * 1_500.0;
        if class == 1 {
            price *= 5.0;
        }
        price *= 1.0 + (49 - days_left) as f64 / 60.0;
        price *= 0.85 + rng.unit() * 0.3;

        records.push(vec![
            Scalar::Utf8(airline.to_owned()),
            Scalar::Utf8(format!("{code}-{}", 100 + rng.below(900))),
            Scalar::Utf8(CITIES[source].to_owned()),
            Scalar::Utf8(departure.to_owned()),
            Scalar::Utf8(STOP_LEVELS[stops].to_owned()),
            Scalar::Utf8(arrival.to_owned()),
            Scalar::Utf8(CITIES[destination].to_owned()),
            Scalar::Utf8(CLASS_LEVELS[class].to_owned()),
            Scalar::Float64(duration),
            Scalar::Int64(days_left),
            Scalar::Int64(price.round() as i64),
        ]);
    }

    Dataset::from_rows(Schema::flights(), records)
}
