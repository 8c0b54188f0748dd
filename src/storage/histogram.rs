//! Numerical bucket-interval algorithm (spec section 4.2) and the `Histogram`
//! shape returned by `fetch_variable_summary` / the result-histogram queries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Histogram {
    Numerical {
        buckets: Vec<Bucket>,
        interval: f64,
        min: f64,
        max: f64,
    },
    Categorical {
        buckets: Vec<Bucket>,
    },
    /// `NoData` extrema result (spec §7): an empty histogram with an
    /// explicit empty-extrema marker rather than an error.
    Empty,
}

/// Chooses a "human" bucket interval from `{1,2,5}×10^k` for the range
/// `[min, max]`, per the algorithm in spec section 4.2:
///
/// `raw = (max-min)/50`, `p = floor(log10(raw))`, `s = raw/10^p`,
/// `snap = 2 if s<=2 else 5 if s<=5 else 10`, interval `= snap·10^p`.
///
/// Note the snap set is nominally `{1,2,5}` but the cascade only ever
/// chooses 2, 5, or 10 (10·10^p == 1·10^(p+1)), which keeps the comparison
/// ladder total without a branch for `s<=1`.
pub fn snap_interval(min: f64, max: f64) -> f64 {
    debug_assert!(min < max, "snap_interval requires min < max");
    let raw = (max - min) / 50.0;
    let p = raw.log10().floor();
    let scale = 10f64.powf(p);
    let s = raw / scale;
    let snap = if s <= 2.0 {
        2.0
    } else if s <= 5.0 {
        5.0
    } else {
        10.0
    };
    snap * scale
}

/// Computes `(bucket_min, bucket_max, bucket_count)` for a numerical
/// histogram domain, given the chosen interval. Floors/ceils the domain to a
/// multiple of `interval`; when the domain straddles zero, walks outward
/// from zero in `interval` steps so a bucket boundary lands exactly on zero.
pub fn bucket_domain(min: f64, max: f64, interval: f64) -> (f64, f64, u32) {
    let (bucket_min, bucket_max) = if min < 0.0 && max > 0.0 {
        let steps_down = (min / interval).abs().ceil();
        let steps_up = (max / interval).ceil();
        (-steps_down * interval, steps_up * interval)
    } else {
        ((min / interval).floor() * interval, (max / interval).ceil() * interval)
    };
    let count = (((bucket_max - bucket_min) / interval).round() as u32).max(1);
    (bucket_min, bucket_max, count)
}
