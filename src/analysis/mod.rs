/// Aggregation of cleaned observations.
///
/// Submodules:
/// - `monthly`: per (year, month) mean of daily temperature extremes.

pub mod monthly;

pub use monthly::{aggregate, monthly_averages, round_half_even};
