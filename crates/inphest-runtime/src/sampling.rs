//! Random draws shared by the event driver and cladogenesis.

use rand::Rng;
use rand_distr::{Distribution, Exp};

use inphest_core::types::SimTime;

/// Draw an index with probability proportional to `weights`.
///
/// Non-finite and non-positive weights never win. Returns `None` when no
/// weight is positive.
pub fn weighted_index<R: Rng + ?Sized>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    let usable = |w: f64| w.is_finite() && w > 0.0;
    let total: f64 = weights.iter().copied().filter(|w| usable(*w)).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let u = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for (i, w) in weights.iter().copied().enumerate() {
        if !usable(w) {
            continue;
        }
        cumulative += w;
        last = Some(i);
        if u < cumulative {
            return Some(i);
        }
    }
    // rounding can leave u just above the final cumulative sum
    last
}

/// Waiting time to the next event of a process with total rate
/// `total_rate`. Infinite when nothing can happen.
pub fn waiting_time<R: Rng + ?Sized>(rng: &mut R, total_rate: f64) -> SimTime {
    if !total_rate.is_finite() || total_rate <= 0.0 {
        return f64::INFINITY;
    }
    match Exp::new(total_rate) {
        Ok(exp) => exp.sample(rng),
        Err(_) => f64::INFINITY,
    }
}
