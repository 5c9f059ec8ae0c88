//! Chain statistics: split potential scale reduction and effective sample
//! size over sampler draws.

use ndarray::prelude::*;
use num_traits::Float;
use rustfft::{num_complex::Complex, FftPlanner};

/// Arithmetic mean.
pub fn mean<T: Float>(xs: &[T]) -> T {
    if xs.is_empty() {
        return T::nan();
    }
    let sum = xs.iter().fold(T::zero(), |acc, &x| acc + x);
    sum / T::from(xs.len()).unwrap()
}

/// Population variance (denominator `n`).
pub fn variance<T: Float>(xs: &[T]) -> T {
    if xs.is_empty() {
        return T::nan();
    }
    let m = mean(xs);
    let sum = xs
        .iter()
        .fold(T::zero(), |acc, &x| acc + (x - m) * (x - m));
    sum / T::from(xs.len()).unwrap()
}

/// Sample variance (denominator `n - 1`).
pub fn sample_variance<T: Float>(xs: &[T]) -> T {
    if xs.len() < 2 {
        return T::nan();
    }
    let m = mean(xs);
    let sum = xs
        .iter()
        .fold(T::zero(), |acc, &x| acc + (x - m) * (x - m));
    sum / T::from(xs.len() - 1).unwrap()
}

/// Linear-interpolation quantile of an ascending-sorted slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Splits each chain in half, yielding `2m` pseudo-chains of equal length.
///
/// Returns `None` when any chain is shorter than 4 draws.
fn split_halves(chains: &[&[f64]]) -> Option<Vec<Vec<f64>>> {
    if chains.is_empty() {
        return None;
    }
    let mut halves = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        if chain.len() < 4 {
            return None;
        }
        let mid = chain.len() / 2;
        halves.push(chain[..mid].to_vec());
        halves.push(chain[mid..].to_vec());
    }
    let min_len = halves.iter().map(|h| h.len()).min().unwrap_or(0);
    for half in &mut halves {
        half.truncate(min_len);
    }
    Some(halves)
}

/// Split R-hat for one parameter given per-chain draws.
///
/// Classic between/within variance ratio on half-chains:
/// `sqrt(((n-1)/n * W + B/n) / W)`. Returns NaN for degenerate input
/// (chains shorter than 4 draws, or vanishing within-chain variance).
pub fn split_rhat_param(chains: &[&[f64]]) -> f64 {
    let halves = match split_halves(chains) {
        Some(halves) => halves,
        None => return f64::NAN,
    };
    let m = halves.len() as f64;
    let n = halves[0].len() as f64;
    if n < 2.0 {
        return f64::NAN;
    }

    let means: Vec<f64> = halves.iter().map(|h| mean(h)).collect();
    let grand_mean = mean(&means);
    let b = means
        .iter()
        .map(|&x| (x - grand_mean).powi(2))
        .sum::<f64>()
        * n
        / (m - 1.0);
    let w = halves.iter().map(|h| sample_variance(h)).sum::<f64>() / m;

    if !w.is_finite() || w < 1e-300 {
        return f64::NAN;
    }
    let var_plus = (n - 1.0) / n * w + b / n;
    (var_plus / w).sqrt()
}

/// Effective sample size for one parameter given per-chain draws.
///
/// Autocovariances are computed per half-chain with an FFT, combined across
/// chains, and truncated with Geyer's initial monotone positive-pair-sum
/// rule. Degenerate variance yields the total draw count (the draws carry
/// no detectable autocorrelation); chains shorter than 4 draws yield 0.
pub fn ess_param(chains: &[&[f64]]) -> f64 {
    let halves = match split_halves(chains) {
        Some(halves) => halves,
        None => return 0.0,
    };
    let m = halves.len();
    let n = halves[0].len();
    let total = (m * n) as f64;
    if n < 2 {
        return 0.0;
    }

    let acovs: Vec<Vec<f64>> = halves.iter().map(|h| autocovariance(h)).collect();

    let n_f = n as f64;
    let m_f = m as f64;
    let chain_vars: Vec<f64> = acovs.iter().map(|a| a[0] * n_f / (n_f - 1.0)).collect();
    let w = mean(&chain_vars);
    let means: Vec<f64> = halves.iter().map(|h| mean(h)).collect();
    let b_over_n = if m > 1 { sample_variance(&means) } else { 0.0 };
    let var_plus = w * (n_f - 1.0) / n_f + b_over_n;

    if !var_plus.is_finite() || var_plus < 1e-300 {
        return total;
    }

    let mut rho = Vec::with_capacity(n - 1);
    for lag in 1..n {
        let acov_lag = acovs.iter().map(|a| a[lag]).sum::<f64>() / m_f;
        rho.push(1.0 - (w - acov_lag) / var_plus);
    }

    // Geyer: sum consecutive pairs while positive, enforcing monotone decay.
    let mut pair_sums = Vec::new();
    let mut i = 0;
    while i + 1 < rho.len() {
        let pair = rho[i] + rho[i + 1];
        if pair < 0.0 {
            break;
        }
        pair_sums.push(pair);
        i += 2;
    }
    for k in 1..pair_sums.len() {
        if pair_sums[k] > pair_sums[k - 1] {
            pair_sums[k] = pair_sums[k - 1];
        }
    }

    let tau = 1.0 + 2.0 * pair_sums.iter().sum::<f64>();
    if !tau.is_finite() || tau <= 0.0 {
        return total;
    }
    (total / tau).clamp(1.0, total)
}

/// Split R-hat and ESS per parameter over `[chain][draw][param]` draws.
pub fn split_rhat_ess(draws: ArrayView3<f64>) -> (Array1<f64>, Array1<f64>) {
    let n_params = draws.shape()[2];
    let mut rhat = Array1::<f64>::zeros(n_params);
    let mut ess = Array1::<f64>::zeros(n_params);
    for p in 0..n_params {
        let per_chain: Vec<Vec<f64>> = draws
            .axis_iter(Axis(0))
            .map(|chain| chain.column(p).to_vec())
            .collect();
        let views: Vec<&[f64]> = per_chain.iter().map(|c| c.as_slice()).collect();
        rhat[p] = split_rhat_param(&views);
        ess[p] = ess_param(&views);
    }
    (rhat, ess)
}

/// Autocovariance at all lags, FFT-accelerated, biased normalization `1/n`.
fn autocovariance(xs: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let m = mean(xs);
    let size = (2 * n).next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut buf: Vec<Complex<f64>> = xs
        .iter()
        .map(|&x| Complex::new(x - m, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();
    forward.process(&mut buf);
    for v in buf.iter_mut() {
        *v = *v * v.conj();
    }
    inverse.process(&mut buf);

    // rustfft leaves a factor of `size` from the round trip.
    buf[..n]
        .iter()
        .map(|c| c.re / size as f64 / n as f64)
        .collect()
}
