/*!
Convergence diagnostics for sampler output.

Five independent checks over a [`RunResult`], each returning a
[`Verdict`] — a boolean "problem detected" flag, a human-readable message,
and a list of structured [`DiagRecord`] observations for the offending
chains or parameters. [`check_all_diagnostics`] runs all five in a fixed
order and aggregates them. The checks are pure functions of the run result:
they perform no I/O, so rendering the records is entirely the caller's
business.

These tests are motivated by the Stan pystan-workflow case study:
<https://mc-stan.org/users/documentation/case-studies/pystan_workflow.html>

- [`check_div`]: how many transitions ended with a divergence
- [`check_treedepth`]: how many transitions saturated the tree depth limit
- [`check_energy`]: energy Bayesian fraction of missing information per chain
- [`check_n_eff`]: effective sample size per iteration
- [`check_rhat`]: potential scale reduction factors
- [`partition_div`]: split a parameter trace by divergence flag
*/

use crate::error::{Error, Result};
use crate::fit::{RunResult, LP_NAME};
use crate::stats;

/// E-BFMI below this value flags a chain.
const E_BFMI_MIN: f64 = 0.2;
/// `n_eff / iter` below this value flags a parameter.
const N_EFF_RATIO_MIN: f64 = 0.001;
/// R-hat above this value flags a parameter (exactly this value passes).
const RHAT_MAX: f64 = 1.1;

/// Severity of a single diagnostic observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

/// One structured observation produced by a check: which chain or parameter
/// misbehaved, and the offending value.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagRecord {
    pub severity: Severity,
    /// `"chain 2"` or a parameter name.
    pub subject: String,
    pub value: f64,
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// True when the check detected a problem.
    pub flagged: bool,
    pub message: String,
    pub records: Vec<DiagRecord>,
}

/// Aggregate outcome of [`check_all_diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// OR of the five check flags.
    pub flagged: bool,
    /// The five messages, newline-joined in fixed order: n_eff, rhat,
    /// divergence, treedepth, energy.
    pub message: String,
    pub records: Vec<DiagRecord>,
}

fn warning(subject: String, value: f64) -> DiagRecord {
    DiagRecord {
        severity: Severity::Warning,
        subject,
        value,
    }
}

/// Checks how many post-warm-up transitions ended with a divergence.
pub fn check_div(fit: &RunResult) -> Verdict {
    let params = fit.sampler_params(false);
    let total: usize = params.iter().map(|p| p.divergent.len()).sum();
    let n = params
        .iter()
        .flat_map(|p| p.divergent.iter())
        .filter(|&&d| d)
        .count();
    let pct = if total > 0 {
        100.0 * n as f64 / total as f64
    } else {
        0.0
    };

    let mut message = format!("{n} of {total} iterations ended with a divergence ({pct}%).");
    if n > 0 {
        message.push_str(" Try running with larger adapt_delta to remove the divergences.");
    }
    Verdict {
        flagged: n > 0,
        message,
        records: Vec::new(),
    }
}

/// Checks how many post-warm-up transitions saturated the maximum tree depth.
///
/// A transition ends prematurely when its tree reaches `max_depth`; only
/// iterations whose recorded depth equals `max_depth` exactly count.
pub fn check_treedepth(fit: &RunResult, max_depth: usize) -> Verdict {
    let params = fit.sampler_params(false);
    let total: usize = params.iter().map(|p| p.treedepth.len()).sum();
    let n = params
        .iter()
        .flat_map(|p| p.treedepth.iter())
        .filter(|&&d| d as usize == max_depth)
        .count();
    let pct = if total > 0 {
        100.0 * n as f64 / total as f64
    } else {
        0.0
    };

    let mut message = format!(
        "{n} of {total} iterations saturated the maximum tree depth of {max_depth}. ({pct}%)"
    );
    if n > 0 {
        message.push_str(" Run again with max_depth set to a larger value to avoid saturation.");
    }
    Verdict {
        flagged: n > 0,
        message,
        records: Vec::new(),
    }
}

/// Checks the energy Bayesian fraction of missing information (E-BFMI).
///
/// Per chain: mean squared successive difference of the energy trace over
/// its variance. Ratios below 0.2 flag the chain. An energy trace with
/// fewer than two points or zero variance cannot have explored the energy
/// distribution and is treated as pathological.
pub fn check_energy(fit: &RunResult) -> Verdict {
    let params = fit.sampler_params(false);
    let mut records = Vec::new();
    for (chain_num, p) in params.iter().enumerate() {
        let energies = &p.energy;
        if energies.len() < 2 {
            records.push(warning(format!("chain {chain_num}"), f64::NAN));
            continue;
        }
        let numer = energies
            .windows(2)
            .map(|w| (w[1] - w[0]).powi(2))
            .sum::<f64>()
            / energies.len() as f64;
        let denom = stats::variance(energies);
        if !denom.is_finite() || denom <= 0.0 {
            records.push(warning(format!("chain {chain_num}"), f64::NAN));
            continue;
        }
        let ratio = numer / denom;
        if ratio < E_BFMI_MIN {
            records.push(warning(format!("chain {chain_num}"), ratio));
        }
    }

    if records.is_empty() {
        Verdict {
            flagged: false,
            message: "E-BFMI indicated no pathological behavior.".to_string(),
            records,
        }
    } else {
        Verdict {
            flagged: true,
            message: "E-BFMI below 0.2 indicates you may need to reparameterize your model."
                .to_string(),
            records,
        }
    }
}

fn n_eff_ratio_flagged(ratio: f64) -> bool {
    ratio < N_EFF_RATIO_MIN
}

/// Checks the effective sample size per post-warm-up iteration.
///
/// The iteration count is the length of the combined `lp__` trace; a run
/// with zero post-warm-up iterations flags every parameter.
pub fn check_n_eff(fit: &RunResult) -> Verdict {
    let summary = fit.summary(&[0.5]);
    let n_iter = fit
        .extract(LP_NAME)
        .map(|lp| lp.len())
        .unwrap_or(0);

    let mut records = Vec::new();
    for row in &summary.rows {
        let ratio = if n_iter > 0 {
            row.n_eff / n_iter as f64
        } else {
            0.0
        };
        if n_eff_ratio_flagged(ratio) {
            records.push(warning(row.name.clone(), ratio));
        }
    }

    if records.is_empty() {
        Verdict {
            flagged: false,
            message: "n_eff / iter looks reasonable for all parameters.".to_string(),
            records,
        }
    } else {
        Verdict {
            flagged: true,
            message: "  n_eff / iter below 0.001 indicates that the effective sample size has \
                      likely been overestimated."
                .to_string(),
            records,
        }
    }
}

fn rhat_flagged(rhat: f64) -> bool {
    rhat > RHAT_MAX || rhat.is_nan() || rhat.is_infinite()
}

/// Checks the potential scale reduction factors.
///
/// A parameter is flagged when its R-hat exceeds 1.1, or is NaN or
/// infinite; exactly 1.1 passes.
pub fn check_rhat(fit: &RunResult) -> Verdict {
    let summary = fit.summary(&[0.5]);
    let mut records = Vec::new();
    for row in &summary.rows {
        if rhat_flagged(row.rhat) {
            records.push(warning(row.name.clone(), row.rhat));
        }
    }

    if records.is_empty() {
        Verdict {
            flagged: false,
            message: "Rhat looks reasonable for all parameters.".to_string(),
            records,
        }
    } else {
        Verdict {
            flagged: true,
            message: "Rhat above 1.1 indicates that the chains very likely have not mixed."
                .to_string(),
            records,
        }
    }
}

/// Runs all five checks and aggregates them.
///
/// Check order is fixed — n_eff, rhat, divergence, treedepth, energy — and
/// the returned message joins the five messages with newlines in exactly
/// that order, so report output is reproducible.
pub fn check_all_diagnostics(fit: &RunResult, max_depth: usize) -> Report {
    let n_eff = check_n_eff(fit);
    let rhat = check_rhat(fit);
    let div = check_div(fit);
    let treedepth = check_treedepth(fit, max_depth);
    let energy = check_energy(fit);

    let flagged =
        n_eff.flagged || rhat.flagged || div.flagged || treedepth.flagged || energy.flagged;
    let message = [
        n_eff.message,
        rhat.message,
        div.message,
        treedepth.message,
        energy.message,
    ]
    .join("\n");
    let records = [
        n_eff.records,
        rhat.records,
        div.records,
        treedepth.records,
        energy.records,
    ]
    .concat();

    Report {
        flagged,
        message,
        records,
    }
}

/// Splits a parameter's trace into non-divergent and divergent transitions.
///
/// Per chain, the warm-up prefix (sized by counting `is_sample == false`
/// entries) is dropped from both the divergence trace and the parameter
/// trace, then the parameter values are partitioned by the corresponding
/// flag, preserving order; chains concatenate in order. Not a check — a
/// pure data-reshaping utility for divergence scatter plots.
pub fn partition_div(fit: &RunResult, parameter_name: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let index = if parameter_name == LP_NAME {
        None
    } else {
        Some(
            fit.param_index(parameter_name)
                .ok_or_else(|| Error::UnknownParameter(parameter_name.to_string()))?,
        )
    };

    let mut nondivergent = Vec::new();
    let mut divergent = Vec::new();
    for chain in &fit.chains {
        let warmup = chain.warmup_len();
        let flags = &chain.divergent[warmup..];
        let values: Vec<f64> = match index {
            Some(p) => chain.draws[warmup..].iter().map(|d| d[p]).collect(),
            None => chain.lp[warmup..].to_vec(),
        };
        for (&flag, &value) in flags.iter().zip(values.iter()) {
            if flag {
                divergent.push(value);
            } else {
                nondivergent.push(value);
            }
        }
    }
    Ok((nondivergent, divergent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::ChainTrace;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn chain_from(
        values: Vec<f64>,
        divergent: Vec<bool>,
        treedepth: Vec<u32>,
        energy: Vec<f64>,
        warmup: usize,
    ) -> ChainTrace {
        let n = values.len();
        assert_eq!(divergent.len(), n);
        let is_sample = (0..n).map(|i| i >= warmup).collect();
        ChainTrace {
            draws: values.iter().map(|&v| vec![v]).collect(),
            lp: values.iter().map(|&v| -v * v).collect(),
            divergent,
            treedepth,
            energy,
            is_sample,
        }
    }

    fn result_from(chains: Vec<ChainTrace>) -> RunResult {
        RunResult {
            engine: "nuts".to_string(),
            param_names: vec!["mu".to_string()],
            chains,
            seed: 0,
            thin: 1,
            max_depth: 10,
        }
    }

    /// A well-behaved chain: noisy values, moderate depths, noisy energy.
    fn healthy_chain(seed: u64, n: usize, warmup: usize) -> ChainTrace {
        let mut rng = SmallRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let values: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
        let energy: Vec<f64> = (0..n).map(|_| normal.sample(&mut rng)).collect();
        chain_from(values, vec![false; n], vec![3; n], energy, warmup)
    }

    #[test]
    fn test_check_div_clean_run() {
        let fit = result_from(vec![healthy_chain(1, 104, 4), healthy_chain(2, 104, 4)]);
        let verdict = check_div(&fit);
        assert!(!verdict.flagged);
        assert!(
            verdict.message.contains("0 of 200 iterations"),
            "message was: {}",
            verdict.message
        );
        assert!(!verdict.message.contains("adapt_delta"));
    }

    #[test]
    fn test_check_div_all_divergent_is_100_percent() {
        let n = 20;
        let chain = chain_from(vec![0.5; n], vec![true; n], vec![3; n], vec![1.0; n], 0);
        let verdict = check_div(&result_from(vec![chain]));
        assert!(verdict.flagged);
        assert!(
            verdict.message.contains("(100%)"),
            "message was: {}",
            verdict.message
        );
        assert!(verdict.message.contains("adapt_delta"));
    }

    #[test]
    fn test_check_treedepth_counts_only_exact_saturation() {
        let depths = vec![9, 10, 11, 10, 3];
        let n = depths.len();
        let chain = chain_from(
            vec![0.0; n],
            vec![false; n],
            depths,
            vec![0.0; n],
            0,
        );
        let verdict = check_treedepth(&result_from(vec![chain]), 10);
        assert!(verdict.flagged);
        assert!(
            verdict.message.contains("2 of 5 iterations"),
            "message was: {}",
            verdict.message
        );
        assert!(verdict.message.contains("tree depth of 10"));
        assert!(verdict.message.contains("max_depth"));
    }

    #[test]
    fn test_check_treedepth_clean_run() {
        let fit = result_from(vec![healthy_chain(3, 50, 0)]);
        let verdict = check_treedepth(&fit, 10);
        assert!(!verdict.flagged);
        assert!(!verdict.message.contains("max_depth set to a larger value"));
    }

    #[test]
    fn test_check_energy_flag_iff_ratio_below_threshold() {
        // Alternating energies: big successive differences, healthy ratio.
        let n = 100;
        let lively: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { 2.0 }).collect();
        let healthy = chain_from(vec![0.0; n], vec![false; n], vec![3; n], lively, 0);
        assert!(!check_energy(&result_from(vec![healthy])).flagged);

        // Slow drift: tiny successive differences against a wide spread.
        let sluggish: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let numer = (n - 1) as f64 / n as f64;
        let denom = stats::variance(&sluggish);
        assert!(numer / denom < 0.2, "test premise: ratio must be below 0.2");
        let flagged_chain = chain_from(vec![0.0; n], vec![false; n], vec![3; n], sluggish, 0);
        let verdict = check_energy(&result_from(vec![flagged_chain]));
        assert!(verdict.flagged);
        assert_eq!(verdict.records.len(), 1);
        assert_eq!(verdict.records[0].subject, "chain 0");
    }

    #[test]
    fn test_check_energy_constant_trace_is_pathological() {
        let n = 50;
        let chain = chain_from(vec![0.0; n], vec![false; n], vec![3; n], vec![7.0; n], 0);
        let verdict = check_energy(&result_from(vec![chain]));
        assert!(verdict.flagged);
        assert!(verdict.records[0].value.is_nan());
    }

    #[test]
    fn test_rhat_threshold_is_strict() {
        assert!(!rhat_flagged(1.1));
        assert!(rhat_flagged(1.1000001));
        assert!(rhat_flagged(f64::NAN));
        assert!(rhat_flagged(f64::INFINITY));
        assert!(!rhat_flagged(1.0));
    }

    #[test]
    fn test_n_eff_ratio_threshold_is_strict() {
        assert!(n_eff_ratio_flagged(0.0009));
        assert!(!n_eff_ratio_flagged(0.001));
        assert!(!n_eff_ratio_flagged(0.5));
    }

    #[test]
    fn test_check_rhat_separated_chains() {
        let shifted: Vec<f64> = (0..100).map(|i| 100.0 + i as f64 * 0.01).collect();
        let c1 = healthy_chain(4, 100, 0);
        let c2 = chain_from(
            shifted,
            vec![false; 100],
            vec![3; 100],
            vec![0.0; 100],
            0,
        );
        let verdict = check_rhat(&result_from(vec![c1, c2]));
        assert!(verdict.flagged);
        assert_eq!(verdict.records[0].subject, "mu");
        assert!(verdict.message.contains("have not mixed"));
    }

    #[test]
    fn test_partition_div_spec_example() {
        // Length 10, warm-up 4, post-warm-up flags [0,0,1,0,1,0] over
        // values [1,2,3,4,5,6].
        let values = vec![-1.0, -2.0, -3.0, -4.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let divergent = vec![
            false, false, false, false, false, false, true, false, true, false,
        ];
        let chain = chain_from(values, divergent, vec![3; 10], vec![0.0; 10], 4);
        let fit = result_from(vec![chain]);
        let (nondiv, div) = partition_div(&fit, "mu").unwrap();
        assert_eq!(nondiv, vec![1.0, 2.0, 4.0, 6.0]);
        assert_eq!(div, vec![3.0, 5.0]);
    }

    #[test]
    fn test_partition_div_unknown_parameter() {
        let fit = result_from(vec![healthy_chain(5, 20, 0)]);
        assert!(partition_div(&fit, "nope").is_err());
    }

    #[test]
    fn test_check_all_order_and_single_failure() {
        // Two healthy chains, then one divergence injected: only the
        // divergence line may indicate a problem.
        let mut c1 = healthy_chain(6, 204, 4);
        let c2 = healthy_chain(7, 204, 4);
        c1.divergent[100] = true;
        let fit = result_from(vec![c1, c2]);

        let report = check_all_diagnostics(&fit, 10);
        assert!(report.flagged);

        let lines: Vec<&str> = report.message.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("n_eff / iter looks reasonable"));
        assert!(lines[1].contains("Rhat looks reasonable"));
        assert!(lines[2].contains("1 of 400 iterations ended with a divergence"));
        assert!(lines[2].contains("adapt_delta"));
        assert!(lines[3].contains("0 of 400 iterations saturated"));
        assert!(lines[4].contains("no pathological behavior"));
    }

    #[test]
    fn test_checks_are_idempotent() {
        let fit = result_from(vec![healthy_chain(8, 104, 4), healthy_chain(9, 104, 4)]);
        assert_eq!(check_div(&fit), check_div(&fit));
        assert_eq!(check_treedepth(&fit, 10), check_treedepth(&fit, 10));
        assert_eq!(check_energy(&fit), check_energy(&fit));
        assert_eq!(check_n_eff(&fit), check_n_eff(&fit));
        assert_eq!(check_rhat(&fit), check_rhat(&fit));
        assert_eq!(
            check_all_diagnostics(&fit, 10),
            check_all_diagnostics(&fit, 10)
        );
    }

    #[test]
    fn test_empty_run_counts_as_zero_of_zero() {
        let chain = chain_from(Vec::new(), Vec::new(), Vec::new(), Vec::new(), 0);
        let fit = result_from(vec![chain]);
        let verdict = check_div(&fit);
        assert!(!verdict.flagged);
        assert!(verdict.message.contains("0 of 0 iterations"));
        assert!(verdict.message.contains("(0%)"));
    }
}
