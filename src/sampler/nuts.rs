/*!
No-U-Turn Sampler engine.

Slice-based NUTS with tree doubling: proposals are selected uniformly among
trajectory states falling inside the slice, trajectories stop at a U-turn or
a divergence, and the step size is adapted during warm-up by dual averaging
toward the configured target acceptance probability. The metric is the
identity; models supply analytic gradients, so no automatic differentiation
backend is involved.

Per-iteration sampler internals (divergence flag, tree depth, energy at the
trajectory start) are recorded into the [`ChainTrace`]s for the convergence
checks downstream.
*/

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use indicatif::MultiProgress;

use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::fit::{ChainTrace, RunResult};
use crate::model::Model;
use crate::sampler::{chain_progress_bar, Engine, RunSettings};

/// Maximum energy error before a transition is declared divergent.
const DIVERGENCE_THRESHOLD: f64 = 1000.0;

#[derive(Debug)]
pub struct NutsEngine;

impl Engine for NutsEngine {
    fn key(&self) -> &'static str {
        "nuts"
    }

    fn run(&self, model: &Model, settings: &RunSettings) -> Result<RunResult> {
        let multi = MultiProgress::new();
        let chains: Vec<Result<ChainTrace>> = (0..settings.chains)
            .into_par_iter()
            .map(|chain| {
                let pb =
                    chain_progress_bar(&multi, chain, settings.iter as u64, settings.progress);
                let trace = run_chain(&model.kind, settings, chain, &pb);
                pb.finish_with_message("Done!");
                trace
            })
            .collect();
        let chains = chains.into_iter().collect::<Result<Vec<_>>>()?;

        Ok(RunResult {
            engine: self.key().to_string(),
            param_names: model.kind.param_names(),
            chains,
            seed: settings.seed,
            thin: settings.thin,
            max_depth: settings.max_depth,
        })
    }
}

/// Position, momentum, and cached log-density/gradient at the position.
#[derive(Debug, Clone)]
struct State {
    q: Vec<f64>,
    p: Vec<f64>,
    grad: Vec<f64>,
    logp: f64,
}

impl State {
    fn at(target: &impl Target, q: Vec<f64>) -> Self {
        let logp = target.unnorm_logp(&q);
        let grad = target.grad_unnorm_logp(&q);
        let p = vec![0.0; q.len()];
        Self { q, p, grad, logp }
    }

    /// Hamiltonian under the identity metric.
    fn energy(&self) -> f64 {
        -self.logp + 0.5 * self.p.iter().map(|&p| p * p).sum::<f64>()
    }
}

/// One leapfrog step with signed step size.
fn leapfrog(target: &impl Target, state: &mut State, eps: f64) {
    for (p, g) in state.p.iter_mut().zip(state.grad.iter()) {
        *p += 0.5 * eps * g;
    }
    for (q, p) in state.q.iter_mut().zip(state.p.iter()) {
        *q += eps * p;
    }
    state.logp = target.unnorm_logp(&state.q);
    state.grad = target.grad_unnorm_logp(&state.q);
    for (p, g) in state.p.iter_mut().zip(state.grad.iter()) {
        *p += 0.5 * eps * g;
    }
}

/// No-U-turn criterion across the tree's end points (identity metric).
fn is_turning(left: &State, right: &State) -> bool {
    let dq: Vec<f64> = right
        .q
        .iter()
        .zip(left.q.iter())
        .map(|(&r, &l)| r - l)
        .collect();
    let dot_left: f64 = dq.iter().zip(left.p.iter()).map(|(&d, &p)| d * p).sum();
    let dot_right: f64 = dq.iter().zip(right.p.iter()).map(|(&d, &p)| d * p).sum();
    dot_left < 0.0 || dot_right < 0.0
}

fn log_sum_exp(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else {
        max + ((a - max).exp() + (b - max).exp()).ln()
    }
}

/// Balanced binary subtree of trajectory states.
struct Tree {
    left: State,
    right: State,
    proposal: State,
    log_sum_weight: f64,
    n_leapfrog: usize,
    sum_accept: f64,
    divergent: bool,
    turning: bool,
}

/// Single-node tree: one leapfrog step from `state`.
fn build_leaf(
    target: &impl Target,
    state: &State,
    eps: f64,
    log_u: f64,
    h0: f64,
) -> Tree {
    let mut new_state = state.clone();
    leapfrog(target, &mut new_state, eps);

    let h = new_state.energy();
    let energy_error = h - h0;
    let divergent = !h.is_finite() || energy_error.abs() > DIVERGENCE_THRESHOLD;

    // Slice variant: states inside the slice carry equal weight.
    let log_weight = if h.is_finite() && log_u <= -h {
        0.0
    } else {
        f64::NEG_INFINITY
    };
    let accept = if energy_error.is_finite() {
        (-energy_error).exp().min(1.0)
    } else {
        0.0
    };

    Tree {
        left: new_state.clone(),
        right: new_state.clone(),
        proposal: new_state,
        log_sum_weight: log_weight,
        n_leapfrog: 1,
        sum_accept: accept,
        divergent,
        turning: false,
    }
}

/// Recursively build a subtree of the given depth in one direction.
fn build_tree(
    target: &impl Target,
    state: &State,
    depth: usize,
    eps: f64,
    log_u: f64,
    h0: f64,
    rng: &mut SmallRng,
) -> Tree {
    if depth == 0 {
        return build_leaf(target, state, eps, log_u, h0);
    }

    let mut inner = build_tree(target, state, depth - 1, eps, log_u, h0, rng);
    if inner.divergent || inner.turning {
        return inner;
    }

    let edge = if eps > 0.0 {
        inner.right.clone()
    } else {
        inner.left.clone()
    };
    let outer = build_tree(target, &edge, depth - 1, eps, log_u, h0, rng);

    let log_sum_weight = log_sum_exp(inner.log_sum_weight, outer.log_sum_weight);
    let accept_outer = (outer.log_sum_weight - log_sum_weight).exp();
    if rng.gen::<f64>() < accept_outer {
        inner.proposal = outer.proposal;
    }
    inner.log_sum_weight = log_sum_weight;
    inner.n_leapfrog += outer.n_leapfrog;
    inner.sum_accept += outer.sum_accept;
    inner.divergent = inner.divergent || outer.divergent;

    if eps > 0.0 {
        inner.right = outer.right;
    } else {
        inner.left = outer.left;
    }
    inner.turning =
        inner.turning || outer.turning || is_turning(&inner.left, &inner.right);
    inner
}

/// One completed NUTS transition.
struct Transition {
    state: State,
    depth: usize,
    divergent: bool,
    accept_prob: f64,
    energy: f64,
}

fn nuts_transition(
    target: &impl Target,
    current: &State,
    max_depth: usize,
    eps: f64,
    rng: &mut SmallRng,
) -> Transition {
    let mut state = current.clone();
    for p in state.p.iter_mut() {
        *p = StandardNormal.sample(rng);
    }
    let h0 = state.energy();
    // u ~ Uniform(0, exp(-H0)), kept in log space.
    let log_u = (1.0 - rng.gen::<f64>()).ln() - h0;

    let mut tree = Tree {
        left: state.clone(),
        right: state.clone(),
        proposal: state.clone(),
        log_sum_weight: 0.0,
        n_leapfrog: 0,
        sum_accept: 0.0,
        divergent: false,
        turning: false,
    };

    // Depth is 0-based: depth 0 means a single leapfrog step. The deepest
    // level actually built is what the tree-depth diagnostic sees.
    let mut depth = 0;
    let mut depth_reached = 0;
    while depth <= max_depth {
        depth_reached = depth;
        let direction = if rng.gen::<bool>() { 1.0 } else { -1.0 };
        let signed_eps = direction * eps;
        let edge = if direction > 0.0 {
            tree.right.clone()
        } else {
            tree.left.clone()
        };

        let subtree = build_tree(target, &edge, depth, signed_eps, log_u, h0, rng);

        let log_sum_weight = log_sum_exp(tree.log_sum_weight, subtree.log_sum_weight);
        let accept_subtree = (subtree.log_sum_weight - log_sum_weight).exp();
        if rng.gen::<f64>() < accept_subtree {
            tree.proposal = subtree.proposal;
        }
        tree.log_sum_weight = log_sum_weight;
        tree.n_leapfrog += subtree.n_leapfrog;
        tree.sum_accept += subtree.sum_accept;
        tree.divergent = tree.divergent || subtree.divergent;
        tree.turning = tree.turning || subtree.turning;

        if direction > 0.0 {
            tree.right = subtree.right;
        } else {
            tree.left = subtree.left;
        }

        if is_turning(&tree.left, &tree.right) {
            tree.turning = true;
            break;
        }
        if tree.divergent || tree.turning {
            break;
        }
        depth += 1;
    }

    let accept_prob = tree.sum_accept / tree.n_leapfrog.max(1) as f64;
    Transition {
        state: tree.proposal,
        depth: depth_reached,
        divergent: tree.divergent,
        accept_prob,
        energy: h0,
    }
}

/// Dual-averaging step size adaptation (Hoffman & Gelman 2014).
struct DualAveraging {
    mu: f64,
    log_eps: f64,
    log_eps_bar: f64,
    h_bar: f64,
    m: u64,
}

impl DualAveraging {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    fn new(eps0: f64) -> Self {
        Self {
            mu: (10.0 * eps0).ln(),
            log_eps: eps0.ln(),
            log_eps_bar: 0.0,
            h_bar: 0.0,
            m: 0,
        }
    }

    fn current(&self) -> f64 {
        self.log_eps.exp()
    }

    fn adapted(&self) -> f64 {
        self.log_eps_bar.exp()
    }

    fn update(&mut self, accept_prob: f64, target_accept: f64) {
        self.m += 1;
        let m = self.m as f64;
        let eta = 1.0 / (m + Self::T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (target_accept - accept_prob);
        self.log_eps = self.mu - m.sqrt() / Self::GAMMA * self.h_bar;
        let weight = m.powf(-Self::KAPPA);
        self.log_eps_bar = weight * self.log_eps + (1.0 - weight) * self.log_eps_bar;
    }
}

/// Heuristic initial step size: double/halve until one leapfrog step
/// crosses the 0.5 acceptance boundary.
fn find_reasonable_epsilon(target: &impl Target, init: &State, rng: &mut SmallRng) -> f64 {
    let mut eps = 1.0;
    let mut state = init.clone();
    for p in state.p.iter_mut() {
        *p = StandardNormal.sample(rng);
    }
    let h0 = state.energy();

    let step_error = |eps: f64| -> f64 {
        let mut trial = state.clone();
        leapfrog(target, &mut trial, eps);
        h0 - trial.energy()
    };

    let mut log_ratio = step_error(eps);
    let mut guard = 0;
    while !log_ratio.is_finite() && guard < 50 {
        eps *= 0.5;
        log_ratio = step_error(eps);
        guard += 1;
    }
    if !log_ratio.is_finite() {
        return 1e-3;
    }

    let a: f64 = if log_ratio > (0.5f64).ln() { 1.0 } else { -1.0 };
    let mut guard = 0;
    while a * log_ratio > -a * (2.0f64).ln() && guard < 100 {
        eps *= (2.0f64).powf(a);
        log_ratio = step_error(eps);
        if !log_ratio.is_finite() {
            break;
        }
        guard += 1;
    }
    eps
}

fn run_chain(
    target: &(impl Target + Sync),
    settings: &RunSettings,
    chain: usize,
    pb: &indicatif::ProgressBar,
) -> Result<ChainTrace> {
    let mut rng = SmallRng::seed_from_u64(settings.seed.wrapping_add(chain as u64));
    let mut state = State::at(target, settings.init[chain].clone());
    if !state.logp.is_finite() {
        return Err(Error::Model(format!(
            "chain {chain}: initial position has non-finite log-density"
        )));
    }

    let recorded = settings.warmup + settings.kept_iterations();
    let mut trace = ChainTrace {
        draws: Vec::with_capacity(recorded),
        lp: Vec::with_capacity(recorded),
        divergent: Vec::with_capacity(recorded),
        treedepth: Vec::with_capacity(recorded),
        energy: Vec::with_capacity(recorded),
        is_sample: Vec::with_capacity(recorded),
    };

    let eps0 = find_reasonable_epsilon(target, &state, &mut rng);
    let mut adaptation = DualAveraging::new(eps0);
    let mut accept_sum = 0.0;
    let mut steps = 0u64;

    for _ in 0..settings.warmup {
        let eps = adaptation.current();
        let transition = nuts_transition(target, &state, settings.max_depth, eps, &mut rng);
        adaptation.update(transition.accept_prob, settings.target_accept);
        accept_sum += transition.accept_prob;
        steps += 1;

        record(&mut trace, &transition, false);
        state = transition.state;
        pb.inc(1);
        if steps % 100 == 0 {
            pb.set_message(format!("AcceptRate={:.3}", accept_sum / steps as f64));
        }
    }

    let eps = if settings.warmup > 0 {
        adaptation.adapted()
    } else {
        eps0
    };

    for i in 0..settings.sampling_iterations() {
        let transition = nuts_transition(target, &state, settings.max_depth, eps, &mut rng);
        accept_sum += transition.accept_prob;
        steps += 1;

        if i % settings.thin == 0 {
            record(&mut trace, &transition, true);
        }
        state = transition.state;
        pb.inc(1);
        if steps % 100 == 0 {
            pb.set_message(format!("AcceptRate={:.3}", accept_sum / steps as f64));
        }
    }

    Ok(trace)
}

fn record(trace: &mut ChainTrace, transition: &Transition, is_sample: bool) {
    trace.draws.push(transition.state.q.clone());
    trace.lp.push(transition.state.logp);
    trace.divergent.push(transition.divergent);
    trace.treedepth.push(transition.depth as u32);
    trace.energy.push(transition.energy);
    trace.is_sample.push(is_sample);
}
