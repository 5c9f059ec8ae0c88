/*!
Target distributions the sampling engines can draw from.

Every model the pipeline understands resolves to one of the types here, and
each exposes its unnormalized log-density together with an analytic gradient,
so gradient-based engines need no automatic differentiation.

# Examples

```rust
use mcmc_pipeline::distributions::{DiagGaussian, Target};

let target = DiagGaussian::new(vec![0.0, 1.0], vec![1.0, 2.0]).unwrap();
assert_eq!(target.dim(), 2);
let logp = target.unnorm_logp(&[0.5, -0.5]);
let grad = target.grad_unnorm_logp(&[0.5, -0.5]);
assert_eq!(grad.len(), 2);
println!("log-density: {logp}");
```
*/

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A continuous target density with an analytic gradient.
pub trait Target {
    /// Dimensionality of the parameter space.
    fn dim(&self) -> usize;

    /// Parameter names, in draw-column order.
    fn param_names(&self) -> Vec<String>;

    /// Log of the unnormalized density at `theta`.
    fn unnorm_logp(&self, theta: &[f64]) -> f64;

    /// Gradient of [`Target::unnorm_logp`] at `theta`.
    fn grad_unnorm_logp(&self, theta: &[f64]) -> Vec<f64>;

    /// Default initial chain position.
    fn initial_position(&self) -> Vec<f64>;
}

/// Independent (diagonal-covariance) Gaussian target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagGaussian {
    pub mean: Vec<f64>,
    pub sigma: Vec<f64>,
    /// Optional parameter names; `x0..x{d-1}` when absent.
    #[serde(default)]
    pub params: Option<Vec<String>>,
}

impl DiagGaussian {
    pub fn new(mean: Vec<f64>, sigma: Vec<f64>) -> Result<Self> {
        let gaussian = Self {
            mean,
            sigma,
            params: None,
        };
        gaussian.validate()?;
        Ok(gaussian)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mean.is_empty() {
            return Err(Error::Model("gaussian model has no dimensions".to_string()));
        }
        if self.mean.len() != self.sigma.len() {
            return Err(Error::Model(format!(
                "gaussian model has {} means but {} sigmas",
                self.mean.len(),
                self.sigma.len()
            )));
        }
        if let Some(bad) = self.sigma.iter().find(|s| **s <= 0.0) {
            return Err(Error::Model(format!("gaussian sigma {bad} is not positive")));
        }
        if let Some(params) = &self.params {
            if params.len() != self.mean.len() {
                return Err(Error::Model(format!(
                    "gaussian model names {} parameters but has {} dimensions",
                    params.len(),
                    self.mean.len()
                )));
            }
        }
        Ok(())
    }
}

impl Target for DiagGaussian {
    fn dim(&self) -> usize {
        self.mean.len()
    }

    fn param_names(&self) -> Vec<String> {
        match &self.params {
            Some(params) => params.clone(),
            None => (0..self.mean.len()).map(|i| format!("x{i}")).collect(),
        }
    }

    fn unnorm_logp(&self, theta: &[f64]) -> f64 {
        theta
            .iter()
            .zip(self.mean.iter())
            .zip(self.sigma.iter())
            .map(|((&x, &m), &s)| {
                let z = (x - m) / s;
                -0.5 * z * z - s.ln()
            })
            .sum()
    }

    fn grad_unnorm_logp(&self, theta: &[f64]) -> Vec<f64> {
        theta
            .iter()
            .zip(self.mean.iter())
            .zip(self.sigma.iter())
            .map(|((&x, &m), &s)| -(x - m) / (s * s))
            .collect()
    }

    fn initial_position(&self) -> Vec<f64> {
        self.mean.clone()
    }
}

/// 2D Rosenbrock "banana" target, a standard stress test for samplers.
///
/// Unnormalized log-density `-( (a - x)^2 + b (y - x^2)^2 )`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rosenbrock2D {
    pub a: f64,
    pub b: f64,
}

impl Target for Rosenbrock2D {
    fn dim(&self) -> usize {
        2
    }

    fn param_names(&self) -> Vec<String> {
        vec!["x0".to_string(), "x1".to_string()]
    }

    fn unnorm_logp(&self, theta: &[f64]) -> f64 {
        let (x, y) = (theta[0], theta[1]);
        let term_1 = (self.a - x).powi(2);
        let term_2 = self.b * (y - x * x).powi(2);
        -(term_1 + term_2)
    }

    fn grad_unnorm_logp(&self, theta: &[f64]) -> Vec<f64> {
        let (x, y) = (theta[0], theta[1]);
        let dx = 2.0 * (self.a - x) + 4.0 * self.b * x * (y - x * x);
        let dy = -2.0 * self.b * (y - x * x);
        vec![dx, dy]
    }

    fn initial_position(&self) -> Vec<f64> {
        vec![self.a, self.a * self.a]
    }
}

/// Posterior of an unknown mean `mu` given observations with known noise
/// scale and a flat prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalMean {
    /// Observed values.
    pub y: Vec<f64>,
    /// Known observation noise standard deviation.
    pub sigma: f64,
}

impl NormalMean {
    pub fn new(y: Vec<f64>, sigma: f64) -> Result<Self> {
        if y.is_empty() {
            return Err(Error::Model(
                "normal_mean model has no observations".to_string(),
            ));
        }
        if sigma <= 0.0 {
            return Err(Error::Model(format!(
                "normal_mean sigma {sigma} is not positive"
            )));
        }
        Ok(Self { y, sigma })
    }
}

impl Target for NormalMean {
    fn dim(&self) -> usize {
        1
    }

    fn param_names(&self) -> Vec<String> {
        vec!["mu".to_string()]
    }

    fn unnorm_logp(&self, theta: &[f64]) -> f64 {
        let mu = theta[0];
        let inv_var = 1.0 / (self.sigma * self.sigma);
        -0.5 * inv_var * self.y.iter().map(|&y| (y - mu).powi(2)).sum::<f64>()
    }

    fn grad_unnorm_logp(&self, theta: &[f64]) -> Vec<f64> {
        let mu = theta[0];
        let inv_var = 1.0 / (self.sigma * self.sigma);
        vec![inv_var * self.y.iter().map(|&y| y - mu).sum::<f64>()]
    }

    fn initial_position(&self) -> Vec<f64> {
        let mean = self.y.iter().sum::<f64>() / self.y.len() as f64;
        vec![mean]
    }
}
