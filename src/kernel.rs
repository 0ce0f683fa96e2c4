//! Symmetric similarity functions for Kernel PCA.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{DecompositionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    /// `<x, y>`
    Dot,
    /// `exp(-gamma * ||x - y||^2)`
    Radial { gamma: f64 },
    /// `(<x, y> + shift)^degree`
    Polynomial { degree: f64, shift: f64 },
    /// `tanh(a * <x, y> + b)`
    Neural { a: f64, b: f64 },
    /// `(sum_i exp(-gamma * (x_i - y_i)^2))^degree`
    Anova { gamma: f64, degree: f64 },
    /// `(1 - ||x - y||^2 / sigma)^degree` inside the support, 0 outside.
    Epanechnikov { sigma: f64, degree: f64 },
    /// Sum of three radial terms `exp(-||x - y||^2 / sigma_k)`.
    GaussianCombination { sigma1: f64, sigma2: f64, sigma3: f64 },
    /// `sqrt(||x - y||^2 / sigma^2 + shift^2)`
    Multiquadric { sigma: f64, shift: f64 },
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Radial { gamma: 1.0 }
    }
}

impl Kernel {
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(DecompositionError::precondition(format!(
                    "kernel parameter {} must be positive, got {}",
                    name, v
                )))
            }
        };
        let finite = |name: &str, v: f64| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(DecompositionError::precondition(format!(
                    "kernel parameter {} must be finite, got {}",
                    name, v
                )))
            }
        };
        match *self {
            Kernel::Dot => Ok(()),
            Kernel::Radial { gamma } => positive("gamma", gamma),
            Kernel::Polynomial { degree, shift } => {
                positive("degree", degree)?;
                finite("shift", shift)
            }
            Kernel::Neural { a, b } => {
                finite("a", a)?;
                finite("b", b)
            }
            Kernel::Anova { gamma, degree } => {
                positive("gamma", gamma)?;
                positive("degree", degree)
            }
            Kernel::Epanechnikov { sigma, degree } => {
                positive("sigma", sigma)?;
                positive("degree", degree)
            }
            Kernel::GaussianCombination { sigma1, sigma2, sigma3 } => {
                positive("sigma1", sigma1)?;
                positive("sigma2", sigma2)?;
                positive("sigma3", sigma3)
            }
            Kernel::Multiquadric { sigma, shift } => {
                positive("sigma", sigma)?;
                finite("shift", shift)
            }
        }
    }

    pub fn evaluate(&self, x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
        match *self {
            Kernel::Dot => x.dot(&y),
            Kernel::Radial { gamma } => (-gamma * squared_distance(x, y)).exp(),
            Kernel::Polynomial { degree, shift } => (x.dot(&y) + shift).powf(degree),
            Kernel::Neural { a, b } => (a * x.dot(&y) + b).tanh(),
            Kernel::Anova { gamma, degree } => {
                let sum: f64 = x
                    .iter()
                    .zip(y.iter())
                    .map(|(xi, yi)| (-gamma * (xi - yi).powi(2)).exp())
                    .sum();
                sum.powf(degree)
            }
            Kernel::Epanechnikov { sigma, degree } => {
                let expression = squared_distance(x, y) / sigma;
                if expression > 1.0 {
                    0.0
                } else {
                    (1.0 - expression).powf(degree)
                }
            }
            Kernel::GaussianCombination { sigma1, sigma2, sigma3 } => {
                let d = squared_distance(x, y);
                (-d / sigma1).exp() + (-d / sigma2).exp() + (-d / sigma3).exp()
            }
            Kernel::Multiquadric { sigma, shift } => {
                (squared_distance(x, y) / (sigma * sigma) + shift * shift).sqrt()
            }
        }
    }
}

fn squared_distance(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    x.iter().zip(y.iter()).map(|(a, b)| (a - b).powi(2)).sum()
}
