//! Conditional least-squares ARIMA(p, d, q).
//!
//! The series is differenced `d` times. Pure autoregressive orders are fit by
//! OLS on lagged values; orders with a moving-average part use the
//! Hannan–Rissanen two-stage regression, with a long AR pre-fit supplying
//! innovation proxies. Least squares is solved through an SVD so rank
//! deficient designs (e.g. a constant series) collapse to the minimum-norm
//! solution instead of blowing up.
//!
//! Forecast intervals come from the ψ-weights of the integrated model:
//! `Var(h) = σ² Σ_{j<h} ψ_j²`.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::core::errors::{FleetError, Result};

/// Minimum regression rows beyond the parameter count.
const MIN_DEGREES_OF_FREEDOM: usize = 2;
/// Floor for σ² inside the log-likelihood.
const SIGMA2_FLOOR: f64 = 1e-12;
/// Upper bound on the long AR order of the Hannan–Rissanen pre-fit.
const LONG_AR_CAP: usize = 10;

/// `(p, d, q)`: autoregressive lag, differencing degree, moving-average lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[usize; 3]", into = "[usize; 3]")]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    /// Order retried when the primary fit fails.
    pub const FALLBACK: Self = Self::new(1, 1, 0);

    #[must_use]
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl From<[usize; 3]> for ArimaOrder {
    fn from([p, d, q]: [usize; 3]) -> Self {
        Self::new(p, d, q)
    }
}

impl From<ArimaOrder> for [usize; 3] {
    fn from(order: ArimaOrder) -> Self {
        [order.p, order.d, order.q]
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// One forecast step on the original scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepForecast {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

/// A successfully fitted model.
#[derive(Debug, Clone)]
pub struct FittedArima {
    order: ArimaOrder,
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    n_effective: usize,
    /// Differenced series the ARMA part was fit on.
    differenced: Vec<f64>,
    /// In-sample innovations aligned with `differenced`.
    residuals: Vec<f64>,
    /// Last value of each integration level `0..d`.
    tails: Vec<f64>,
}

/// Fit `order` to `values`.
pub fn fit(values: &[f64], order: ArimaOrder) -> Result<FittedArima> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(FleetError::fit(order, "series contains non-finite values"));
    }
    let ArimaOrder { p, d, q } = order;
    if values.len() <= d {
        return Err(FleetError::fit(
            order,
            format!("{} observations cannot be differenced {d} times", values.len()),
        ));
    }

    let mut tails = Vec::with_capacity(d);
    let mut w = values.to_vec();
    for _ in 0..d {
        tails.push(w[w.len() - 1]);
        w = difference(&w);
    }

    let with_constant = d == 0;
    let n_params = p + q + usize::from(with_constant);
    let (constant, ar, ma) = if q == 0 {
        let rows = w.len().saturating_sub(p);
        require_rows(order, rows, n_params)?;
        let design = lag_design(&w, p, &[], 0, p, with_constant);
        split_coefficients(&solve(order, &design, &w[p..])?, p, with_constant)
    } else {
        let long_order = (p + q).max(LONG_AR_CAP.min(w.len() / 4));
        require_rows(order, w.len().saturating_sub(long_order), long_order + 1)?;
        let long_design = lag_design(&w, long_order, &[], 0, long_order, true);
        let long_beta = solve(order, &long_design, &w[long_order..])?;
        let (c_long, phi_long, _) = split_coefficients(&long_beta, long_order, true);
        let proxies = innovations(&w, c_long, &phi_long, &[], long_order);

        let start = long_order + q;
        require_rows(order, w.len().saturating_sub(start), n_params)?;
        let design = lag_design(&w, p, &proxies, q, start, with_constant);
        split_coefficients(&solve(order, &design, &w[start..])?, p, with_constant)
    };

    if ar.iter().chain(&ma).any(|v| !v.is_finite()) || !constant.is_finite() {
        return Err(FleetError::fit(order, "non-finite coefficients"));
    }
    if !is_stationary(&ar) {
        return Err(FleetError::fit(order, "autoregressive part is not stationary"));
    }
    let neg_ma: Vec<f64> = ma.iter().map(|t| -t).collect();
    if !is_stationary(&neg_ma) {
        return Err(FleetError::fit(order, "moving-average part is not invertible"));
    }

    let residuals = innovations(&w, constant, &ar, &ma, p);
    let n_effective = w.len() - p;
    let sigma2 = residuals[p..].iter().map(|e| e * e).sum::<f64>() / n_effective as f64;
    if !sigma2.is_finite() {
        return Err(FleetError::fit(order, "residual variance is not finite"));
    }

    Ok(FittedArima {
        order,
        constant,
        ar,
        ma,
        sigma2,
        n_effective,
        differenced: w,
        residuals,
        tails,
    })
}

impl FittedArima {
    #[must_use]
    pub const fn order(&self) -> ArimaOrder {
        self.order
    }

    #[must_use]
    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    #[must_use]
    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    #[must_use]
    pub const fn constant(&self) -> f64 {
        self.constant
    }

    #[must_use]
    pub const fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Gaussian conditional log-likelihood.
    #[must_use]
    pub fn log_likelihood(&self) -> f64 {
        let n = self.n_effective as f64;
        let sigma2 = self.sigma2.max(SIGMA2_FLOOR);
        -0.5 * n * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0)
    }

    /// Akaike information criterion.
    #[must_use]
    pub fn aic(&self) -> f64 {
        let k = self.ar.len() + self.ma.len() + usize::from(self.order.d == 0) + 1;
        2.0f64.mul_add(k as f64, -2.0 * self.log_likelihood())
    }

    /// `steps` forecasts with two-sided intervals at `level` coverage.
    pub fn forecast(&self, steps: usize, level: f64) -> Result<Vec<StepForecast>> {
        if !(level > 0.0 && level < 1.0) {
            return Err(FleetError::InvalidRequest {
                details: format!("confidence level {level} must be in (0, 1)"),
            });
        }
        let z = Normal::new(0.0, 1.0)
            .map_err(|e| FleetError::fit(self.order, e.to_string()))?
            .inverse_cdf(1.0 - (1.0 - level) / 2.0);

        let means = self.integrate(&self.arma_forecast(steps));
        let psi = self.psi_weights(steps);
        let mut cumulative = 0.0;
        Ok(means
            .into_iter()
            .zip(psi)
            .map(|(mean, psi_j)| {
                cumulative += psi_j * psi_j;
                let half = z * (self.sigma2 * cumulative).sqrt();
                StepForecast {
                    mean,
                    lower: mean - half,
                    upper: mean + half,
                }
            })
            .collect())
    }

    /// Point forecasts on the differenced scale.
    fn arma_forecast(&self, steps: usize) -> Vec<f64> {
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        for _ in 0..steps {
            let t = w.len();
            let next = self.constant + lagged_sum(&w, &self.ar, t) + lagged_sum(&e, &self.ma, t);
            w.push(next);
            e.push(0.0);
        }
        w.split_off(self.differenced.len())
    }

    /// Undo the differencing, innermost level first.
    fn integrate(&self, forecasts: &[f64]) -> Vec<f64> {
        self.tails.iter().rev().fold(forecasts.to_vec(), |diffs, &tail| {
            diffs
                .iter()
                .scan(tail, |level, delta| {
                    *level += delta;
                    Some(*level)
                })
                .collect()
        })
    }

    /// ψ-weights of φ(B)(1−B)^d X_t = θ(B) ε_t, starting with ψ_0 = 1.
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        // Lag polynomial 1 - φ_1 B - … - φ_p B^p, then multiplied by (1 - B)^d.
        let mut poly: Vec<f64> = std::iter::once(1.0)
            .chain(self.ar.iter().map(|phi| -phi))
            .collect();
        for _ in 0..self.order.d {
            let mut next = vec![0.0; poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            poly = next;
        }
        let phi_star: Vec<f64> = poly[1..].iter().map(|c| -c).collect();

        let mut psi = Vec::with_capacity(count);
        for j in 0..count {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let theta = self.ma.get(j - 1).copied().unwrap_or(0.0);
            let ar_part: f64 = phi_star
                .iter()
                .take(j)
                .enumerate()
                .map(|(i, phi)| phi * psi[j - 1 - i])
                .sum();
            psi.push(theta + ar_part);
        }
        psi
    }
}

fn difference(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

fn require_rows(order: ArimaOrder, rows: usize, n_params: usize) -> Result<()> {
    if rows < n_params + MIN_DEGREES_OF_FREEDOM {
        return Err(FleetError::fit(
            order,
            format!("{rows} usable observations for {n_params} parameters"),
        ));
    }
    Ok(())
}

/// Σ coeffs[i] · series[t - 1 - i] over lags that exist.
fn lagged_sum(series: &[f64], coeffs: &[f64], t: usize) -> f64 {
    coeffs
        .iter()
        .enumerate()
        .filter_map(|(i, c)| t.checked_sub(i + 1).map(|idx| c * series[idx]))
        .sum()
}

/// Regression design for rows `start..w.len()`: optional intercept, `p`
/// lags of `w`, then `q` lags of `proxies`.
fn lag_design(
    w: &[f64],
    p: usize,
    proxies: &[f64],
    q: usize,
    start: usize,
    with_constant: bool,
) -> DMatrix<f64> {
    let rows = w.len() - start;
    let cols = usize::from(with_constant) + p + q;
    DMatrix::from_fn(rows, cols, |row, col| {
        let t = start + row;
        let col = if with_constant {
            if col == 0 {
                return 1.0;
            }
            col - 1
        } else {
            col
        };
        if col < p {
            w[t - 1 - col]
        } else {
            proxies[t - 1 - (col - p)]
        }
    })
}

fn solve(order: ArimaOrder, design: &DMatrix<f64>, target: &[f64]) -> Result<Vec<f64>> {
    if design.ncols() == 0 {
        return Ok(Vec::new());
    }
    let b = DVector::from_column_slice(target);
    let svd = design.clone().svd(true, true);
    let tolerance = svd.singular_values.max() * 1e-10;
    let beta = svd
        .solve(&b, tolerance)
        .map_err(|e| FleetError::fit(order, format!("least squares solve failed: {e}")))?;
    Ok(beta.iter().copied().collect())
}

/// `(constant, ar, ma)` from a stacked coefficient vector.
fn split_coefficients(beta: &[f64], p: usize, with_constant: bool) -> (f64, Vec<f64>, Vec<f64>) {
    let (constant, rest) = if with_constant {
        (beta[0], &beta[1..])
    } else {
        (0.0, beta)
    };
    (constant, rest[..p].to_vec(), rest[p..].to_vec())
}

/// Recursive residuals; zero before `start`.
fn innovations(w: &[f64], constant: f64, ar: &[f64], ma: &[f64], start: usize) -> Vec<f64> {
    let mut e = vec![0.0; w.len()];
    for t in start..w.len() {
        e[t] = w[t] - constant - lagged_sum(w, ar, t) - lagged_sum(&e, ma, t);
    }
    e
}

/// Step-down (reverse Levinson) test: the lag polynomial 1 − Σ a_i B^i has
/// all roots outside the unit circle iff every partial coefficient has
/// magnitude below one.
fn is_stationary(coeffs: &[f64]) -> bool {
    let mut a = coeffs.to_vec();
    while let Some(&kappa) = a.last() {
        if !kappa.is_finite() || kappa.abs() >= 1.0 {
            return false;
        }
        let k = a.len() - 1;
        let denom = kappa.mul_add(-kappa, 1.0);
        a = (0..k).map(|j| kappa.mul_add(a[k - 1 - j], a[j]) / denom).collect();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal as Gaussian};

    fn ar1_series(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Gaussian::new(0.0, 1.0).expect("valid normal");
        let mut x = 0.0;
        (0..n)
            .map(|_| {
                x = phi * x + noise.sample(&mut rng);
                x + 50.0
            })
            .collect()
    }

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        ar1_series(0.5, n, seed)
            .into_iter()
            .scan(100.0, |level, x| {
                *level += x - 50.0;
                Some(*level)
            })
            .collect()
    }

    #[test]
    fn constant_series_forecasts_constant() {
        let fitted = fit(&[5.0; 60], ArimaOrder::new(5, 1, 0)).expect("constant fits");
        let steps = fitted.forecast(7, 0.95).expect("forecast");
        assert_eq!(steps.len(), 7);
        for s in steps {
            assert!((s.mean - 5.0).abs() < 1e-9);
            assert!(s.lower <= s.mean && s.mean <= s.upper);
        }
        assert!(fitted.aic().is_finite());
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let values = ar1_series(0.6, 800, 3);
        let fitted = fit(&values, ArimaOrder::new(1, 0, 0)).expect("ar1 fits");
        let phi = fitted.ar_coefficients()[0];
        assert!((phi - 0.6).abs() < 0.1, "phi = {phi}");
        assert!((fitted.sigma2() - 1.0).abs() < 0.2);
        // Stationary mean is c / (1 - phi) ≈ 50.
        let mean = fitted.constant() / (1.0 - phi);
        assert!((mean - 50.0).abs() < 1.0, "mean = {mean}");
    }

    #[test]
    fn moving_average_orders_fit() {
        let values = random_walk(400, 17);
        let fitted = fit(&values, ArimaOrder::new(1, 1, 1)).expect("arima(1,1,1) fits");
        assert_eq!(fitted.ma_coefficients().len(), 1);
        let steps = fitted.forecast(10, 0.9).expect("forecast");
        assert!(steps.iter().all(|s| s.lower <= s.mean && s.mean <= s.upper));
    }

    #[test]
    fn intervals_widen_with_horizon() {
        let values = random_walk(300, 8);
        let fitted = fit(&values, ArimaOrder::new(2, 1, 0)).expect("fits");
        let steps = fitted.forecast(20, 0.95).expect("forecast");
        let widths: Vec<f64> = steps.iter().map(|s| s.upper - s.lower).collect();
        assert!(widths.windows(2).all(|w| w[1] >= w[0] - 1e-9));
        assert!(widths[0] > 0.0);
    }

    #[test]
    fn too_short_series_fails() {
        let err = fit(&[1.0, 2.0, 4.0], ArimaOrder::new(5, 1, 0)).expect_err("too short");
        assert_eq!(err.code(), "FLC-2002");
        assert!(err.to_string().contains("(5,1,0)"));
    }

    #[test]
    fn non_finite_input_fails() {
        let mut values = vec![1.0; 40];
        values[10] = f64::NAN;
        assert!(fit(&values, ArimaOrder::FALLBACK).is_err());
    }

    #[test]
    fn step_down_detects_unit_roots() {
        assert!(is_stationary(&[0.5, 0.3]));
        assert!(is_stationary(&[]));
        assert!(!is_stationary(&[1.2, -0.2]));
        assert!(!is_stationary(&[1.0]));
        assert!(!is_stationary(&[0.2, 1.1]));
    }

    #[test]
    fn psi_weights_of_random_walk_are_all_one() {
        let fitted = FittedArima {
            order: ArimaOrder::new(0, 1, 0),
            constant: 0.0,
            ar: Vec::new(),
            ma: Vec::new(),
            sigma2: 4.0,
            n_effective: 10,
            differenced: vec![0.0; 10],
            residuals: vec![0.0; 10],
            tails: vec![3.0],
        };
        assert_eq!(fitted.psi_weights(4), vec![1.0; 4]);
        let steps = fitted.forecast(4, 0.95).expect("forecast");
        // Var(h) = σ² h, so the half-width grows with √h.
        let half = |s: &StepForecast| s.upper - s.mean;
        assert!((half(&steps[3]) / half(&steps[0]) - 2.0).abs() < 1e-9);
        assert!(steps.iter().all(|s| (s.mean - 3.0).abs() < 1e-12));
    }

    #[test]
    fn order_round_trips_through_toml_array() {
        #[derive(Deserialize)]
        struct Doc {
            order: ArimaOrder,
        }
        let doc: Doc = toml::from_str("order = [3, 0, 2]").expect("parses");
        assert_eq!(doc.order, ArimaOrder::new(3, 0, 2));
        assert_eq!(ArimaOrder::FALLBACK.to_string(), "(1,1,0)");
    }
}
