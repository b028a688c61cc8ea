//! Numeric building blocks for the metrics and analysis modules.
//!
//! Every function here is total: empty or degenerate input yields 0 (or a
//! p-value of 1) instead of NaN.

use std::f64::consts::PI;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn sum_squared_deviations(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum()
}

/// Standard deviation with denominator `n`.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (sum_squared_deviations(values) / values.len() as f64).sqrt()
}

/// Standard deviation with denominator `n - 1`; 0 below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    sample_variance(values).sqrt()
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    sum_squared_deviations(values) / (values.len() - 1) as f64
}

/// `std / mean` using the sample deviation; 0 when the mean is not positive.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m <= 0.0 {
        return 0.0;
    }
    sample_std(values) / m
}

/// Linear-interpolated quantile of already sorted values.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

fn central_moment(values: &[f64], order: i32) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(order)).sum::<f64>() / values.len() as f64
}

/// Adjusted Fisher-Pearson skewness (G1); 0 below three values or for a
/// constant series.
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 3 {
        return 0.0;
    }
    let m2 = central_moment(values, 2);
    if m2 <= f64::EPSILON {
        return 0.0;
    }
    let g1 = central_moment(values, 3) / m2.powf(1.5);
    (n * (n - 1.0)).sqrt() / (n - 2.0) * g1
}

/// Bias-corrected excess kurtosis (G2); 0 below four values or for a
/// constant series.
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 4 {
        return 0.0;
    }
    let m2 = central_moment(values, 2);
    if m2 <= f64::EPSILON {
        return 0.0;
    }
    let g2 = central_moment(values, 4) / (m2 * m2) - 3.0;
    ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
    pub p_value: f64,
}

impl Regression {
    pub fn r_squared(&self) -> f64 {
        self.r * self.r
    }
}

/// Ordinary least squares of `ys` against `xs` with a two-sided p-value for
/// the slope. Callers guarantee at least two points.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Regression {
    let n = xs.len().min(ys.len());
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = mean(xs);
    let y_mean = mean(ys);

    let mut ss_x = 0.0;
    let mut ss_y = 0.0;
    let mut ss_xy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        ss_x += (x - x_mean).powi(2);
        ss_y += (y - y_mean).powi(2);
        ss_xy += (x - x_mean) * (y - y_mean);
    }

    let slope = if ss_x > 0.0 { ss_xy / ss_x } else { 0.0 };
    let intercept = y_mean - slope * x_mean;
    let r = if ss_x > 0.0 && ss_y > 0.0 {
        (ss_xy / (ss_x * ss_y).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    let p_value = if n == 2 {
        // Two points always fit exactly; only a flat line is "no effect".
        if ys[0] == ys[1] {
            1.0
        } else {
            0.0
        }
    } else {
        correlation_p_value(r, n)
    };

    Regression {
        slope,
        intercept,
        r,
        p_value,
    }
}

/// Two-sided p-value for a correlation coefficient over `n` pairs, via the
/// t statistic with `n - 2` degrees of freedom.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if n < 3 || r == 0.0 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let denominator = 1.0 - r * r;
    if denominator <= 0.0 {
        return 0.0;
    }
    let t = r * (df / denominator).sqrt();
    student_t_two_sided(t, df)
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = mean(xs);
    let y_mean = mean(ys);

    let mut ss_x = 0.0;
    let mut ss_y = 0.0;
    let mut ss_xy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        ss_x += (x - x_mean).powi(2);
        ss_y += (y - y_mean).powi(2);
        ss_xy += (x - x_mean) * (y - y_mean);
    }

    if ss_x <= 0.0 || ss_y <= 0.0 {
        return 0.0;
    }
    (ss_xy / (ss_x * ss_y).sqrt()).clamp(-1.0, 1.0)
}

/// 1-based ranks with ties sharing their average rank.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let shared = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            ranks[index] = shared;
        }
        start = end + 1;
    }
    ranks
}

pub fn spearman(xs: &[f64], ys: &[f64]) -> f64 {
    pearson(&average_ranks(xs), &average_ranks(ys))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub t_statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: f64,
}

/// Independent two-sample t-test assuming equal variances.
///
/// Returns `None` when the pooled test has no degrees of freedom. When both
/// groups are constant the statistic is reported as 0 with p = 1 for equal
/// means and p = 0 otherwise.
pub fn pooled_t_test(a: &[f64], b: &[f64]) -> Option<TTest> {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 || n1 + n2 < 3 {
        return None;
    }
    let df = (n1 + n2 - 2) as f64;
    let pooled_variance =
        ((n1 - 1) as f64 * sample_variance(a) + (n2 - 1) as f64 * sample_variance(b)) / df;
    let standard_error = (pooled_variance * (1.0 / n1 as f64 + 1.0 / n2 as f64)).sqrt();
    let difference = mean(a) - mean(b);

    if standard_error <= f64::EPSILON {
        return Some(TTest {
            t_statistic: 0.0,
            p_value: if difference == 0.0 { 1.0 } else { 0.0 },
            degrees_of_freedom: df,
        });
    }

    let t = difference / standard_error;
    Some(TTest {
        t_statistic: t,
        p_value: student_t_two_sided(t, df),
        degrees_of_freedom: df,
    })
}

/// P(|T| >= |t|) for Student's t with `df` degrees of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    if df <= 0.0 {
        return 1.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// I_x(a, b) by Lentz's continued fraction.
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b)
        + a * x.ln()
        + b * (1.0 - x).ln())
    .exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPSILON: f64 = 1e-14;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - (a + b) * x / (a + 1.0));
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((a + m2 - 1.0) * (a + m2));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + m2) * (a + m2 + 1.0));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }

    h
}

/// Lanczos approximation (g = 7).
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        return PI.ln() - (PI * x).sin().ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, coefficient) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += coefficient / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() < tolerance
    }

    #[test]
    fn empty_input_is_zero_not_nan() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(population_std(&[]), 0.0);
        assert_eq!(sample_std(&[4.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(quantile_sorted(&[], 0.5), 0.0);
    }

    #[test]
    fn deviations_use_expected_denominators() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(population_std(&values), 2.0, 1e-12));
        assert!(close(sample_std(&values), (32.0f64 / 7.0).sqrt(), 1e-12));
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!(close(quantile_sorted(&sorted, 0.25), 1.75, 1e-12));
        assert!(close(quantile_sorted(&sorted, 0.5), 2.5, 1e-12));
        assert!(close(quantile_sorted(&sorted, 0.75), 3.25, 1e-12));
    }

    #[test]
    fn moments_match_reference_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 10.0];
        // adjusted (bias-corrected) estimators
        assert!(close(skewness(&values), 1.6971, 1e-3));
        assert!(close(excess_kurtosis(&values), 3.152, 1e-3));
        assert_eq!(skewness(&[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn regression_recovers_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let fit = linear_regression(&xs, &ys);
        assert!(close(fit.slope, 2.0, 1e-12));
        assert!(close(fit.intercept, 1.0, 1e-12));
        assert!(close(fit.r_squared(), 1.0, 1e-12));
        assert_eq!(fit.p_value, 0.0);
    }

    #[test]
    fn regression_on_flat_series_is_not_significant() {
        let fit = linear_regression(&[0.0, 1.0, 2.0], &[5.0, 5.0, 5.0]);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_squared(), 0.0);
        assert_eq!(fit.p_value, 1.0);
    }

    #[test]
    fn student_t_matches_table_values() {
        // t_{0.975, 10} = 2.228
        assert!(close(student_t_two_sided(2.228, 10.0), 0.05, 1e-3));
        // t_{0.995, 5} = 4.032
        assert!(close(student_t_two_sided(4.032, 5.0), 0.01, 1e-3));
        assert!(close(student_t_two_sided(0.0, 7.0), 1.0, 1e-12));
    }

    #[test]
    fn pooled_t_test_detects_clear_shift() {
        let a = [10.0, 12.0, 11.0, 13.0, 10.0];
        let b = [25.0, 27.0, 26.0, 28.0, 25.0];
        let test = pooled_t_test(&a, &b).unwrap();
        assert!(test.t_statistic < 0.0);
        assert!(test.p_value < 0.001);
        assert_eq!(test.degrees_of_freedom, 8.0);
    }

    #[test]
    fn pooled_t_test_handles_degenerate_groups() {
        assert!(pooled_t_test(&[1.0], &[2.0]).is_none());
        let same = pooled_t_test(&[3.0, 3.0], &[3.0, 3.0]).unwrap();
        assert_eq!((same.t_statistic, same.p_value), (0.0, 1.0));
        let shifted = pooled_t_test(&[3.0, 3.0], &[4.0, 4.0]).unwrap();
        assert_eq!((shifted.t_statistic, shifted.p_value), (0.0, 0.0));
    }

    #[test]
    fn ranks_share_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn spearman_sees_monotone_relation() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [1.0, 4.0, 9.0, 16.0, 100.0];
        assert!(close(spearman(&xs, &ys), 1.0, 1e-12));
        assert!(pearson(&xs, &ys) < 1.0);
    }

    #[test]
    fn constant_series_has_zero_correlation() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[4.0, 4.0, 4.0]), 0.0);
        assert_eq!(correlation_p_value(0.0, 10), 1.0);
    }
}
