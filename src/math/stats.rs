//! Small descriptive statistics helpers.

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

pub fn rms(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    (xs.iter().map(|x| x * x).sum::<f64>() / xs.len() as f64).sqrt()
}

/// Median (average of the two middle values for even lengths).
pub fn median(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut v = xs.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some(0.5 * (v[mid - 1] + v[mid]))
    } else {
        Some(v[mid])
    }
}

/// Wald–Wolfowitz runs test on the signs of `xs`.
///
/// Exact zeros are skipped. Returns the z score (negative when signs cluster
/// into fewer runs than chance), or `None` when only one sign is present.
pub fn runs_test_z(xs: &[f64]) -> Option<f64> {
    let signs: Vec<bool> = xs.iter().filter(|x| **x != 0.0).map(|x| *x > 0.0).collect();
    let n_pos = signs.iter().filter(|s| **s).count() as f64;
    let n_neg = signs.len() as f64 - n_pos;
    if n_pos == 0.0 || n_neg == 0.0 {
        return None;
    }
    let runs = 1.0 + signs.windows(2).filter(|w| w[0] != w[1]).count() as f64;
    let n = n_pos + n_neg;
    let expected = 2.0 * n_pos * n_neg / n + 1.0;
    let var = 2.0 * n_pos * n_neg * (2.0 * n_pos * n_neg - n) / (n * n * (n - 1.0));
    if !(var > 0.0) {
        return None;
    }
    Some((runs - expected) / var.sqrt())
}

/// Sample autocorrelation at `lag`.
pub fn autocorrelation(xs: &[f64], lag: usize) -> f64 {
    if lag >= xs.len() {
        return 0.0;
    }
    let m = mean(xs);
    let denom: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    if !(denom > 0.0) {
        return 0.0;
    }
    let num: f64 = xs
        .iter()
        .zip(xs.iter().skip(lag))
        .map(|(a, b)| (a - m) * (b - m))
        .sum();
    num / denom
}
