//! Savitzky–Golay smoothing by local least-squares polynomial fits.
//!
//! Each output value is the fitted polynomial evaluated at its own sample.
//! Near the edges the window is pinned to the first or last `window` samples
//! instead of being padded.

/// Window for a series sampled at `fps`: about a quarter second, odd, and
/// wide enough for `polyorder`. `None` when the series is too short.
pub fn smoothing_window(fps: f64, polyorder: usize, len: usize) -> Option<usize> {
    let mut window = ((fps / 4.0).floor().max(0.0) as usize).max(polyorder + 2);
    if window % 2 == 0 {
        window += 1;
    }
    if window > len {
        window = if len % 2 == 1 { len } else { len.saturating_sub(1) };
    }
    (window > polyorder).then_some(window)
}

/// Smooth `values` with an odd `window` and polynomial order `polyorder`.
///
/// Returns the input unchanged when the parameters cannot produce a fit.
pub fn savgol_filter(values: &[f64], window: usize, polyorder: usize) -> Vec<f64> {
    let n = values.len();
    if window % 2 == 0 || window <= polyorder || window > n {
        return values.to_vec();
    }
    let half = window / 2;

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half).min(n - window);
            let window_values = &values[lo..lo + window];
            fit_at(window_values, i as f64 - lo as f64, polyorder).unwrap_or(values[i])
        })
        .collect()
}

/// Least-squares polynomial through `ys` (at x = 0, 1, ...), evaluated at `at`.
fn fit_at(ys: &[f64], at: f64, order: usize) -> Option<f64> {
    let terms = order + 1;
    // Centering on the evaluation point makes the result the constant term.
    let xs: Vec<f64> = (0..ys.len()).map(|j| j as f64 - at).collect();

    let mut normal = vec![vec![0.0; terms]; terms];
    let mut rhs = vec![0.0; terms];
    for (&x, &y) in xs.iter().zip(ys) {
        let mut powers = vec![1.0; 2 * terms - 1];
        for k in 1..powers.len() {
            powers[k] = powers[k - 1] * x;
        }
        for r in 0..terms {
            for c in 0..terms {
                normal[r][c] += powers[r + c];
            }
            rhs[r] += powers[r] * y;
        }
    }

    solve(normal, rhs).map(|coeffs| coeffs[0])
}

/// Gaussian elimination with partial pivoting. `None` if singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
