//! ASCII plotting of IV curves for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a fit in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - measured samples: `o`
//! - fitted curve: `-` line
//! - maximum-power point: `M`
//!
//! Current is drawn in mA, generator convention (photocurrent up).

use crate::domain::FitResult;

/// Render measured and fitted current of a result.
pub fn render_iv_plot(fit: &FitResult, width: usize, height: usize) -> String {
    let measured: Vec<(f64, f64)> = fit
        .voltage
        .iter()
        .zip(&fit.current)
        .map(|(v, i)| (*v, i * 1e3))
        .collect();
    let curve: Vec<(f64, f64)> = fit
        .voltage
        .iter()
        .zip(&fit.modeled_current)
        .map(|(v, i)| (*v, i * 1e3))
        .collect();
    let mpp = fit.metrics.as_ref().map(|m| (m.vmpp_v, m.impp_a * 1e3));

    render_plot(&measured, (!curve.is_empty()).then_some(curve.as_slice()), mpp, width, height)
}

fn render_plot(
    measured: &[(f64, f64)],
    curve: Option<&[(f64, f64)]>,
    mpp: Option<(f64, f64)>,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (v_min, v_max) = axis_range(measured.iter().map(|p| p.0)).unwrap_or((0.0, 1.0));
    let all_y = measured
        .iter()
        .chain(curve.unwrap_or(&[]))
        .map(|p| p.1);
    let (y_min, y_max) = axis_range(all_y).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so samples overlay it.
    if let Some(curve) = curve {
        let mut prev = None;
        for &(v, i) in curve {
            let x = map_x(v, v_min, v_max, width);
            let y = map_y(i, y_min, y_max, height);
            match prev {
                Some((x0, y0)) => draw_line(&mut grid, x0, y0, x, y, '-'),
                None => grid[y][x] = '-',
            }
            prev = Some((x, y));
        }
    }
    for &(v, i) in measured {
        grid[map_y(i, y_min, y_max, height)][map_x(v, v_min, v_max, width)] = 'o';
    }
    if let Some((v, i)) = mpp {
        grid[map_y(i, y_min, y_max, height)][map_x(v, v_min, v_max, width)] = 'M';
    }

    let mut out = format!("Plot: V=[{v_min:.3}, {v_max:.3}] V | I=[{y_min:.2}, {y_max:.2}] mA\n");
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn axis_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (lo.is_finite() && hi.is_finite() && hi > lo).then_some((lo, hi))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let pad = ((max - min).abs() * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, v_min: f64, v_max: f64, width: usize) -> usize {
    let u = ((v - v_min) / (v_max - v_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top.
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham), never overwriting marks.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let (mut x, mut y) = (x0 as isize, y0 as isize);
    let (x1, y1) = (x1 as isize, y1 as isize);

    let dx = (x1 - x).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let dy = -(y1 - y).abs();
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid.get_mut(y as usize).and_then(|row| row.get_mut(x as usize)) {
            if *cell == ' ' {
                *cell = ch;
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let measured = [(0.0, 0.0), (0.5, 10.0)];
        let curve = [(0.0, 0.0), (0.5, 0.0)];
        let txt = render_plot(&measured, Some(&curve), None, 10, 5);
        let expected = concat!(
            "Plot: V=[0.000, 0.500] V | I=[-0.50, 10.50] mA\n",
            "         o\n",
            "          \n",
            "          \n",
            "          \n",
            "o---------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn mpp_marker_overlays_samples() {
        let measured = [(0.0, 30.0), (0.25, 29.0), (0.5, 20.0), (0.6, 0.0)];
        let txt = render_plot(&measured, None, Some((0.5, 20.0)), 20, 8);
        let body: String = txt.lines().skip(1).collect();
        assert_eq!(body.matches('M').count(), 1);
        assert_eq!(body.matches('o').count(), 3);
    }
}
