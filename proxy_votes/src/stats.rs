// Numeric helpers shared by every report view.
//
// All functions are total: empty or degenerate inputs give 0 (or `None` for
// the trend), never NaN.

#[cfg(feature = "serde")]
use serde::Serialize;

/// A stream of uniform values in `[0, 1)`.
///
/// The permutation engine and the bootstrap only ever draw through this trait,
/// so tests can plug in a fixed stream.
pub trait UniformSource {
    fn next_f64(&mut self) -> f64;

    /// Uniform index in `[0, n)`. Returns 0 when `n` is 0.
    fn gen_index(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let idx = (self.next_f64() * n as f64).floor() as usize;
        idx.min(n - 1)
    }
}

/// Park-Miller minimal standard generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LehmerRng {
    state: u64,
}

impl LehmerRng {
    pub const MULTIPLIER: u64 = 16_807;
    pub const MODULUS: u64 = 2_147_483_647;

    /// Seed 0 behaves as seed 1. Any other value is reduced into
    /// `[1, MODULUS - 1]`.
    pub fn new(seed: i64) -> LehmerRng {
        let m = Self::MODULUS as i64;
        let seed = if seed == 0 { 1 } else { seed };
        let mut s = seed % m;
        if s <= 0 {
            s += m - 1;
        }
        LehmerRng { state: s as u64 }
    }

    /// Advances the generator and returns the raw state in `[1, MODULUS - 1]`.
    pub fn next_raw(&mut self) -> u64 {
        self.state = self.state * Self::MULTIPLIER % Self::MODULUS;
        self.state
    }
}

impl UniformSource for LehmerRng {
    fn next_f64(&mut self) -> f64 {
        let raw = self.next_raw();
        (raw - 1) as f64 / (Self::MODULUS - 1) as f64
    }
}

/// Fisher-Yates shuffle of a copy of `items`. The input is left untouched.
pub fn shuffle<T: Clone, R: UniformSource + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut res = items.to_vec();
    shuffle_in_place(&mut res, rng);
    res
}

pub(crate) fn shuffle_in_place<T, R: UniformSource + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_index(i + 1);
        items.swap(i, j);
    }
}

pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        0.0
    } else {
        num / den
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with the `n` denominator.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Standard deviation with the `n - 1` denominator. 0 for fewer than 2 values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Pearson correlation over the common prefix of both series.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs);
    let my = mean(ys);
    let mut num = 0.0;
    let mut dx = 0.0;
    let mut dy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let vx = x - mx;
        let vy = y - my;
        num += vx * vy;
        dx += vx * vx;
        dy += vy * vy;
    }
    if dx <= 0.0 || dy <= 0.0 {
        return 0.0;
    }
    num / (dx * dy).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Trend {
    pub slope: f64,
    pub intercept: f64,
}

/// Ordinary least squares line. `None` when the x values do not vary.
pub fn linear_trend(xs: &[f64], ys: &[f64]) -> Option<Trend> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs);
    let my = mean(ys);
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        num += (x - mx) * (y - my);
        den += (x - mx) * (x - mx);
    }
    if den.abs() < 1e-12 {
        return None;
    }
    let slope = num / den;
    Some(Trend {
        slope,
        intercept: my - slope * mx,
    })
}

/// Linear-interpolation quantile. Non-finite values are ignored.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    if q <= 0.0 {
        return sorted[0];
    }
    if q >= 1.0 {
        return sorted[sorted.len() - 1];
    }
    let pos = (sorted.len() - 1) as f64 * q;
    let base = pos.floor() as usize;
    let rest = pos - base as f64;
    match sorted.get(base + 1) {
        Some(next) => sorted[base] + rest * (next - sorted[base]),
        None => sorted[base],
    }
}

pub const DEFAULT_HISTOGRAM_BINS: usize = 30;

/// Fixed-width bins over `[min, max]` of a sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub bin_width: f64,
    pub centers: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// The span is floored at 1 so a constant sample still gets real bins.
    pub fn from_values(values: &[f64], bins: usize) -> Histogram {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() || bins == 0 {
            return Histogram {
                min: 0.0,
                max: 0.0,
                bin_width: 0.0,
                centers: Vec::new(),
                counts: Vec::new(),
            };
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = (max - min).max(1.0);
        let width = span / bins as f64;
        let mut counts = vec![0u64; bins];
        for v in finite.iter() {
            let idx = (((v - min) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }
        let centers = (0..bins)
            .map(|i| min + width * (i as f64 + 0.5))
            .collect();
        Histogram {
            min,
            max,
            bin_width: width,
            centers,
            counts,
        }
    }
}

pub const DEFAULT_BOOTSTRAP_ROUNDS: usize = 400;

/// 95% resampled range of `mean(a) - mean(b)`.
pub fn bootstrap_diff_mean<R: UniformSource + ?Sized>(
    a: &[f64],
    b: &[f64],
    rng: &mut R,
    rounds: usize,
) -> (f64, f64) {
    if a.is_empty() || b.is_empty() || rounds == 0 {
        return (0.0, 0.0);
    }
    let mut diffs: Vec<f64> = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let ma = (0..a.len()).map(|_| a[rng.gen_index(a.len())]).sum::<f64>() / a.len() as f64;
        let mb = (0..b.len()).map(|_| b[rng.gen_index(b.len())]).sum::<f64>() / b.len() as f64;
        diffs.push(ma - mb);
    }
    diffs.sort_by(|x, y| x.total_cmp(y));
    let lo = ((rounds as f64 * 0.025) as usize).saturating_sub(1);
    let hi = ((rounds as f64 * 0.975) as usize).min(rounds - 1);
    (diffs[lo], diffs[hi])
}

/// Coarse reading of an empirical p-value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Significance {
    /// p < 0.01
    VeryStrong,
    /// p < 0.05
    Strong,
    /// p < 0.1
    Weak,
    NotSignificant,
}

impl Significance {
    pub fn from_p_value(p: f64) -> Significance {
        if p < 0.01 {
            Significance::VeryStrong
        } else if p < 0.05 {
            Significance::Strong
        } else if p < 0.1 {
            Significance::Weak
        } else {
            Significance::NotSignificant
        }
    }
}
