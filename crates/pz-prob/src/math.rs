//! Quadrature for smooth integrands.

/// Composite Simpson integral of `f` on `[a, b]` with `n` intervals.
///
/// `n` is rounded up to the next even number (and to at least 2).
pub fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, n: usize) -> f64 {
    if a == b {
        return 0.0;
    }
    let n = (n.max(2) + 1) & !1;
    let h = (b - a) / n as f64;
    let mut acc = f(a) + f(b);
    for i in 1..n {
        let x = a + h * i as f64;
        acc += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    acc * h / 3.0
}
