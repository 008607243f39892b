//! Tolerance-based floating-point comparisons (Knuth, TAOCP Vol. 2, Sec. 4.2.2).
//!
//! Raw `==`/`<` on floats is never used in the stability and core-membership
//! checks; these helpers handle NaN (never equal to anything, itself included)
//! and infinities (equal only when both infinite with the same sign) explicitly.

/// Default relative tolerance used when a caller does not supply one.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// `|x - y| <= tol * max(|x|, |y|)`.
pub fn approximately_equal(x: f64, y: f64, tol: f64) -> bool {
    // Exact comparison first: handles x == y == 0 and equal infinities.
    if x == y {
        return true;
    }
    if x.is_nan() || y.is_nan() {
        return false;
    }
    if x.is_infinite() || y.is_infinite() {
        // Equal infinities were caught above; anything else differs.
        return false;
    }
    (x - y).abs() <= x.abs().max(y.abs()) * tol
}

/// `|x - y| <= tol * min(|x|, |y|)`, a stricter equality than
/// [`approximately_equal`].
pub fn essentially_equal(x: f64, y: f64, tol: f64) -> bool {
    if x == y {
        return true;
    }
    if x.is_nan() || y.is_nan() {
        return false;
    }
    if x.is_infinite() || y.is_infinite() {
        return false;
    }
    (x - y).abs() <= x.abs().min(y.abs()) * tol
}

/// `x - y > tol * max(|x|, |y|)`.
pub fn definitely_greater(x: f64, y: f64, tol: f64) -> bool {
    if !(x > y) {
        // Also covers NaN operands: NaN comparisons are always false.
        return false;
    }
    if x.is_infinite() && y.is_finite() {
        return true;
    }
    if x.is_finite() && y.is_infinite() {
        return false;
    }
    (x - y) > x.abs().max(y.abs()) * tol
}

/// `y - x > tol * max(|x|, |y|)`.
pub fn definitely_less(x: f64, y: f64, tol: f64) -> bool {
    definitely_greater(y, x, tol)
}

/// Greater with tolerance, or essentially equal.
pub fn essentially_greater_equal(x: f64, y: f64, tol: f64) -> bool {
    definitely_greater(x, y, tol) || essentially_equal(x, y, tol)
}

/// Less with tolerance, or essentially equal.
pub fn essentially_less_equal(x: f64, y: f64, tol: f64) -> bool {
    definitely_less(x, y, tol) || essentially_equal(x, y, tol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_never_equal() {
        assert!(!approximately_equal(f64::NAN, f64::NAN, 1e-9));
        assert!(!essentially_equal(f64::NAN, 0.0, 1e-9));
        assert!(!definitely_greater(f64::NAN, 0.0, 1e-9));
        assert!(!definitely_greater(0.0, f64::NAN, 1e-9));
    }

    #[test]
    fn same_signed_infinities_compare_equal() {
        assert!(approximately_equal(f64::INFINITY, f64::INFINITY, 1e-9));
        assert!(essentially_equal(f64::NEG_INFINITY, f64::NEG_INFINITY, 1e-9));
        assert!(!approximately_equal(f64::INFINITY, f64::NEG_INFINITY, 1e-9));
        assert!(definitely_greater(f64::INFINITY, 1.0, 1e-9));
        assert!(!definitely_greater(1.0, f64::INFINITY, 1e-9));
    }

    #[test]
    fn relative_tolerance_scales_with_magnitude() {
        assert!(approximately_equal(1e12, 1e12 + 1.0, 1e-9));
        assert!(!approximately_equal(1.0, 1.0 + 1e-6, 1e-9));
        assert!(definitely_greater(1.0 + 1e-6, 1.0, 1e-9));
        assert!(!definitely_greater(1.0 + 1e-12, 1.0, 1e-9));
    }

    #[test]
    fn zero_equals_zero() {
        assert!(approximately_equal(0.0, 0.0, 0.0));
        assert!(essentially_equal(0.0, -0.0, 0.0));
    }
}
