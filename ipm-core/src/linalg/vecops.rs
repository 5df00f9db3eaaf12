//! Dense vector kernels.
//!
//! All IPM vectors are plain `Vec<f64>`; these helpers cover the handful of
//! operations the driver performs on them. Everything works on slices so the
//! same routines serve owned vectors and workspace views.

/// y += alpha * x
pub fn vector_add(y: &mut [f64], x: &[f64], alpha: f64) {
    debug_assert_eq!(y.len(), x.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// y[i] += alpha for every component.
pub fn vector_add_scalar(y: &mut [f64], alpha: f64) {
    for yi in y.iter_mut() {
        *yi += alpha;
    }
}

/// y *= alpha
pub fn vector_scale(y: &mut [f64], alpha: f64) {
    for yi in y.iter_mut() {
        *yi *= alpha;
    }
}

/// Dot product.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

/// Infinity norm. Zero for an empty slice.
pub fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |acc, &x| acc.max(x.abs()))
}

/// Euclidean norm.
pub fn two_norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// True if any component is NaN.
pub fn has_nan(v: &[f64]) -> bool {
    v.iter().any(|x| x.is_nan())
}

/// True if any component is infinite.
pub fn has_inf(v: &[f64]) -> bool {
    v.iter().any(|x| x.is_infinite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_add() {
        let mut y = vec![1.0, 2.0, 3.0];
        let x = vec![1.0, -1.0, 0.5];
        vector_add(&mut y, &x, 2.0);
        assert_eq!(y, vec![3.0, 0.0, 4.0]);
    }

    #[test]
    fn test_vector_add_scalar() {
        let mut y = vec![1.0, -1.0];
        vector_add_scalar(&mut y, 0.5);
        assert_eq!(y, vec![1.5, -0.5]);
    }

    #[test]
    fn test_norms_and_dot() {
        let v = vec![3.0, -4.0];
        assert_eq!(inf_norm(&v), 4.0);
        assert!((two_norm(&v) - 5.0).abs() < 1e-15);
        assert_eq!(dot(&v, &v), 25.0);
        assert_eq!(inf_norm(&[]), 0.0);
    }

    #[test]
    fn test_finiteness_checks() {
        assert!(!has_nan(&[1.0, 2.0]));
        assert!(has_nan(&[1.0, f64::NAN]));
        assert!(!has_inf(&[1.0, 2.0]));
        assert!(has_inf(&[f64::INFINITY, 0.0]));
    }
}
