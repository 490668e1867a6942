//! Gradient clipping utilities

use crate::model::ParamSet;

/// Clip gradients by global norm
///
/// Computes the global norm of all gradients and scales them down if the norm
/// exceeds max_norm. Relative magnitudes across parameters are preserved.
///
/// # Returns
/// The actual global norm before clipping
pub fn clip_grad_norm(grads: &mut ParamSet, max_norm: f32) -> f32 {
    let global_norm = grads.norm();
    if global_norm > max_norm {
        grads.scale(max_norm / global_norm);
    }
    global_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_clip_scales_to_max_norm() {
        let mut grads = ParamSet::new()
            .with("a", array![[3.0]])
            .with("b", array![[4.0]]);
        let norm = clip_grad_norm(&mut grads, 1.0);
        assert_abs_diff_eq!(norm, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grads.norm(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grads.get("a").unwrap()[[0, 0]], 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let mut grads = ParamSet::new().with("a", array![[0.3, 0.4]]);
        let norm = clip_grad_norm(&mut grads, 1.0);
        assert_abs_diff_eq!(norm, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(grads.get("a").unwrap()[[0, 1]], 0.4, epsilon = 1e-6);
    }
}
