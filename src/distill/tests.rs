//! Property-based tests for channel-wise distillation

use super::*;
use crate::autograd::{backward, Tensor};
use crate::Error;
use approx::assert_abs_diff_eq;
use proptest::prelude::*;

// Helper to generate random feature maps
fn features_strategy(shape: [usize; 4]) -> impl Strategy<Value = Tensor> {
    prop::collection::vec(-3.0f32..3.0, shape.iter().product::<usize>())
        .prop_map(move |data| Tensor::from_shape_vec(&shape, data, false).unwrap())
}

/// Student map whose 2x2 blocks are constant, so pooling returns `pooled` exactly
fn blocky_student(pooled: &[f32], ph: usize, pw: usize) -> Tensor {
    let (h, w) = (2 * ph, 2 * pw);
    let data = (0..h * w)
        .map(|i| pooled[(i / w / 2) * pw + (i % w) / 2])
        .collect();
    Tensor::from_shape_vec(&[1, 1, h, w], data, false).unwrap()
}

fn kl_divergence(p: &ndarray::Array2<f32>, q: &ndarray::Array2<f32>) -> f32 {
    p.iter()
        .zip(q.iter())
        .filter(|(&p_i, _)| p_i > 0.0)
        .map(|(&p_i, &q_i)| p_i * (p_i / q_i).ln())
        .sum()
}

proptest! {
    /// Cross-entropy between distributions is never negative
    #[test]
    fn prop_loss_non_negative(
        student in features_strategy([2, 3, 6, 6]),
        teacher in features_strategy([2, 3, 3, 3]),
        tau in 0.5f32..8.0,
    ) {
        let loss_fn = ChannelWiseDivergence::new(3, 3, tau, 1.0).unwrap();
        let loss = loss_fn.forward_value(&student, &teacher).unwrap();

        prop_assert!(loss >= 0.0);
        prop_assert!(loss.is_finite());
    }

    /// Doubling the weight doubles the loss
    #[test]
    fn prop_weight_scales_linearly(
        student in features_strategy([1, 4, 8, 8]),
        teacher in features_strategy([1, 2, 4, 4]),
        weight in 0.1f32..5.0,
    ) {
        let single = ChannelWiseDivergence::with_seed(4, 2, 2.0, weight, 3).unwrap();
        let double = ChannelWiseDivergence::with_seed(4, 2, 2.0, 2.0 * weight, 3).unwrap();

        let l1 = single.forward_value(&student, &teacher).unwrap();
        let l2 = double.forward_value(&student, &teacher).unwrap();

        prop_assert!((l2 - 2.0 * l1).abs() <= 1e-5 * l2.abs().max(1.0));
    }

    /// Any student size pools to its rounded-up half; other teacher sizes are rejected
    #[test]
    fn prop_teacher_must_match_rounded_half(
        h in 1usize..12,
        w in 1usize..12,
        extra in 1usize..3,
    ) {
        let loss_fn = ChannelWiseDivergence::new(2, 2, 1.0, 1.0).unwrap();
        let student = Tensor::zeros(&[1, 2, h, w], false);
        let (th, tw) = downsampled_hw(h, w);

        let ok = Tensor::zeros(&[1, 2, th, tw], false);
        prop_assert!(loss_fn.forward(&student, &ok).is_ok());

        let wide = Tensor::zeros(&[1, 2, th, tw + extra], false);
        let is_shape_mismatch = matches!(
            loss_fn.forward(&student, &wide),
            Err(Error::ShapeMismatch { .. })
        );
        prop_assert!(is_shape_mismatch);
    }

    /// Loss is invariant to adding a constant to a teacher plane
    #[test]
    fn prop_teacher_shift_invariant(
        student in features_strategy([1, 2, 4, 4]),
        teacher in features_strategy([1, 2, 2, 2]),
        shift in -5.0f32..5.0,
    ) {
        let loss_fn = ChannelWiseDivergence::new(2, 2, 1.0, 1.0).unwrap();
        let shifted = Tensor::from_shape_vec(
            teacher.shape(),
            teacher.data().iter().map(|v| v + shift).collect(),
            false,
        ).unwrap();

        let base = loss_fn.forward_value(&student, &teacher).unwrap();
        let moved = loss_fn.forward_value(&student, &shifted).unwrap();

        prop_assert!((base - moved).abs() < 1e-4);
    }
}

#[test]
fn test_divergence_shrinks_as_tau_grows() {
    // Teacher ramp vs. reversed ramp in the student: the spatial
    // distributions flatten toward uniform and their KL goes to zero.
    let ramp: Vec<f32> = (0..16).map(|i| 0.1 * i as f32).collect();
    let reversed: Vec<f32> = ramp.iter().rev().copied().collect();
    let student = blocky_student(&reversed, 4, 4);
    let teacher = Tensor::from_shape_vec(&[1, 1, 4, 4], ramp, false).unwrap();

    let divergences: Vec<f32> = [1.0, 2.0, 4.0, 8.0, 16.0]
        .iter()
        .map(|&tau| {
            let loss_fn = ChannelWiseDivergence::new(1, 1, tau, 1.0).unwrap();
            let targets = loss_fn.soft_targets(&student, &teacher).unwrap();
            kl_divergence(&targets.teacher, &targets.student)
        })
        .collect();

    for pair in divergences.windows(2) {
        assert!(pair[1] < pair[0], "KL did not decrease: {:?}", divergences);
    }
    assert!(divergences[4] < 0.01);
}

#[test]
fn test_cross_entropy_per_row_approaches_log_area() {
    let ramp: Vec<f32> = (0..16).map(|i| 0.2 * i as f32).collect();
    let student = blocky_student(&ramp, 4, 4);
    let teacher = Tensor::from_shape_vec(&[1, 1, 4, 4], ramp.clone(), false).unwrap();

    let tau = 1000.0;
    let loss_fn = ChannelWiseDivergence::new(1, 1, tau, 1.0).unwrap();
    let per_row = loss_fn.forward_value(&student, &teacher).unwrap() / (tau * tau);

    assert_abs_diff_eq!(per_row, 16f32.ln(), epsilon = 1e-3);
}

#[test]
fn test_identical_distributions_give_entropy() {
    // Pooled student equals teacher: cross-entropy reduces to the teacher entropy.
    let values: Vec<f32> = (0..16).map(|i| ((i * 7) % 5) as f32 * 0.3).collect();
    let student = blocky_student(&values, 4, 4);
    let teacher = Tensor::from_shape_vec(&[1, 1, 4, 4], values, false).unwrap();
    let loss_fn = ChannelWiseDivergence::new(1, 1, 1.0, 1.0).unwrap();

    let targets = loss_fn.soft_targets(&student, &teacher).unwrap();
    let entropy: f32 = targets.teacher.iter().map(|&p| -p * p.ln()).sum();

    let loss = loss_fn.forward_value(&student, &teacher).unwrap();
    assert_abs_diff_eq!(loss, entropy, epsilon = 1e-5);
    assert_abs_diff_eq!(
        kl_divergence(&targets.teacher, &targets.student),
        0.0,
        epsilon = 1e-5
    );
}

#[test]
fn test_full_loss_gradient_matches_finite_difference() {
    let student_shape = [1, 3, 4, 5];
    let teacher_shape = [1, 2, 2, 3];
    let student_data: Vec<f32> = (0..60).map(|i| ((i * 13) % 11) as f32 * 0.2 - 1.0).collect();
    let teacher_data: Vec<f32> = (0..12).map(|i| ((i * 5) % 7) as f32 * 0.3 - 0.9).collect();
    let teacher = Tensor::from_shape_vec(&teacher_shape, teacher_data, false).unwrap();

    let loss_fn = ChannelWiseDivergence::with_seed(3, 2, 2.0, 1.5, 17).unwrap();
    let student = Tensor::from_shape_vec(&student_shape, student_data.clone(), true).unwrap();
    let mut loss = loss_fn.forward(&student, &teacher).unwrap();
    backward(&mut loss, None);
    let analytical = student.grad().unwrap();

    let eps = 1e-2;
    for i in 0..student_data.len() {
        let mut plus = student_data.clone();
        let mut minus = student_data.clone();
        plus[i] += eps;
        minus[i] -= eps;
        let f = |data: Vec<f32>| {
            let s = Tensor::from_shape_vec(&student_shape, data, false).unwrap();
            loss_fn.forward_value(&s, &teacher).unwrap()
        };
        let numerical = (f(plus) - f(minus)) / (2.0 * eps);
        assert_abs_diff_eq!(analytical[i], numerical, epsilon = 1e-2);
    }
}

#[test]
fn test_projection_gradient_matches_finite_difference() {
    let student_data: Vec<f32> = (0..64).map(|i| ((i * 3) % 8) as f32 * 0.25 - 1.0).collect();
    let teacher_data: Vec<f32> = (0..8).map(|i| (i % 3) as f32 - 1.0).collect();
    let student = Tensor::from_shape_vec(&[1, 4, 4, 4], student_data, false).unwrap();
    let teacher = Tensor::from_shape_vec(&[1, 2, 2, 2], teacher_data, false).unwrap();

    let mut loss_fn = ChannelWiseDivergence::with_seed(4, 2, 1.0, 1.0, 23).unwrap();
    let mut loss = loss_fn.forward(&student, &teacher).unwrap();
    backward(&mut loss, None);

    let eps = 1e-2;
    for p in 0..2 {
        let analytical = loss_fn.parameters()[p].grad().unwrap();
        for i in 0..loss_fn.parameters()[p].len() {
            let original = loss_fn.parameters()[p].data()[i];

            loss_fn.parameters_mut()[p].data_mut()[i] = original + eps;
            let plus = loss_fn.forward_value(&student, &teacher).unwrap();
            loss_fn.parameters_mut()[p].data_mut()[i] = original - eps;
            let minus = loss_fn.forward_value(&student, &teacher).unwrap();
            loss_fn.parameters_mut()[p].data_mut()[i] = original;

            let numerical = (plus - minus) / (2.0 * eps);
            assert_abs_diff_eq!(analytical[i], numerical, epsilon = 1e-2);
        }
    }
}
