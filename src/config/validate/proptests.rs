//! Property-based tests for configuration validation

use super::error::ValidationError;
use super::validator::validate_params;
use crate::config::schema::*;
use proptest::prelude::*;

fn arb_valid_params() -> impl Strategy<Value = TrainParams> {
    (
        1usize..128,                        // num_speakers_per_batch
        1usize..8,                          // num_segments_per_speaker
        1usize..300,                        // min_segment_len
        0usize..300,                        // extra frames on top of min
        0.0f32..0.99,                       // momentum
        proptest::option::of(0.1f32..10.0), // clip_gradient_norm
        1e-7f32..1e-2,                      // start_lr
    )
        .prop_map(|(spk, seg, min_len, extra, momentum, clip, start_lr)| {
            let mut params = TrainParams::new(0, spk, seg);
            params.min_segment_len = min_len;
            params.max_segment_len = min_len + extra;
            params.momentum = momentum;
            params.clip_gradient_norm = clip;
            params.lr_sweep.start_lr = start_lr;
            params
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_valid_params_pass(params in arb_valid_params()) {
        prop_assert!(validate_params(&params).is_ok());
    }

    #[test]
    fn prop_zero_speakers_fails(params in arb_valid_params()) {
        let mut params = params;
        params.num_speakers_per_batch = 0;
        prop_assert_eq!(
            validate_params(&params),
            Err(ValidationError::InvalidSpeakersPerBatch(0))
        );
    }

    #[test]
    fn prop_non_positive_start_lr_fails(
        params in arb_valid_params(),
        bad_lr in -1.0f32..=0.0
    ) {
        let mut params = params;
        params.lr_sweep.start_lr = bad_lr;
        prop_assert!(matches!(
            validate_params(&params),
            Err(ValidationError::InvalidStartLr(_))
        ));
    }

    #[test]
    fn prop_shrinking_growth_fails(
        params in arb_valid_params(),
        growth in 0.0f32..=1.0
    ) {
        let mut params = params;
        params.lr_sweep.growth_factor = growth;
        prop_assert!(matches!(
            validate_params(&params),
            Err(ValidationError::InvalidGrowthFactor(_))
        ));
    }
}
