use lock_core::timer::{
    SYSTEM_CLOCK_CYCLES_PER_US, TIMER1_SPEC, TIMER2_SPEC, TimerSpec, best_fit,
    best_fit_cycles,
};

/// Smallest achievable error over every prescaler and every count.
fn exhaustive_error(spec: &TimerSpec, desired_period_us: u16) -> Option<u64> {
    let desired = u64::from(desired_period_us) * SYSTEM_CLOCK_CYCLES_PER_US;
    spec.prescalers
        .iter()
        .filter(|&&prescaler| prescaler != 0)
        .flat_map(|&prescaler| {
            (1..=u64::from(spec.counter_values))
                .map(move |count| (count * u64::from(prescaler)).abs_diff(desired))
        })
        .min()
}

#[test]
fn best_fit_matches_exhaustive_search() {
    for spec in [&TIMER1_SPEC, &TIMER2_SPEC] {
        for period in [1u16, 7, 100, 999, 1_000, 4_096, 16_383] {
            let fit = best_fit(spec, f32::from(period)).expect("reachable period");
            assert_eq!(
                Some(fit.error_cycles),
                exhaustive_error(spec, period),
                "period {period}us"
            );
        }
    }
}

#[test]
fn counts_stay_within_counter_width() {
    for spec in [&TIMER1_SPEC, &TIMER2_SPEC] {
        for period in (1u16..20_000).step_by(97) {
            if let Some(fit) = best_fit(spec, f32::from(period)) {
                assert!(fit.count >= 1);
                assert!(fit.count <= spec.counter_values, "period {period}us");
                assert_eq!(spec.prescalers[fit.prescaler_index], fit.prescaler);
            }
        }
    }
}

#[test]
fn periods_past_the_largest_prescaler_are_rejected() {
    // 256 counts at /1024 tops out at 16384us
    let fit = best_fit(&TIMER2_SPEC, 16_384.0).expect("largest fit");
    assert_eq!(fit.prescaler, 1024);
    assert_eq!(fit.count, 256);
    assert!(best_fit(&TIMER2_SPEC, 1_000_000.0).is_none());
    assert!(best_fit(&TIMER1_SPEC, f32::INFINITY).is_none());
}

#[test]
fn fractional_requests_round_to_the_nearest_cycle() {
    // 62.5us and 62.53us (1000.48 cycles) land on the same count
    for period in [62.5, 62.53] {
        let fit = best_fit(&TIMER1_SPEC, period).expect("reachable period");
        assert_eq!((fit.prescaler, fit.count), (1, 1_000));
    }
    assert_eq!(
        best_fit_cycles(&TIMER2_SPEC, 1_000),
        best_fit(&TIMER2_SPEC, 62.5)
    );
}
