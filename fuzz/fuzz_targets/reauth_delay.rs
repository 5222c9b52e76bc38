#![no_main]

use libfuzzer_sys::fuzz_target;
use sevensenders_retry::{calculate_delay, AttemptBudget, ReauthPolicy, RetryStrategyType};
use std::time::Duration;

fuzz_target!(|data: (u32, u8, u64, u64, u8, u8)| {
    let (attempt, strategy_type, base_ms, max_ms, jitter_byte, limit) = data;

    let attempt = attempt % 100 + 1;
    let strategy = match strategy_type % 4 {
        0 => RetryStrategyType::Immediate,
        1 => RetryStrategyType::Exponential,
        2 => RetryStrategyType::Linear,
        _ => RetryStrategyType::Constant,
    };
    let base_delay = Duration::from_millis(base_ms % 10_000 + 1);
    let max_delay = Duration::from_millis(max_ms % 300_000 + 100);

    let policy = ReauthPolicy {
        strategy,
        max_attempts: u32::from(limit),
        base_delay,
        max_delay,
        jitter: 0.0,
        reset_on_success: true,
    };

    let delay = calculate_delay(&policy, attempt);
    assert!(delay <= max_delay);
    if strategy == RetryStrategyType::Immediate {
        assert_eq!(delay, Duration::ZERO);
    }

    let jittered = calculate_delay(
        &ReauthPolicy {
            jitter: f64::from(jitter_byte) / 255.0,
            ..policy.clone()
        },
        attempt,
    );
    assert!(jittered <= max_delay * 2);

    let mut budget = AttemptBudget::new(policy.max_attempts);
    let mut granted = 0;
    while budget.try_consume().is_some() {
        granted += 1;
    }
    assert_eq!(granted, policy.max_attempts);
    assert!(budget.is_exhausted());
});
