// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Election window calibration
//!
//! Slow machines deliver broadcast messages late, so the candidacy window
//! stretches in proportion to how long a fixed CPU workload takes locally.
//! The window never shrinks below the baseline and never exceeds the cap.

use crate::config::ElectionConfig;
use std::time::{Duration, Instant};

const WORKLOAD_CHUNK: usize = 64 * 1024;
const WORKLOAD_ROUNDS: usize = 32;

/// Scale `baseline` by `measured / reference`, clamped to `[baseline, max]`
pub fn scale_window(
    baseline: Duration,
    max: Duration,
    measured: Duration,
    reference: Duration,
) -> Duration {
    if reference.is_zero() || measured <= reference {
        return baseline.min(max);
    }
    let scaled = baseline.as_nanos() * measured.as_nanos() / reference.as_nanos();
    let scaled = Duration::from_nanos(u64::try_from(scaled).unwrap_or(u64::MAX));
    scaled.min(max)
}

/// Time a fixed checksum workload
pub fn measure_workload() -> Duration {
    let buf = vec![0xA5u8; WORKLOAD_CHUNK];
    let start = Instant::now();
    let mut acc = 0u32;
    for round in 0..WORKLOAD_ROUNDS {
        let mut hasher = crc32fast::Hasher::new_with_initial(acc ^ round as u32);
        hasher.update(&buf);
        acc = hasher.finalize();
    }
    std::hint::black_box(acc);
    start.elapsed()
}

/// Candidacy window for this machine
pub fn calibrated_window(config: &ElectionConfig) -> Duration {
    let measured = measure_workload();
    let window = scale_window(
        config.baseline_window,
        config.max_window,
        measured,
        config.calibration_reference,
    );
    tracing::debug!(
        measured_us = measured.as_micros() as u64,
        window_ms = window.as_millis() as u64,
        "calibrated election window"
    );
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        fast_machine_keeps_baseline = { 1, 300 },
        reference_speed_keeps_baseline = { 2, 300 },
        slower_machine_stretches = { 3, 450 },
        very_slow_is_capped = { 20, 600 },
    )]
    fn window_scales_with_measurement(measured_ms: u64, expected_ms: u64) {
        let window = scale_window(
            Duration::from_millis(300),
            Duration::from_millis(600),
            Duration::from_millis(measured_ms),
            Duration::from_millis(2),
        );
        assert_eq!(window, Duration::from_millis(expected_ms));
    }

    #[test]
    fn zero_reference_returns_baseline() {
        let window = scale_window(
            Duration::from_millis(300),
            Duration::from_millis(600),
            Duration::from_millis(50),
            Duration::ZERO,
        );
        assert_eq!(window, Duration::from_millis(300));
    }

    #[test]
    fn calibrated_window_stays_within_bounds() {
        let config = ElectionConfig::default();
        let window = calibrated_window(&config);
        assert!(window >= config.baseline_window);
        assert!(window <= config.max_window);
    }
}
