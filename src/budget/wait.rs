//! Wait-time calculation for the rolling token window.

/// Inputs to a wait-time decision, taken from an already-pruned window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitInputs {
    /// Tokens used inside the window
    pub usage: u64,
    /// Tokens the next unit of work is expected to use
    pub estimated_upcoming: u64,
    /// Effective cap for one window
    pub cap: u64,
    /// Timestamp of the oldest surviving record
    pub oldest: Option<f64>,
    /// Current time
    pub now: f64,
    /// Window length in seconds
    pub window_seconds: f64,
    /// Extra seconds added past the expiry of the oldest record
    pub buffer_seconds: f64,
}

/// Seconds to wait before the estimated work can start without breaching the cap.
///
/// Only the expiry of the oldest record is considered. When that does not free
/// enough budget the caller finds out on its next check and waits again.
pub fn compute_wait(inputs: WaitInputs) -> f64 {
    if inputs.usage.saturating_add(inputs.estimated_upcoming) <= inputs.cap {
        return 0.0;
    }

    match inputs.oldest {
        Some(t0) => {
            let age = inputs.now - t0;
            (inputs.window_seconds - age + inputs.buffer_seconds).max(0.0)
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(usage: u64, estimated: u64, oldest: Option<f64>, now: f64) -> WaitInputs {
        WaitInputs {
            usage,
            estimated_upcoming: estimated,
            cap: 900,
            oldest,
            now,
            window_seconds: 60.0,
            buffer_seconds: 2.0,
        }
    }

    #[test]
    fn test_under_cap_is_zero() {
        assert_eq!(compute_wait(inputs(400, 500, Some(0.0), 10.0)), 0.0);
    }

    #[test]
    fn test_over_cap_waits_for_oldest_expiry() {
        let wait = compute_wait(inputs(800, 200, Some(0.0), 10.0));
        assert!((wait - 52.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_history_never_blocks() {
        assert_eq!(compute_wait(inputs(0, 5_000, None, 10.0)), 0.0);
    }

    #[test]
    fn test_wait_never_negative() {
        // Oldest record is already older than window + buffer.
        assert_eq!(compute_wait(inputs(800, 200, Some(0.0), 100.0)), 0.0);
    }

    #[test]
    fn test_estimate_alone_over_cap_still_bounded() {
        let wait = compute_wait(inputs(100, 10_000, Some(50.0), 60.0));
        assert!((wait - 52.0).abs() < 1e-9);
    }
}
