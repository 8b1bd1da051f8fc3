use monitor_core::models::{Check, CheckState, LastChecked, ProbeOutcome};

/// New check record plus whether the owner should hear about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub check: Check,
    pub alert_warranted: bool,
}

/// Up only for a received response whose code is one of the success codes.
pub fn resolve_state(check: &Check, outcome: &ProbeOutcome) -> CheckState {
    match outcome.response_code() {
        Some(code) if check.is_success_code(code) => CheckState::Up,
        _ => CheckState::Down,
    }
}

/// Compute the post-probe record. A check that was never probed before does
/// not alert, whatever its outcome.
pub fn resolve(previous: &Check, outcome: &ProbeOutcome, now_millis: i64) -> Resolution {
    let state = resolve_state(previous, outcome);
    let alert_warranted = !previous.last_checked.is_never() && previous.state != state;

    let mut check = previous.clone();
    check.state = state;
    check.last_checked = LastChecked::At(now_millis);

    Resolution { check, alert_warranted }
}
