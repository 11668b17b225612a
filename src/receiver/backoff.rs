use std::time::Duration;

/// First step of the backoff ladder after an empty poll.
pub const FIRST_STEP: Duration = Duration::from_millis(200);

/// Longest delay between two empty polls.
pub const MAX_DELAY: Duration = Duration::from_millis(400);

/// Returns the delay to wait before the next poll after one more empty receive.
///
/// The ladder is `0 -> 200ms -> 400ms`, holding at 400ms.
pub fn next(current: Duration) -> Duration {
    if current.is_zero() {
        FIRST_STEP
    } else {
        MAX_DELAY
    }
}
