//! Small time helpers shared by the scheduler and the host tasks.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns wall-clock seconds since the Unix epoch.
pub fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Format a task runtime for status output.
///
/// Sub-second runtimes are shown in milliseconds, everything else in
/// whole seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs == 0 {
        return format!("{} ms", elapsed.as_millis());
    }
    if secs == 1 {
        return "1 second".to_owned();
    }
    format!("{secs} seconds")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_second_uses_millis() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "0 ms");
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250 ms");
        assert_eq!(format_elapsed(Duration::from_millis(999)), "999 ms");
    }

    #[test]
    fn whole_seconds() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1 second");
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42 seconds");
    }

    #[test]
    fn epoch_is_after_2020() {
        assert!(now_epoch_secs() > 1_577_836_800.0);
    }
}
