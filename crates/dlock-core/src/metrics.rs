// Metrics for the lock protocol
// Counters and histograms recorded through the `metrics` facade

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const ACQUIRE_TOTAL: &str = "dlock_acquire_total";
pub const ACQUIRE_ERRORS_TOTAL: &str = "dlock_acquire_errors_total";
pub const ACQUIRE_WAIT_SECONDS: &str = "dlock_acquire_wait_seconds";
pub const RELEASE_TOTAL: &str = "dlock_release_total";
pub const DELETE_ERRORS_TOTAL: &str = "dlock_delete_errors_total";
pub const WATCH_WAKEUPS_TOTAL: &str = "dlock_watch_wakeups_total";
pub const WATCH_DROPPED_TOTAL: &str = "dlock_watch_dropped_total";
pub const MALFORMED_SIBLINGS_TOTAL: &str = "dlock_malformed_siblings_total";

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    describe_counter!(ACQUIRE_TOTAL, "Total number of successful lock acquisitions");
    describe_counter!(
        ACQUIRE_ERRORS_TOTAL,
        "Total number of failed lock acquisitions, by error kind"
    );
    describe_histogram!(
        ACQUIRE_WAIT_SECONDS,
        "Time from acquire() call to holding the lock, in seconds"
    );
    describe_counter!(RELEASE_TOTAL, "Total number of lock releases");
    describe_counter!(
        DELETE_ERRORS_TOTAL,
        "Claim node deletions that failed and were left to session expiry"
    );
    describe_counter!(
        WATCH_WAKEUPS_TOTAL,
        "Watch notifications delivered to a live lock"
    );
    describe_counter!(
        WATCH_DROPPED_TOTAL,
        "Watch notifications dropped because their lock no longer exists"
    );
    describe_counter!(
        MALFORMED_SIBLINGS_TOTAL,
        "Sibling nodes skipped because they do not follow the claim naming convention"
    );
}

pub fn record_acquired(waited: Duration) {
    counter!(ACQUIRE_TOTAL).increment(1);
    histogram!(ACQUIRE_WAIT_SECONDS).record(waited.as_secs_f64());
}

pub fn record_acquire_error(kind: &'static str) {
    counter!(ACQUIRE_ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_release(delete_failed: bool) {
    counter!(RELEASE_TOTAL).increment(1);
    if delete_failed {
        counter!(DELETE_ERRORS_TOTAL).increment(1);
    }
}

pub fn record_watch(delivered: bool) {
    if delivered {
        counter!(WATCH_WAKEUPS_TOTAL).increment(1);
    } else {
        counter!(WATCH_DROPPED_TOTAL).increment(1);
    }
}

pub fn record_malformed_sibling() {
    counter!(MALFORMED_SIBLINGS_TOTAL).increment(1);
}
