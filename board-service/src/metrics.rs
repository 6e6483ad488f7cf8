//! Prometheus counters for the board write path.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static! {
    /// Guarded mutations rejected because the entity key was already held.
    pub static ref LOCK_REJECTED: IntCounterVec = register_int_counter_vec!(
        "board_lock_rejected_total",
        "Mutations rejected because another request held the entity key",
        &["entity"]
    )
    .expect("failed to register board_lock_rejected_total");

    /// View-count increments suppressed by the visitor dedup window.
    pub static ref VIEW_DEDUP_SUPPRESSED: IntCounter = register_int_counter!(
        "board_view_dedup_suppressed_total",
        "View-count increments suppressed by the visitor dedup window"
    )
    .expect("failed to register board_view_dedup_suppressed_total");

    /// Dedup backend failures that degraded to plain counting.
    pub static ref VIEW_DEDUP_DEGRADED: IntCounter = register_int_counter!(
        "board_view_dedup_degraded_total",
        "Dedup backend failures where the view was counted without dedup"
    )
    .expect("failed to register board_view_dedup_degraded_total");
}
