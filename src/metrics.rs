//! Metrics for the broadcast protocol.
//!
//! Recorded through the [`metrics`] facade; install any recorder to export them.
//!
//! ## Available Metrics
//!
//! ### Counters
//! - `broadcast_messages_learned_total` - Messages this node learned for the first time
//! - `broadcast_duplicates_total` - Received messages that were already known
//! - `broadcast_updates_sent_total` - `update` batches queued by retransmission rounds
//! - `broadcast_acks_received_total` - Pending entries cleared by `update_ok`
//!
//! ### Histograms
//! - `broadcast_update_batch_size` - Number of messages per `update` batch
//!
//! ### Gauges
//! - `broadcast_known_messages` - Current number of known messages
//! - `broadcast_neighbors` - Current number of neighbors
//! - `broadcast_pending_total` - Current sum of pending entries over all neighbors

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Initialize metric descriptions.
///
/// Call this once at application startup to register all metric descriptions.
pub fn init_metrics() {
    // Counters
    describe_counter!(
        "broadcast_messages_learned_total",
        "Total number of messages learned for the first time"
    );
    describe_counter!(
        "broadcast_duplicates_total",
        "Total number of received messages that were already known"
    );
    describe_counter!(
        "broadcast_updates_sent_total",
        "Total number of update batches queued by retransmission rounds"
    );
    describe_counter!(
        "broadcast_acks_received_total",
        "Total number of pending entries cleared by acknowledgments"
    );

    // Histograms
    describe_histogram!(
        "broadcast_update_batch_size",
        "Number of messages in update batches"
    );

    // Gauges
    describe_gauge!("broadcast_known_messages", "Current number of known messages");
    describe_gauge!("broadcast_neighbors", "Current number of neighbors");
    describe_gauge!(
        "broadcast_pending_total",
        "Current number of unacknowledged (neighbor, message) pairs"
    );
}

/// Record newly learned messages.
pub fn record_messages_learned(count: usize) {
    counter!("broadcast_messages_learned_total").increment(count as u64);
}

/// Record duplicate messages.
pub fn record_duplicates(count: usize) {
    if count > 0 {
        counter!("broadcast_duplicates_total").increment(count as u64);
    }
}

/// Record `update` batches queued by a retransmission round.
pub fn record_updates_sent(count: usize) {
    counter!("broadcast_updates_sent_total").increment(count as u64);
}

/// Record the size of an `update` batch.
pub fn record_update_batch_size(size: usize) {
    histogram!("broadcast_update_batch_size").record(size as f64);
}

/// Record pending entries cleared by an acknowledgment.
pub fn record_acks_received(count: usize) {
    counter!("broadcast_acks_received_total").increment(count as u64);
}

/// Update known messages gauge.
pub fn set_known_messages(count: usize) {
    gauge!("broadcast_known_messages").set(count as f64);
}

/// Update neighbors gauge.
pub fn set_neighbors(count: usize) {
    gauge!("broadcast_neighbors").set(count as f64);
}

/// Update pending entries gauge.
pub fn set_pending_total(count: usize) {
    gauge!("broadcast_pending_total").set(count as f64);
}
