// ==== Intake metrics ====
/// Counter for messages received from an ingest subscription
pub const MESSAGES_RECEIVED_COUNTER: &str = "deduper_messages_received_total";

/// Gauge for the number of messages waiting in a category's intake queue
pub const INTAKE_QUEUE_DEPTH_GAUGE: &str = "deduper_intake_queue_depth";

// ==== Deduplication metrics ====
/// Counter for payloads republished on a deduped topic
pub const FORWARDED_COUNTER: &str = "deduper_forwarded_total";

/// Counter for payloads dropped because their fingerprint was already seen
pub const DUPLICATES_COUNTER: &str = "deduper_duplicates_total";

/// Counter for payloads forwarded because the cache could not be read
pub const FAIL_OPEN_COUNTER: &str = "deduper_fail_open_total";

/// Counter for per-message errors, labelled by error kind
pub const ERRORS_COUNTER: &str = "deduper_errors_total";

/// Histogram for the time spent processing one inbound message
pub const PROCESSING_DURATION_HISTOGRAM: &str = "deduper_processing_duration_seconds";
