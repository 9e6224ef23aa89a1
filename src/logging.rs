//! Structured logging macros used across the crate. Field names are fixed
//! here so log queries can rely on them.

// ============================================================================
// API handlers
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, user_id = $user_id:expr) => {
        tracing::debug!(
            operation = $operation,
            user_id = %$user_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, user_id = $user_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            user_id = %$user_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API operation errors with consistent structure
#[macro_export]
macro_rules! log_api_error {
    ($operation:expr, user_id = $user_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            user_id = %$user_id,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "API operation failed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, user_id = $user_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            user_id = %$user_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Source Fetch Logging Macros
// ============================================================================

/// Log bank source queries, retries and cache activity
#[macro_export]
macro_rules! log_source_fetch {
    (start, source = $source:expr, topic = $topic:expr, grade = $grade:expr) => {
        tracing::debug!(
            component = "source_fetcher",
            source = %$source,
            topic = %$topic,
            grade = $grade,
            "Bank query started"
        );
    };
    (success, source = $source:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "source_fetcher",
            source = %$source,
            result_count = $count,
            duration_ms = $duration,
            "Bank query completed"
        );
    };
    (retry, source = $source:expr, attempt = $attempt:expr, delay_ms = $delay:expr, error = $error:expr) => {
        tracing::warn!(
            component = "source_fetcher",
            source = %$source,
            retry_count = $attempt,
            delay_ms = $delay,
            error = %$error,
            "Bank query failed, retrying"
        );
    };
    (failure, source = $source:expr, kind = $kind:expr, error = $error:expr) => {
        tracing::error!(
            component = "source_fetcher",
            source = %$source,
            error_kind = %$kind,
            error = %$error,
            "Bank query failed"
        );
    };
    (cache_hit, class_id = $class_id:expr, topic = $topic:expr, count = $count:expr) => {
        tracing::debug!(
            component = "source_fetcher",
            class_id = %$class_id,
            topic = %$topic,
            cached_count = $count,
            "Class question cache hit"
        );
    };
    (cache_miss, class_id = $class_id:expr, topic = $topic:expr) => {
        tracing::debug!(
            component = "source_fetcher",
            class_id = %$class_id,
            topic = %$topic,
            "Class question cache miss"
        );
    };
}

// ============================================================================
// Assembly Logging Macros
// ============================================================================

/// Log quiz assembly progress and outcomes
#[macro_export]
macro_rules! log_assembly {
    (start, quiz_id = $quiz_id:expr, topic = $topic:expr, requested = $requested:expr, max_attempts = $max:expr) => {
        tracing::info!(
            component = "assembler",
            quiz_id = %$quiz_id,
            topic = %$topic,
            requested = $requested,
            max_attempts = $max,
            "Quiz assembly started"
        );
    };
    (complete, quiz_id = $quiz_id:expr, achieved = $achieved:expr, attempts = $attempts:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = "assembler",
            quiz_id = %$quiz_id,
            achieved = $achieved,
            attempts = $attempts,
            duration_ms = $duration,
            "Quiz assembly completed"
        );
    };
    (shortfall, quiz_id = $quiz_id:expr, requested = $requested:expr, achieved = $achieved:expr, filtered = $filtered:expr) => {
        tracing::warn!(
            component = "assembler",
            quiz_id = %$quiz_id,
            requested = $requested,
            achieved = $achieved,
            subtopic_filtered = $filtered,
            "Quiz assembled with fewer questions than requested"
        );
    };
    (early_exit, quiz_id = $quiz_id:expr, consecutive = $consecutive:expr) => {
        tracing::warn!(
            component = "assembler",
            quiz_id = %$quiz_id,
            consecutive_filtered = $consecutive,
            "Subtopic restriction rejected every recent candidate, stopping early"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Performance Logging Macros
// ============================================================================

/// Log performance metrics with consistent structure
#[macro_export]
macro_rules! log_performance {
    ($operation:expr, duration_ms = $duration:expr, count = $count:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            item_count = $count,
            "Performance metrics"
        );
    };
    ($operation:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            "Performance metrics"
        );
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::bank_store::{BankError, SourceErrorKind};

    #[test]
    fn test_logging_macros_compile() {
        let quiz_id = Uuid::new_v4();
        let error = BankError::transient("unavailable", "test error");

        log_api_start!("start_quiz", user_id = "user-1");
        log_api_start!("health");
        log_api_success!("start_quiz", user_id = "user-1", "quiz assembled");
        log_api_success!("record_answer", count = 3, "answers stored");
        log_api_warn!("start_quiz", "short quiz");
        log_api_error!("start_quiz", error = error, "sources failed");

        log_source_fetch!(start, source = "classQuestions", topic = "fractions", grade = 4);
        log_source_fetch!(success, source = "classQuestions", count = 12, duration_ms = 30);
        log_source_fetch!(retry, source = "classQuestions", attempt = 1, delay_ms = 1000, error = error);
        log_source_fetch!(failure, source = "sharedQuestions", kind = SourceErrorKind::Index, error = error);
        log_source_fetch!(cache_hit, class_id = "class-1", topic = "fractions", count = 12);
        log_source_fetch!(cache_miss, class_id = "class-1", topic = "fractions");

        log_assembly!(start, quiz_id = quiz_id, topic = "fractions", requested = 5, max_attempts = 50);
        log_assembly!(complete, quiz_id = quiz_id, achieved = 5, attempts = 9, duration_ms = 4);
        log_assembly!(shortfall, quiz_id = quiz_id, requested = 5, achieved = 2, filtered = 40);
        log_assembly!(early_exit, quiz_id = quiz_id, consecutive = 50);

        log_system_event!(startup, component = "server", "server starting");
        log_system_event!(config, "configuration loaded successfully");

        log_performance!("assemble", duration_ms = 25, count = 5);
        log_performance!("fetch", duration_ms = 10);

        log_validation!(success, "configuration", "config validated");
        log_validation!(failure, "configuration", error = error);
    }
}
