//! Resource limits for script execution.
//!
//! Every evaluation runs against a deadline that the engine itself enforces:
//! the runtime's interrupt hook fires once `execution_timeout` has passed and
//! aborts the script, including native work such as regex backtracking. Heap
//! and native stack are capped per environment.
//!
//! An evaluation that does not come back within `abort_grace` after its
//! deadline is abandoned. At most `max_detached` abandoned evaluations may be
//! outstanding before the engine refuses new work.

use std::time::Duration;

/// Resource limits for script execution.
///
/// # Fields
///
/// - `execution_timeout` - Deadline for one evaluation (default: 30 seconds)
/// - `memory_limit` - Heap bytes one environment may allocate (default: 256 MiB)
/// - `max_stack_size` - Native stack bytes the script may use (default: 1 MiB)
/// - `abort_grace` - How long past the deadline the caller waits for the
///   abort to land (default: 1 second)
/// - `max_detached` - Abandoned evaluations tolerated at once (default: 4)
///
/// # Example
///
/// ```
/// use jsembed_runtime::ResourceLimits;
/// use std::time::Duration;
///
/// let limits = ResourceLimits::new()
///     .with_execution_timeout(Duration::from_secs(5))
///     .with_memory_limit(64 * 1024 * 1024);
/// assert!(limits.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    pub execution_timeout: Duration,
    pub memory_limit: usize,
    pub max_stack_size: usize,
    pub abort_grace: Duration,
    pub max_detached: usize,
}

/// Smallest heap an environment can start with.
const MIN_MEMORY_LIMIT: usize = 1024 * 1024;
/// Smallest native stack budget; the evaluation thread itself has 8 MiB.
const MIN_STACK_SIZE: usize = 64 * 1024;
const MAX_STACK_SIZE: usize = 4 * 1024 * 1024;

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            memory_limit: 256 * 1024 * 1024,
            max_stack_size: 1024 * 1024,
            abort_grace: Duration::from_secs(1),
            max_detached: 4,
        }
    }
}

impl ResourceLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    pub fn with_max_detached(mut self, max: usize) -> Self {
        self.max_detached = max;
        self
    }

    /// Execution timeout in whole milliseconds, as reported in timeout errors.
    pub fn timeout_ms(&self) -> u64 {
        self.execution_timeout.as_millis() as u64
    }

    /// Validates the resource limits configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Execution timeout is zero or longer than 1 hour
    /// - Memory limit is below 1 MiB
    /// - Stack size is outside 64 KiB ..= 4 MiB
    /// - `max_detached` is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.execution_timeout.is_zero() {
            return Err("execution timeout must be greater than zero".to_string());
        }

        if self.execution_timeout.as_secs() > 3600 {
            return Err(format!(
                "execution timeout must be <= 1 hour (got {} seconds)",
                self.execution_timeout.as_secs()
            ));
        }

        if self.memory_limit < MIN_MEMORY_LIMIT {
            return Err(format!(
                "memory limit must be at least {} bytes (got {})",
                MIN_MEMORY_LIMIT, self.memory_limit
            ));
        }

        if !(MIN_STACK_SIZE..=MAX_STACK_SIZE).contains(&self.max_stack_size) {
            return Err(format!(
                "stack size must be between {} and {} bytes (got {})",
                MIN_STACK_SIZE, MAX_STACK_SIZE, self.max_stack_size
            ));
        }

        if self.max_detached == 0 {
            return Err("max detached evaluations must be greater than zero".to_string());
        }

        Ok(())
    }
}
