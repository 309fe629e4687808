use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::exception::ExcType;

/// Error returned when a resource limit is exceeded.
///
/// The context turns these into language exceptions; see [`ResourceError::exc_type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of live allocations reached.
    Allocation { limit: usize, count: usize },
    /// A deadline pushed with `set_timeout` has elapsed.
    Time { limit: Duration, elapsed: Duration },
    /// Maximum call depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Time { limit, elapsed } => {
                write!(f, "time limit exceeded: {elapsed:?} > {limit:?}")
            }
            Self::Recursion { .. } => f.write_str("maximum recursion depth exceeded"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// Maps the resource error to the exception kind raised for it.
    ///
    /// - `Allocation` → `MemoryError`
    /// - `Time` → `TimeoutError`
    /// - `Recursion` → `RecursionError`
    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        match self {
            Self::Allocation { .. } => ExcType::MemoryError,
            Self::Time { .. } => ExcType::TimeoutError,
            Self::Recursion { .. } => ExcType::RecursionError,
        }
    }

    /// Message attached to the raised exception.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Time { .. } => "The operation timed out".to_owned(),
            other => other.to_string(),
        }
    }
}

/// Trait for tracking resource usage and scheduling garbage collection.
///
/// The heap reports every allocation and free; the context asks for recursion and
/// deadline checks at call boundaries.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded.
    fn on_allocate(&mut self) -> Result<(), ResourceError>;

    /// Called when a tracked allocation is reclaimed.
    fn on_free(&mut self);

    /// Returns true when the next allocation would be refused.
    ///
    /// Lets the heap owner run a collection pass before giving up.
    fn at_allocation_limit(&self) -> bool {
        false
    }

    /// Returns whether an automatic collection pass is due.
    ///
    /// # Arguments
    /// * `live` - Objects currently alive in the heap
    /// * `live_after_last_pass` - Objects that survived the previous pass
    fn should_collect(&self, _live: usize, _live_after_last_pass: usize) -> bool {
        false
    }

    /// Checks whether any active deadline has elapsed.
    fn check_time(&self) -> Result<(), ResourceError>;

    /// Called before pushing a new call frame to check recursion depth.
    ///
    /// # Arguments
    /// * `current_depth` - Current call stack depth (before the new frame is pushed)
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Returns the number of live tracked allocations, if this tracker records them.
    fn allocation_count(&self) -> Option<usize> {
        None
    }
}

/// A tracker that never refuses anything and never schedules collection.
///
/// Useful for driving a bare heap in tests and tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self) {}

    #[inline]
    fn check_time(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, _current_depth: usize) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Recommended maximum recursion depth if not otherwise specified.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 100;

/// Default live-allocation ceiling.
pub const DEFAULT_MAX_ALLOCATIONS: usize = 100_000;

/// Default growth factor between automatic collection passes.
pub const DEFAULT_GC_RUN_FACTOR: f64 = 2.0;

/// Maximum length of the method resolution order of any class.
pub const MAX_MRO_LENGTH: usize = 2600;

/// Maximum depth of single-path inheritance chains.
pub const MAX_INHERITANCE_DEPTH: usize = 1000;

/// Maximum nesting followed when rendering or comparing containers.
pub const MAX_DATA_RECURSION_DEPTH: usize = 200;

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of live heap allocations.
    pub max_allocations: Option<usize>,
    /// Maximum call depth.
    pub max_recursion_depth: Option<usize>,
    /// Growth factor between automatic collection passes. `None` disables them.
    pub gc_run_factor: Option<f64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLimits {
    /// Creates limits with the runtime defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_allocations: Some(DEFAULT_MAX_ALLOCATIONS),
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            gc_run_factor: Some(DEFAULT_GC_RUN_FACTOR),
        }
    }

    /// Creates limits with everything disabled.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_allocations: None,
            max_recursion_depth: None,
            gc_run_factor: None,
        }
    }

    /// Sets the maximum number of live allocations.
    #[must_use]
    pub fn max_allocations(mut self, limit: Option<usize>) -> Self {
        self.max_allocations = limit;
        self
    }

    /// Sets the maximum recursion depth (function call stack depth).
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Sets the automatic collection factor.
    #[must_use]
    pub fn gc_run_factor(mut self, factor: Option<f64>) -> Self {
        self.gc_run_factor = factor;
        self
    }
}

/// A resource tracker that enforces configurable limits.
///
/// Counts live allocations, holds the stack of active deadlines and schedules
/// automatic collection passes. Allocation counting only starts once the tracker
/// is armed, so objects created while bootstrapping a context are exempt.
#[derive(Debug)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    armed: bool,
    /// Live allocations made since arming.
    live: usize,
    /// Active deadlines, most recent last.
    deadlines: Vec<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl LimitedTracker {
    /// Creates a new, unarmed tracker with the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            armed: false,
            live: 0,
            deadlines: Vec::new(),
        }
    }

    /// Starts counting allocations against the ceiling.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Pushes a deadline `timeout` from now.
    pub fn push_deadline(&mut self, timeout: Duration) {
        self.deadlines.push(Deadline {
            at: Instant::now() + timeout,
            limit: timeout,
        });
    }

    /// Pops the most recently pushed deadline, returning false if none was active.
    pub fn pop_deadline(&mut self) -> bool {
        self.deadlines.pop().is_some()
    }

    /// Number of active deadlines.
    #[must_use]
    pub fn deadline_depth(&self) -> usize {
        self.deadlines.len()
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        if !self.armed {
            return Ok(());
        }
        if let Some(max) = self.limits.max_allocations
            && self.live >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.live + 1,
            });
        }
        self.live += 1;
        Ok(())
    }

    fn on_free(&mut self) {
        self.live = self.live.saturating_sub(1);
    }

    fn at_allocation_limit(&self) -> bool {
        self.armed && self.limits.max_allocations.is_some_and(|max| self.live >= max)
    }

    fn should_collect(&self, live: usize, live_after_last_pass: usize) -> bool {
        match self.limits.gc_run_factor {
            Some(factor) => {
                let threshold = (factor * live_after_last_pass as f64) as usize;
                live >= threshold.max(1)
            }
            None => false,
        }
    }

    fn check_time(&self) -> Result<(), ResourceError> {
        let now = Instant::now();
        match self.deadlines.iter().find(|deadline| now >= deadline.at) {
            Some(deadline) => Err(ResourceError::Time {
                limit: deadline.limit,
                elapsed: deadline.limit + now.duration_since(deadline.at),
            }),
            None => Ok(()),
        }
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth {
            // current_depth is before push, so new depth would be current_depth + 1
            if current_depth >= max {
                return Err(ResourceError::Recursion {
                    limit: max,
                    depth: current_depth + 1,
                });
            }
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.live)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Allocations made before arming are not counted against the ceiling.
    #[test]
    fn unarmed_tracker_ignores_ceiling() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(Some(1)));
        for _ in 0..5 {
            tracker.on_allocate().unwrap();
        }
        tracker.arm();
        tracker.on_allocate().unwrap();
        let err = tracker.on_allocate().unwrap_err();
        assert_eq!(err, ResourceError::Allocation { limit: 1, count: 2 });
        assert!(tracker.at_allocation_limit());
        tracker.on_free();
        assert!(!tracker.at_allocation_limit());
    }

    /// The recursion check refuses the frame that would exceed the limit.
    #[test]
    fn recursion_limit_is_inclusive() {
        let tracker = LimitedTracker::new(ResourceLimits::new().max_recursion_depth(Some(3)));
        assert!(tracker.check_recursion_depth(2).is_ok());
        let err = tracker.check_recursion_depth(3).unwrap_err();
        assert_eq!(err, ResourceError::Recursion { limit: 3, depth: 4 });
        assert_eq!(err.exc_type(), ExcType::RecursionError);
    }

    /// Popping a nested deadline restores the enclosing one.
    #[test]
    fn nested_deadlines_compose() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new());
        tracker.push_deadline(Duration::from_secs(3600));
        tracker.push_deadline(Duration::ZERO);
        assert!(tracker.check_time().is_err(), "zero timeout should be elapsed");
        assert!(tracker.pop_deadline());
        assert!(tracker.check_time().is_ok());
        assert_eq!(tracker.deadline_depth(), 1);
        assert!(tracker.pop_deadline());
        assert!(!tracker.pop_deadline());
    }

    /// Automatic passes are scheduled relative to the survivors of the last pass.
    #[test]
    fn collection_schedule_follows_factor() {
        let tracker = LimitedTracker::new(ResourceLimits::new().gc_run_factor(Some(2.0)));
        assert!(!tracker.should_collect(19, 10));
        assert!(tracker.should_collect(20, 10));
        let disabled = LimitedTracker::new(ResourceLimits::new().gc_run_factor(None));
        assert!(!disabled.should_collect(1_000_000, 1));
    }
}
