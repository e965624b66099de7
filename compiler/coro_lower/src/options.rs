//! Lowering configuration.

/// Optimization level of the build being compiled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OptimizationLevel {
    /// Stable slot identities, every hoisted user variable visible to the
    /// debugger, no slot reuse.
    #[default]
    Debug,
    /// Slot reuse, current-instance caching, minimal hoisting.
    Release,
}

/// Options for one lowering invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LowerOptions {
    pub optimization: OptimizationLevel,
    /// First resumable state number. `None` uses the strategy's default.
    pub first_state: Option<u32>,
}

impl LowerOptions {
    /// Options for an optimized build.
    pub fn release() -> Self {
        Self {
            optimization: OptimizationLevel::Release,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_first_state(mut self, first_state: u32) -> Self {
        self.first_state = Some(first_state);
        self
    }

    #[inline]
    pub fn is_optimized(&self) -> bool {
        self.optimization == OptimizationLevel::Release
    }
}
