//! Stack growth for deep tree recursion.
//!
//! Lowering recurses once per nesting level of the input tree (blocks inside
//! `try` bodies inside blocks ...), and generated code can nest far deeper
//! than hand-written code. Every recursive walk wraps its step in
//! [`ensure_sufficient_stack`] so depth is bounded by memory, not by the
//! thread's initial stack.
//!
//! - **Native targets**: grows the stack on demand with `stacker`.
//! - **WASM targets**: calls straight through.

/// Grow when less than this much stack remains (128KB).
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment (2MB).
const SEGMENT_SIZE: usize = 2 * 1024 * 1024;

/// Run `f`, first switching to a fresh stack segment if the current one is
/// nearly exhausted.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
