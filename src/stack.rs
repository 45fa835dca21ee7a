//! Stack growth for the recursive parser, printer and evaluator.
//!
//! Source nesting (parentheses, blocks, nested calls) maps directly onto
//! Rust recursion, so the hot recursive entry points run through
//! [`ensure_sufficient_stack`], which switches to a freshly allocated
//! segment when the current one runs low. Script recursion is still bounded
//! by `EvaluatorOptions::max_call_depth`; this only keeps the host from
//! overflowing before that limit is reached.

/// Grow when less than this much stack remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn depth(n: u64) -> u64 {
        ensure_sufficient_stack(|| if n == 0 { 0 } else { 1 + depth(n - 1) })
    }

    #[test]
    fn passes_result_through() {
        let result: Result<i32, String> = ensure_sufficient_stack(|| Ok(7));
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn deep_recursion_grows_the_stack() {
        assert_eq!(depth(200_000), 200_000);
    }
}
