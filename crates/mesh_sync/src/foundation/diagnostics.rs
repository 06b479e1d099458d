//! Invariant verification hooks
//!
//! Verification failures are reported but never abort: callers use the
//! returned flag to degrade gracefully.

/// Check an invariant, logging an error when it does not hold
///
/// Returns the condition so call sites can write
/// `if !verify(topology.is_some(), "...") { return; }`.
pub fn verify(condition: bool, what: &str) -> bool {
    if !condition {
        log::error!("Verify failed: {}", what);
    }
    condition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_passes_condition_through() {
        assert!(verify(true, "always holds"));
        assert!(!verify(false, "never holds"));
    }
}
