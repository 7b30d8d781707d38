//! Tests for utility functions

use shared_line_appearance::util::{init_test_tracing, init_tracing};

#[test]
fn test_tracing_init_is_idempotent() {
    init_test_tracing();
    init_test_tracing();
    init_tracing();
    tracing::info!(target: "shared_line_appearance", "tracing initialized");
    assert!(tracing::dispatcher::has_been_set());
}
