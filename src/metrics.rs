use tracing::trace;

// Lightweight metrics helpers that are safe without a live recorder.
// The Prometheus endpoint in main.rs covers request-level series; these
// trace the pricing internals.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "bluberry.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn price_resolved(source: &'static str, elapsed_ms: u128) {
    trace!(
        target = "bluberry.metrics",
        source = source,
        elapsed_ms = elapsed_ms as u64,
        "price_resolved"
    );
}

pub fn search_strategy(strategy: &'static str, items: usize) {
    trace!(
        target = "bluberry.metrics",
        strategy = strategy,
        items = items,
        "search_strategy_items"
    );
}
