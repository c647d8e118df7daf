pub mod builders;
pub mod probe_task;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Uses `with_test_writer()`, so output is captured per-test and the Rust
/// test harness only prints it for failing tests (unless `-- --nocapture`).
///
/// The filter honours `DAGRUN_LOG` first, then `RUST_LOG`, then `info`:
/// `DAGRUN_LOG=dagrun=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("DAGRUN_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}
