pub mod faults;
pub mod fixtures;
pub mod network;
pub mod session;

pub use faults::{FlakyCache, FlakyDocuments};
pub use fixtures::*;
pub use network::{SharedDocuments, TestDirectory};
pub use session::{SessionEngine, TestSession};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
