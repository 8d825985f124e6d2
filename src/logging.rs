use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static SUBSCRIBER: OnceCell<()> = OnceCell::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global fmt subscriber. `RUST_LOG` overrides the default `info` level.
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    SUBSCRIBER.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .try_init();
    });
}

/// Subscriber for unit tests, writing through the libtest capture.
pub fn init_test_logging() {
    SUBSCRIBER.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_test_writer()
            .try_init();
    });
}
