//! Tracing setup for the command-line tools
//!
//! Logs go to stderr so stdout only carries command results.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence. Otherwise this crate logs at info (debug with
/// `debug = true`) and dependencies at warn.
pub fn init_logging(debug: bool) -> anyhow::Result<()> {
    let default_filter = if debug {
        "nft_tools=debug,nft_deploy=debug,warn"
    } else {
        "nft_tools=info,nft_deploy=info,warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .with(env_filter)
        .try_init()?;

    Ok(())
}
