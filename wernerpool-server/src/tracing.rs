//! Log subscriber setup for the pool daemon.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

/// Install the global subscriber for the daemon.
///
/// Under systemd, events go straight to journald, which stamps and indexes
/// records on its own. Anywhere else, lines go to stdout with a local
/// wall-clock stamp and no target column. The filter comes from `RUST_LOG`;
/// without one the pool logs at `info`, which covers startup, job
/// publication, connections, and blocks but not per-share chatter
/// (`RUST_LOG=wernerpool_server=debug` turns that on).
pub fn init() {
    if std::env::var_os("JOURNAL_STREAM").is_some()
        && let Ok(journald) = tracing_journald::layer()
    {
        tracing_subscriber::registry().with(journald).init();
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(WallClock)
                .with_target(false),
        )
        .init();
}

// Day-and-second timestamps: a pool daemon runs for weeks, so the date
// matters when scrolling back, while sub-second digits are noise at share
// cadence. Local time when the offset is known, UTC otherwise.
struct WallClock;

impl FormatTime for WallClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = time::OffsetDateTime::now_local()
            .unwrap_or_else(|_| time::OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!(
                "[month]-[day] [hour]:[minute]:[second]"
            ))
            .map_err(|_| std::fmt::Error)?;
        w.write_str(&stamp)
    }
}
