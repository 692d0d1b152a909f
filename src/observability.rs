//! Log level selection and optional subscriber installation.
//!
//! Every module logs through `tracing` under a `scie_lift::<area>` target.
//! Library users install their own subscriber; the `logging` feature offers
//! a stderr subscriber driven by a signed verbosity.

use tracing::Level;

/// Maps a signed verbosity to the most detailed level shown.
///
/// `-1` and below show only errors, `0` adds warnings, `1` adds info and `2`
/// or more shows debug output.
#[must_use]
pub const fn level_for(verbosity: i8) -> Level {
    match verbosity {
        i8::MIN..=-1 => Level::ERROR,
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Installs a stderr `fmt` subscriber at the level for `verbosity`.
///
/// # Errors
///
/// Returns an error when a global subscriber is already installed.
#[cfg(feature = "logging")]
pub fn init_logging(verbosity: i8) -> color_eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level_for(verbosity))
        .with_writer(std::io::stderr)
        .without_time()
        .try_init()
        .map_err(|err| color_eyre::eyre::eyre!(err))?;
    tracing::debug!(target: LOG_TARGET, verbosity, "logging initialised");
    Ok(())
}

#[cfg(feature = "logging")]
const LOG_TARGET: &str = "scie_lift::observability";

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(i8::MIN, Level::ERROR)]
    #[case(-1, Level::ERROR)]
    #[case(0, Level::WARN)]
    #[case(1, Level::INFO)]
    #[case(2, Level::DEBUG)]
    #[case(i8::MAX, Level::DEBUG)]
    fn verbosity_maps_to_levels(#[case] verbosity: i8, #[case] level: Level) {
        assert_eq!(level_for(verbosity), level);
    }
}
