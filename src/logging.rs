use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_subscriber::fmt;

/// `--quiet` wins over `--verbose`.
pub fn level_for(quiet: bool, verbose: bool) -> Level {
    if quiet {
        Level::WARN
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Log ra stderr để stdout chỉ chứa output của lệnh (plan, list).
pub fn init_logging(level: Level) -> Result<()> {
    fmt::Subscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("init logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(false, false), Level::INFO);
        assert_eq!(level_for(false, true), Level::DEBUG);
        assert_eq!(level_for(true, true), Level::WARN);
    }
}
