//! Log setup
//!
//! Levels follow the CLI's numeric scale: 0 = errors only, 1 = info,
//! 2 = debug. Warnings ride along with info.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Map a numeric log level to a tracing level
pub fn level_for(log_level: u8) -> Result<Level> {
    match log_level {
        0 => Ok(Level::ERROR),
        1 => Ok(Level::INFO),
        2 => Ok(Level::DEBUG),
        other => anyhow::bail!("log level must be 0, 1 or 2, got {}", other),
    }
}

/// Install the global subscriber
///
/// Does nothing if a subscriber is already installed.
pub fn init(log_level: u8) -> Result<()> {
    let level = level_for(log_level)?;

    let installed = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .try_init();

    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(0).unwrap(), Level::ERROR);
        assert_eq!(level_for(1).unwrap(), Level::INFO);
        assert_eq!(level_for(2).unwrap(), Level::DEBUG);
        assert!(level_for(3).is_err());
    }

    #[test]
    fn test_init_twice() {
        init(1).unwrap();
        init(2).unwrap();
    }
}
