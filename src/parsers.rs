//! TalkingBot // Parsers
//!
//! Parsers for the values typed by the users in the slash commands.

use std::time::Duration;

use regex::Regex;

/// Parses the `mm:ss` timecodes used by `play` and `goto`.
pub struct TimecodeParser {
    parser: Regex,
}

impl TimecodeParser {
    /// Creates a new instance of the timecode parser.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            parser: Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*:\s*(\d+(?:\.\d+)?)\s*$")?,
        })
    }

    /// Parses a `mm:ss` timecode, both parts may carry decimals.
    ///
    /// Only exactly two numeric parts separated by a colon are accepted.
    pub fn parse(&self, data: &str) -> Option<Duration> {
        let captures = self.parser.captures(data)?;

        let minutes = captures.get(1)?.as_str().parse::<f64>().ok()?;
        let seconds = captures.get(2)?.as_str().parse::<f64>().ok()?;

        Duration::try_from_secs_f64(minutes * 60.0 + seconds).ok()
    }
}
