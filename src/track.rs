//! TalkingBot // Track
//!
//! Playable audio items and the helpers used to display their durations.

use std::time::Duration;

/// Information about a playable audio item, as resolved by the audio node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Opaque identifier used by the audio node to start this track.
    pub encoded: String,

    /// Track title.
    pub title: String,

    /// URL where this track can be found by the users.
    pub url: String,

    /// Author of this track.
    pub author: String,

    /// Total length of the track.
    pub duration: Duration,

    /// URL of the artwork/thumbnail of this track.
    pub artwork_url: Option<String>,

    /// Whether the audio node can change the playback position of this track.
    pub seekable: bool,
}

impl Track {
    /// Returns true if both values refer to the same audio item on the node.
    pub fn is_same(&self, other: &Track) -> bool {
        self.encoded == other.encoded
    }

    /// Markdown link to this track, used in the display payloads.
    pub fn markdown_link(&self) -> String {
        format!("[**{}**]({})", self.title, self.url)
    }
}

/// Formats a duration as `hh:mm:ss`, sub-second precision is dropped.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();

    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_short_durations() {
        assert_eq!(format_duration(Duration::ZERO), "00:00:00");
        assert_eq!(format_duration(Duration::from_millis(1)), "00:00:00");
        assert_eq!(format_duration(Duration::from_secs(83)), "00:01:23");
    }

    #[test]
    fn formats_hours() {
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 5)), "03:00:05");
        assert_eq!(format_duration(Duration::from_secs(100 * 3600)), "100:00:00");
    }
}
