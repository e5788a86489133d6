//! TalkingBot // Queue
//!
//! Ordered collection of the tracks waiting to be played in a guild.

use std::{
    collections::{vec_deque, VecDeque},
    error,
    fmt::{self, Display, Formatter},
    result,
};

use crate::track::Track;

/// Position accepted by [`TrackQueue::remove_at`] to remove the last track.
pub const LAST_POSITION: i64 = -1;

/// Errors produced when removing tracks from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The 1-based position is not inside the queue.
    IndexOutOfRange {
        /// The requested position.
        position: i64,

        /// How many tracks the queue had.
        len: usize,
    },

    /// The last track was requested but the queue is empty.
    Empty,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { position, len } => {
                write!(f, "position {} is outside of the queue (1 to {})", position, len)
            }
            Self::Empty => write!(f, "the queue is empty"),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// FIFO queue of pending tracks, insertion order is playback order.
#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    tracks: VecDeque<Track>,
}

impl TrackQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track to the end of the queue.
    pub fn enqueue(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    /// Removes and returns the next track to be played.
    pub fn try_dequeue(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    /// Puts a track back in front of the queue.
    pub(crate) fn requeue_front(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    /// Removes the track at the 1-based `position`, or the last one with [`LAST_POSITION`].
    pub fn remove_at(&mut self, position: i64) -> Result<Track> {
        if position == LAST_POSITION {
            return self.tracks.pop_back().ok_or(Error::Empty);
        }

        let out_of_range = Error::IndexOutOfRange {
            position,
            len: self.tracks.len(),
        };

        let index = usize::try_from(position)
            .ok()
            .and_then(|p| p.checked_sub(1))
            .ok_or(out_of_range.clone())?;

        self.tracks.remove(index).ok_or(out_of_range)
    }

    /// Removes every track.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// How many tracks are waiting.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Iterates in playback order without consuming the queue.
    pub fn iter(&self) -> vec_deque::Iter<'_, Track> {
        self.tracks.iter()
    }
}

impl<'a> IntoIterator for &'a TrackQueue {
    type Item = &'a Track;
    type IntoIter = vec_deque::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn track(title: &str) -> Track {
        Track {
            encoded: format!("enc-{}", title),
            title: title.to_owned(),
            url: format!("https://example.com/{}", title),
            author: "author".to_owned(),
            duration: Duration::from_secs(180),
            artwork_url: None,
            seekable: true,
        }
    }

    fn titles(queue: &TrackQueue) -> Vec<&str> {
        queue.iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn dequeues_in_insertion_order() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        queue.enqueue(track("b"));
        assert_eq!(queue.try_dequeue().map(|t| t.title), Some("a".to_owned()));

        queue.enqueue(track("c"));
        assert_eq!(queue.try_dequeue().map(|t| t.title), Some("b".to_owned()));
        assert_eq!(queue.try_dequeue().map(|t| t.title), Some("c".to_owned()));
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn removes_last_with_sentinel() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        assert_eq!(queue.remove_at(LAST_POSITION).map(|t| t.title), Ok("a".to_owned()));

        queue.enqueue(track("a"));
        queue.enqueue(track("b"));
        queue.enqueue(track("c"));
        assert_eq!(queue.remove_at(LAST_POSITION).map(|t| t.title), Ok("c".to_owned()));
        assert_eq!(titles(&queue), ["a", "b"]);
    }

    #[test]
    fn remove_last_of_empty_queue_fails() {
        let mut queue = TrackQueue::new();
        assert_eq!(queue.remove_at(LAST_POSITION), Err(Error::Empty));
    }

    #[test]
    fn rejects_positions_outside_the_queue() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        queue.enqueue(track("b"));

        for position in [0, 3, 5, -2, i64::MIN, i64::MAX] {
            assert_eq!(
                queue.remove_at(position),
                Err(Error::IndexOutOfRange { position, len: 2 })
            );
        }

        assert_eq!(titles(&queue), ["a", "b"]);
    }

    #[test]
    fn removes_by_one_based_position() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        queue.enqueue(track("b"));
        queue.enqueue(track("c"));

        assert_eq!(queue.remove_at(2).map(|t| t.title), Ok("b".to_owned()));
        assert_eq!(queue.remove_at(1).map(|t| t.title), Ok("a".to_owned()));
        assert_eq!(titles(&queue), ["c"]);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = TrackQueue::new();
        queue.enqueue(track("a"));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
