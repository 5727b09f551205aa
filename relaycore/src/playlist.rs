//! Fixed playlist of remote media items
//!
//! The playlist is loaded once from configuration at process start and never
//! mutated afterwards. Only the relay position moves; it lives in
//! [`crate::state::RelayState`], not here.

use crate::error::EmptyPlaylist;
use once_cell::sync::Lazy;
use regex::Regex;

/// Pattern matching `youtu.be/<id>` and `youtube.com/watch?v=<id>` URLs
static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtu\.be/|youtube\.com/watch\?v=)([^&\n?#]+)").expect("valid video id regex")
});

/// One immutable entry of the relay playlist
#[derive(Debug, Clone)]
pub struct PlaylistItem {
    /// Zero-based position inside the playlist
    pub position: usize,
    /// Opaque reference to the remote media item
    pub url: String,
    /// Video id extracted from the URL, when recognizable
    pub video_id: Option<String>,
}

impl PlaylistItem {
    /// Short identifier used in logs and staged file names
    pub fn short_id(&self) -> &str {
        self.video_id.as_deref().unwrap_or(&self.url)
    }
}

/// Extracts the video id from a media URL
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// The fixed, ordered list of media references the relay cycles through
#[derive(Debug)]
pub struct Playlist {
    items: Vec<PlaylistItem>,
}

impl Playlist {
    /// Builds a playlist from an ordered list of URLs
    ///
    /// Fails on an empty list: the relay position invariant requires at
    /// least one item.
    pub fn from_urls(urls: Vec<String>) -> Result<Self, EmptyPlaylist> {
        if urls.is_empty() {
            return Err(EmptyPlaylist);
        }

        let items = urls
            .into_iter()
            .enumerate()
            .map(|(position, url)| {
                let video_id = extract_video_id(&url);
                PlaylistItem {
                    position,
                    url,
                    video_id,
                }
            })
            .collect();

        Ok(Self { items })
    }

    /// Builds the playlist from the global configuration
    pub fn from_config() -> Result<Self, EmptyPlaylist> {
        Self::from_urls(relayconfig::get_config().get_playlist())
    }

    /// Number of items in the playlist
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false: construction rejects empty playlists
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range index. Callers obtain indices from
    /// [`crate::state::RelayState`], which keeps them in range.
    pub fn get(&self, index: usize) -> &PlaylistItem {
        &self.items[index]
    }

    /// All items in playlist order
    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_short_form_video_id() {
        assert_eq!(
            extract_video_id("https://youtu.be/BR3NFEXuSv0?si=mSCaAzM4r6NjbC5L"),
            Some("BR3NFEXuSv0".to_string())
        );
    }

    #[test]
    fn extracts_watch_form_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=nD2TZahdAJY&t=10"),
            Some("nD2TZahdAJY".to_string())
        );
    }

    #[test]
    fn unknown_urls_have_no_video_id() {
        assert_eq!(extract_video_id("https://example.com/video.mp4"), None);
    }

    #[test]
    fn playlist_keeps_order_and_positions() {
        let playlist = Playlist::from_urls(vec![
            "https://youtu.be/aaa".to_string(),
            "https://youtu.be/bbb".to_string(),
        ])
        .expect("playlist");

        assert_eq!(playlist.len(), 2);
        assert_eq!(playlist.get(0).video_id.as_deref(), Some("aaa"));
        assert_eq!(playlist.get(1).position, 1);
    }

    #[test]
    fn empty_playlist_is_rejected() {
        assert!(Playlist::from_urls(Vec::new()).is_err());
    }
}
