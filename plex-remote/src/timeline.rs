//! Timeline payload decoding.
//!
//! Players report their state as
//!
//! ```xml
//! <MediaContainer location="fullScreenVideo" commandID="4">
//!   <Timeline type="video" state="playing" time="1000" seekRange="0-600000"/>
//!   <Timeline type="music" state="stopped"/>
//!   <Timeline type="photo" state="stopped"/>
//! </MediaContainer>
//! ```
//!
//! [`TimelineSnapshot::decode`] keeps the outer attributes and one
//! [`TimelineEntry`] per child, keyed by its `type`. Every payload produces a
//! fresh snapshot; nothing is merged with earlier ones.

use std::collections::BTreeMap;

use xmltree::{Element, XMLNode};

use crate::media::MediaClass;

/// Where the player's UI currently is
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Browsing; nothing is playing
    Navigation,
    FullScreenVideo,
    FullScreenMusic,
    FullScreenPhoto,
    Other(String),
}

impl Location {
    pub fn parse(value: &str) -> Self {
        match value {
            "navigation" => Location::Navigation,
            "fullScreenVideo" => Location::FullScreenVideo,
            "fullScreenMusic" => Location::FullScreenMusic,
            "fullScreenPhoto" => Location::FullScreenPhoto,
            other => Location::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Location::Navigation => "navigation",
            Location::FullScreenVideo => "fullScreenVideo",
            Location::FullScreenMusic => "fullScreenMusic",
            Location::FullScreenPhoto => "fullScreenPhoto",
            Location::Other(other) => other,
        }
    }

    /// The timeline entry that describes what is on screen.
    pub fn media_class(&self) -> Option<MediaClass> {
        match self {
            Location::FullScreenVideo => Some(MediaClass::Video),
            Location::FullScreenMusic => Some(MediaClass::Music),
            Location::FullScreenPhoto => Some(MediaClass::Photo),
            Location::Navigation | Location::Other(_) => None,
        }
    }
}

/// State of one media class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineEntry {
    attributes: BTreeMap<String, String>,
}

impl TimelineEntry {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn media_type(&self) -> Option<&str> {
        self.get("type")
    }

    /// Playback position as reported (milliseconds).
    pub fn time(&self) -> Option<&str> {
        self.get("time")
    }

    pub fn time_ms(&self) -> Option<u64> {
        self.time()?.parse().ok()
    }

    pub fn duration(&self) -> Option<&str> {
        self.get("duration")
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration()?.parse().ok()
    }

    /// `playing`, `paused`, `stopped` or `buffering`
    pub fn state(&self) -> Option<&str> {
        self.get("state")
    }

    pub fn key(&self) -> Option<&str> {
        self.get("key")
    }

    pub fn volume(&self) -> Option<u8> {
        self.get("volume")?.parse().ok()
    }

    /// `seekRange="start-end"` in milliseconds.
    pub fn seek_range(&self) -> Option<(u64, u64)> {
        let (start, end) = self.get("seekRange")?.split_once('-')?;
        Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
    }

    /// Actions the player currently accepts, e.g. `playPause`, `seekTo`.
    pub fn controllable(&self) -> Vec<&str> {
        self.get("controllable")
            .map(|list| list.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// One decoded timeline payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineSnapshot {
    attributes: BTreeMap<String, String>,
    entries: BTreeMap<String, TimelineEntry>,
}

impl TimelineSnapshot {
    /// Decode a payload. Malformed input yields `None`.
    pub fn decode(payload: &str) -> Option<Self> {
        let root = match Element::parse(payload.as_bytes()) {
            Ok(root) => root,
            Err(e) => {
                tracing::debug!(error = %e, "undecodable timeline payload");
                return None;
            }
        };

        let attributes = root
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let entries = root
            .children
            .iter()
            .filter_map(|node| match node {
                XMLNode::Element(child) => Some(child),
                _ => None,
            })
            .filter_map(|child| {
                let media_type = child.attributes.get("type")?.clone();
                let attributes = child
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Some((media_type, TimelineEntry { attributes }))
            })
            .collect();

        Some(Self {
            attributes,
            entries,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn location(&self) -> Option<Location> {
        self.attribute("location").map(Location::parse)
    }

    pub fn command_id(&self) -> Option<u64> {
        self.attribute("commandID")?.parse().ok()
    }

    pub fn entry(&self, media_type: &str) -> Option<&TimelineEntry> {
        self.entries.get(media_type)
    }

    pub fn entries(&self) -> &BTreeMap<String, TimelineEntry> {
        &self.entries
    }

    pub fn video(&self) -> Option<&TimelineEntry> {
        self.entry(MediaClass::Video.as_str())
    }

    pub fn music(&self) -> Option<&TimelineEntry> {
        self.entry(MediaClass::Music.as_str())
    }

    pub fn photo(&self) -> Option<&TimelineEntry> {
        self.entry(MediaClass::Photo.as_str())
    }

    /// The entry for the media class shown full screen, if any.
    pub fn active(&self) -> Option<&TimelineEntry> {
        let class = self.location()?.media_class()?;
        self.entry(class.as_str())
    }

    /// `true` unless the player reports the navigation location.
    ///
    /// A payload without a location counts as not playing.
    pub fn is_playing(&self) -> bool {
        matches!(self.location(), Some(location) if location != Location::Navigation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const PLAYING: &str = r#"<MediaContainer location="fullScreenVideo" commandID="3">
  <Timeline type="video" state="playing" time="1000" duration="600000" seekRange="0-600000" controllable="playPause,stop,seekTo" volume="80" key="/library/metadata/10"/>
  <Timeline type="music" state="stopped"/>
  <Timeline type="photo" state="stopped"/>
</MediaContainer>"#;

    #[test]
    fn test_decode_playing_video() {
        let snapshot = TimelineSnapshot::decode(PLAYING).unwrap();

        assert_eq!(snapshot.location(), Some(Location::FullScreenVideo));
        assert_eq!(snapshot.command_id(), Some(3));
        assert!(snapshot.is_playing());

        let video = snapshot.video().unwrap();
        assert_eq!(video.time(), Some("1000"));
        assert_eq!(video.time_ms(), Some(1000));
        assert_eq!(video.duration_ms(), Some(600000));
        assert_eq!(video.seek_range(), Some((0, 600000)));
        assert_eq!(video.state(), Some("playing"));
        assert_eq!(video.controllable(), vec!["playPause", "stop", "seekTo"]);
        assert_eq!(video.volume(), Some(80));
        assert_eq!(video.key(), Some("/library/metadata/10"));

        assert_eq!(snapshot.active(), Some(video));
        assert_eq!(snapshot.music().and_then(TimelineEntry::state), Some("stopped"));
        assert_eq!(snapshot.entries().len(), 3);
    }

    #[test]
    fn test_navigation_is_not_playing() {
        let snapshot = TimelineSnapshot::decode(
            r#"<MediaContainer location="navigation"><Timeline type="video" state="stopped"/></MediaContainer>"#,
        )
        .unwrap();

        assert!(!snapshot.is_playing());
        assert!(snapshot.active().is_none());
        assert!(snapshot.video().is_some());
    }

    #[test]
    fn test_missing_location_is_not_playing() {
        let snapshot = TimelineSnapshot::decode("<MediaContainer/>").unwrap();
        assert!(!snapshot.is_playing());
        assert!(snapshot.entries().is_empty());
    }

    #[test]
    fn test_entries_without_type_are_skipped() {
        let snapshot = TimelineSnapshot::decode(
            r#"<MediaContainer location="fullScreenMusic"><Timeline state="playing"/><Timeline type="music" time="5"/></MediaContainer>"#,
        )
        .unwrap();

        assert_eq!(snapshot.entries().len(), 1);
        assert_eq!(snapshot.active().and_then(TimelineEntry::time), Some("5"));
    }

    #[rstest]
    #[case("")]
    #[case("not xml at all")]
    #[case("<MediaContainer>")]
    #[case("<a></b>")]
    fn test_malformed_payload(#[case] payload: &str) {
        assert!(TimelineSnapshot::decode(payload).is_none());
    }

    #[rstest]
    #[case("navigation", Location::Navigation, None)]
    #[case("fullScreenVideo", Location::FullScreenVideo, Some(MediaClass::Video))]
    #[case("fullScreenMusic", Location::FullScreenMusic, Some(MediaClass::Music))]
    #[case("fullScreenPhoto", Location::FullScreenPhoto, Some(MediaClass::Photo))]
    fn test_location_mapping(
        #[case] raw: &str,
        #[case] expected: Location,
        #[case] class: Option<MediaClass>,
    ) {
        let location = Location::parse(raw);
        assert_eq!(location, expected);
        assert_eq!(location.as_str(), raw);
        assert_eq!(location.media_class(), class);
    }

    #[test]
    fn test_bad_seek_range() {
        let snapshot = TimelineSnapshot::decode(
            r#"<MediaContainer><Timeline type="video" seekRange="abc"/></MediaContainer>"#,
        )
        .unwrap();
        assert_eq!(snapshot.video().unwrap().seek_range(), None);
    }

    proptest! {
        #[test]
        fn prop_playing_iff_not_navigation(location in "[a-zA-Z]{1,16}") {
            let payload = format!(
                r#"<MediaContainer location="{location}"><Timeline type="video" time="1"/></MediaContainer>"#
            );
            let snapshot = TimelineSnapshot::decode(&payload).unwrap();
            prop_assert_eq!(snapshot.is_playing(), location != "navigation");
        }
    }
}
