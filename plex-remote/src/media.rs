//! Typed media metadata.
//!
//! Library entries arrive as flat attribute maps. [`MediaItem::classify`] turns
//! each one into a tagged variant over a shared [`MediaBase`], so the rest of
//! the crate matches on kinds instead of probing string keys.

use std::collections::BTreeMap;

use http_client::{HttpClient, Method};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::device::Device;
use crate::error::MediaError;
use crate::identity::Headers;

/// Identifier of the built-in library provider on a media server.
pub const LIBRARY_IDENTIFIER: &str = "com.plexapp.plugins.library";

/// Characters left unescaped when a key is embedded in a queue URI.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The server's `type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Unknown,
    Movie,
    Show,
    Season,
    Episode,
    Artist,
    Album,
    Track,
    Photo,
    Video,
    Directory,
    Clip,
    Playlist,
    PhotoAlbum,
    Picture,
    Trailer,
    Channel,
    Mixed,
}

impl MediaKind {
    /// Map a `type` string; anything unrecognised is `Unknown`.
    pub fn from_type_str(value: &str) -> Self {
        match value {
            "movie" => MediaKind::Movie,
            "show" => MediaKind::Show,
            "season" => MediaKind::Season,
            "episode" => MediaKind::Episode,
            "artist" => MediaKind::Artist,
            "album" => MediaKind::Album,
            "track" | "song" => MediaKind::Track,
            "photo" => MediaKind::Photo,
            "video" => MediaKind::Video,
            "directory" => MediaKind::Directory,
            "clip" => MediaKind::Clip,
            "playlist" => MediaKind::Playlist,
            "photoalbum" => MediaKind::PhotoAlbum,
            "picture" => MediaKind::Picture,
            "trailer" => MediaKind::Trailer,
            "channel" | "plugin" => MediaKind::Channel,
            "mixed" => MediaKind::Mixed,
            _ => MediaKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Unknown => "unknown",
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Season => "season",
            MediaKind::Episode => "episode",
            MediaKind::Artist => "artist",
            MediaKind::Album => "album",
            MediaKind::Track => "track",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Directory => "directory",
            MediaKind::Clip => "clip",
            MediaKind::Playlist => "playlist",
            MediaKind::PhotoAlbum => "photoalbum",
            MediaKind::Picture => "picture",
            MediaKind::Trailer => "trailer",
            MediaKind::Channel => "channel",
            MediaKind::Mixed => "mixed",
        }
    }
}

/// Media class a queue or player command is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Music,
    Video,
    Photo,
}

impl MediaClass {
    /// Tracks and albums are music, photos and pictures are photo, the rest is video.
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Track | MediaKind::Album => MediaClass::Music,
            MediaKind::Photo | MediaKind::Picture | MediaKind::PhotoAlbum => MediaClass::Photo,
            _ => MediaClass::Video,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaClass::Music => "music",
            MediaClass::Video => "video",
            MediaClass::Photo => "photo",
        }
    }
}

/// Container element an item was delivered in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    Directory,
    Video,
    Track,
    Photo,
    Playlist,
    Other(String),
}

impl ElementType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Directory" => ElementType::Directory,
            "Video" => ElementType::Video,
            "Track" => ElementType::Track,
            "Photo" => ElementType::Photo,
            "Playlist" => ElementType::Playlist,
            other => ElementType::Other(other.to_string()),
        }
    }

    /// Guess the element for payloads that only carry `type`.
    pub fn infer(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Movie | MediaKind::Episode | MediaKind::Clip | MediaKind::Video
            | MediaKind::Trailer => ElementType::Video,
            MediaKind::Track => ElementType::Track,
            MediaKind::Photo | MediaKind::Picture => ElementType::Photo,
            MediaKind::Playlist => ElementType::Playlist,
            _ => ElementType::Directory,
        }
    }
}

/// Fields every media item shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBase {
    pub key: String,
    pub rating_key: Option<String>,
    pub title: String,
    pub kind: MediaKind,
    pub element: ElementType,
    /// Resume position in milliseconds, present while in progress
    pub view_offset: Option<u64>,
    pub last_viewed_at: Option<i64>,
    /// Server-assigned id of this entry inside a play queue
    pub play_queue_item_id: Option<u64>,
    /// `identifier` of the container the item was listed in
    pub library_identifier: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

/// A classified media item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    Movie(MediaBase),
    Episode(MediaBase),
    Clip(MediaBase),
    Video(MediaBase),
    Track(MediaBase),
    Photo(MediaBase),
    Directory(MediaBase),
    Other(MediaBase),
}

impl MediaItem {
    /// Classify an attribute map.
    ///
    /// `_elementType` selects the family (inferred from `type` when absent)
    /// and `type` the variant within it.
    pub fn classify(attributes: BTreeMap<String, String>) -> Self {
        Self::classify_in(attributes, None)
    }

    /// Classify an item listed in a container with the given `identifier`.
    pub fn classify_in(
        attributes: BTreeMap<String, String>,
        library_identifier: Option<&str>,
    ) -> Self {
        let kind = attributes
            .get("type")
            .map(|t| MediaKind::from_type_str(t))
            .unwrap_or(MediaKind::Unknown);
        let element = attributes
            .get("_elementType")
            .map(|name| ElementType::from_name(name))
            .unwrap_or_else(|| ElementType::infer(kind));

        let base = MediaBase {
            key: attributes.get("key").cloned().unwrap_or_default(),
            rating_key: attributes.get("ratingKey").cloned(),
            title: attributes.get("title").cloned().unwrap_or_default(),
            kind,
            element: element.clone(),
            view_offset: attributes.get("viewOffset").and_then(|v| v.parse().ok()),
            last_viewed_at: attributes.get("lastViewedAt").and_then(|v| v.parse().ok()),
            play_queue_item_id: attributes
                .get("playQueueItemID")
                .and_then(|v| v.parse().ok()),
            library_identifier: library_identifier.map(str::to_string),
            attributes,
        };

        match element {
            ElementType::Directory => MediaItem::Directory(base),
            ElementType::Video | ElementType::Track | ElementType::Photo => match kind {
                MediaKind::Movie => MediaItem::Movie(base),
                MediaKind::Episode => MediaItem::Episode(base),
                MediaKind::Clip | MediaKind::Trailer => MediaItem::Clip(base),
                MediaKind::Track => MediaItem::Track(base),
                MediaKind::Photo | MediaKind::Picture => MediaItem::Photo(base),
                _ => match element {
                    ElementType::Track => MediaItem::Track(base),
                    ElementType::Photo => MediaItem::Photo(base),
                    _ => MediaItem::Video(base),
                },
            },
            ElementType::Playlist | ElementType::Other(_) => MediaItem::Other(base),
        }
    }

    pub fn base(&self) -> &MediaBase {
        match self {
            MediaItem::Movie(base)
            | MediaItem::Episode(base)
            | MediaItem::Clip(base)
            | MediaItem::Video(base)
            | MediaItem::Track(base)
            | MediaItem::Photo(base)
            | MediaItem::Directory(base)
            | MediaItem::Other(base) => base,
        }
    }

    pub fn key(&self) -> &str {
        &self.base().key
    }

    pub fn title(&self) -> &str {
        &self.base().title
    }

    pub fn kind(&self) -> MediaKind {
        self.base().kind
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.base().attributes.get(name).map(String::as_str)
    }

    pub fn play_queue_item_id(&self) -> Option<u64> {
        self.base().play_queue_item_id
    }

    pub fn view_offset(&self) -> Option<u64> {
        self.base().view_offset
    }

    pub fn is_directory(&self) -> bool {
        self.base().element == ElementType::Directory
    }

    /// `true` if the item has a resume position
    pub fn in_progress(&self) -> bool {
        self.base().view_offset.is_some()
    }

    /// `true` if the item was viewed to the end
    pub fn watched(&self) -> bool {
        self.base().last_viewed_at.is_some() && !self.in_progress()
    }

    /// `true` if the watched state can be changed on the server
    pub fn markable(&self) -> bool {
        let base = self.base();
        matches!(base.element, ElementType::Video | ElementType::Track)
            && base.library_identifier.as_deref() == Some(LIBRARY_IDENTIFIER)
    }

    /// Label for the item's parent (Artist, Album, Show, ...)
    pub fn parent_name(&self) -> &'static str {
        match self.kind() {
            MediaKind::Album => "Artist",
            MediaKind::Track | MediaKind::Photo => "Album",
            MediaKind::Season => "Show",
            MediaKind::Episode => "Season",
            _ => "Parent",
        }
    }

    pub fn grandparent_name(&self) -> &'static str {
        match self.kind() {
            MediaKind::Track => "Artist",
            MediaKind::Episode => "Show",
            _ => "Grandparent",
        }
    }

    /// Reference used to put this item in a play queue.
    pub fn reference(&self) -> MediaReference {
        MediaReference {
            key: self.key().to_string(),
            is_directory: self.is_directory(),
            kind: self.kind(),
        }
    }

    /// Mark the item as watched on `server`.
    pub fn mark_watched(&self, server: &Device, http: &HttpClient) -> Result<(), MediaError> {
        self.scrobble(server, http, "/:/scrobble")
    }

    /// Mark the item as unwatched on `server`.
    pub fn mark_unwatched(&self, server: &Device, http: &HttpClient) -> Result<(), MediaError> {
        self.scrobble(server, http, "/:/unscrobble")
    }

    fn scrobble(&self, server: &Device, http: &HttpClient, endpoint: &str) -> Result<(), MediaError> {
        let base = self.base();
        let rating_key = base
            .rating_key
            .clone()
            .ok_or_else(|| MediaError::MissingRatingKey(base.key.clone()))?;
        let identifier = base
            .library_identifier
            .clone()
            .unwrap_or_else(|| LIBRARY_IDENTIFIER.to_string());

        let params = vec![
            ("key".to_string(), rating_key),
            ("identifier".to_string(), identifier),
        ];
        let response = server.request(http, Method::Get, endpoint, &Headers::new(), &params)?;

        if response.is_success() {
            Ok(())
        } else {
            Err(MediaError::Status(response.status))
        }
    }
}

/// Pointer to a library entry, enough to enqueue it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub key: String,
    pub is_directory: bool,
    pub kind: MediaKind,
}

impl MediaReference {
    pub fn new(key: impl Into<String>, is_directory: bool, kind: MediaKind) -> Self {
        Self {
            key: key.into(),
            is_directory,
            kind,
        }
    }

    pub fn media_class(&self) -> MediaClass {
        MediaClass::for_kind(self.kind)
    }

    /// `library://<client-id>/<directory|item>/<encoded key>`
    pub fn queue_uri(&self, client_identifier: &str) -> String {
        format!(
            "library://{}/{}/{}",
            client_identifier,
            if self.is_directory { "directory" } else { "item" },
            utf8_percent_encode(&self.key, KEY_ENCODE_SET)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Connection, DeviceRole};
    use mockito::{Matcher, Server};
    use rstest::rstest;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case("track", MediaClass::Music)]
    #[case("song", MediaClass::Music)]
    #[case("album", MediaClass::Music)]
    #[case("episode", MediaClass::Video)]
    #[case("season", MediaClass::Video)]
    #[case("show", MediaClass::Video)]
    #[case("movie", MediaClass::Video)]
    #[case("video", MediaClass::Video)]
    #[case("clip", MediaClass::Video)]
    #[case("photo", MediaClass::Photo)]
    #[case("picture", MediaClass::Photo)]
    #[case("artist", MediaClass::Video)]
    #[case("something-new", MediaClass::Video)]
    fn test_media_class(#[case] type_str: &str, #[case] expected: MediaClass) {
        assert_eq!(MediaClass::for_kind(MediaKind::from_type_str(type_str)), expected);
    }

    #[rstest]
    #[case("Video", "movie", "Movie")]
    #[case("Video", "episode", "Episode")]
    #[case("Video", "clip", "Clip")]
    #[case("Video", "unknown", "Video")]
    #[case("Track", "track", "Track")]
    #[case("Track", "", "Track")]
    #[case("Photo", "photo", "Photo")]
    #[case("Directory", "show", "Directory")]
    #[case("Directory", "album", "Directory")]
    #[case("Playlist", "playlist", "Other")]
    fn test_classify(#[case] element: &str, #[case] type_str: &str, #[case] variant: &str) {
        let item = MediaItem::classify(attrs(&[
            ("_elementType", element),
            ("type", type_str),
            ("key", "/library/metadata/1"),
        ]));
        let name = match item {
            MediaItem::Movie(_) => "Movie",
            MediaItem::Episode(_) => "Episode",
            MediaItem::Clip(_) => "Clip",
            MediaItem::Video(_) => "Video",
            MediaItem::Track(_) => "Track",
            MediaItem::Photo(_) => "Photo",
            MediaItem::Directory(_) => "Directory",
            MediaItem::Other(_) => "Other",
        };
        assert_eq!(name, variant);
    }

    #[test]
    fn test_classify_infers_element_from_type() {
        let movie = MediaItem::classify(attrs(&[("type", "movie"), ("key", "/m/1")]));
        assert!(matches!(movie, MediaItem::Movie(_)));
        assert!(!movie.is_directory());

        let show = MediaItem::classify(attrs(&[("type", "show"), ("key", "/s/1/children")]));
        assert!(matches!(show, MediaItem::Directory(_)));
        assert!(show.is_directory());
    }

    #[test]
    fn test_progress_and_watched() {
        let fresh = MediaItem::classify(attrs(&[("type", "movie")]));
        assert!(!fresh.in_progress());
        assert!(!fresh.watched());

        let partial = MediaItem::classify(attrs(&[
            ("type", "movie"),
            ("viewOffset", "125000"),
            ("lastViewedAt", "1700000000"),
        ]));
        assert!(partial.in_progress());
        assert_eq!(partial.view_offset(), Some(125000));
        assert!(!partial.watched());

        let done = MediaItem::classify(attrs(&[("type", "movie"), ("lastViewedAt", "1700000000")]));
        assert!(done.watched());
    }

    #[test]
    fn test_markable_requires_library_video_or_track() {
        let movie = attrs(&[("_elementType", "Video"), ("type", "movie")]);
        assert!(MediaItem::classify_in(movie.clone(), Some(LIBRARY_IDENTIFIER)).markable());
        assert!(!MediaItem::classify_in(movie, Some("com.plexapp.plugins.youtube")).markable());

        let photo = attrs(&[("_elementType", "Photo"), ("type", "photo")]);
        assert!(!MediaItem::classify_in(photo, Some(LIBRARY_IDENTIFIER)).markable());
    }

    #[test]
    fn test_parent_names() {
        let episode = MediaItem::classify(attrs(&[("type", "episode")]));
        assert_eq!(episode.parent_name(), "Season");
        assert_eq!(episode.grandparent_name(), "Show");

        let track = MediaItem::classify(attrs(&[("type", "track")]));
        assert_eq!(track.parent_name(), "Album");
        assert_eq!(track.grandparent_name(), "Artist");
    }

    #[test]
    fn test_queue_uri_encodes_key() {
        let item = MediaReference::new("/library/metadata/123", false, MediaKind::Movie);
        assert_eq!(
            item.queue_uri("abc-123"),
            "library://abc-123/item/%2Flibrary%2Fmetadata%2F123"
        );

        let dir = MediaReference::new("/library/metadata/9/children?x=a b", true, MediaKind::Season);
        assert_eq!(
            dir.queue_uri("abc-123"),
            "library://abc-123/directory/%2Flibrary%2Fmetadata%2F9%2Fchildren%3Fx%3Da%20b"
        );
        assert_eq!(dir.media_class(), MediaClass::Video);
    }

    #[test]
    fn test_reference_from_item() {
        let album = MediaItem::classify(attrs(&[
            ("_elementType", "Directory"),
            ("type", "album"),
            ("key", "/library/metadata/7/children"),
        ]));
        let reference = album.reference();
        assert!(reference.is_directory);
        assert_eq!(reference.media_class(), MediaClass::Music);
    }

    #[test]
    fn test_mark_watched() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/:/scrobble")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "42".into()),
                Matcher::UrlEncoded("identifier".into(), LIBRARY_IDENTIFIER.into()),
            ]))
            .with_status(200)
            .expect(1)
            .create();

        let device = Device::new("NAS", "server-1", DeviceRole::Server)
            .with_active_connection(Connection::from_url(&server.url()).unwrap());
        let item = MediaItem::classify_in(
            attrs(&[("_elementType", "Video"), ("type", "movie"), ("ratingKey", "42")]),
            Some(LIBRARY_IDENTIFIER),
        );

        item.mark_watched(&device, &HttpClient::new()).unwrap();
        mock.assert();
    }

    #[test]
    fn test_mark_unwatched_failure() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", "/:/unscrobble")
            .match_query(Matcher::Any)
            .with_status(500)
            .create();

        let device = Device::new("NAS", "server-1", DeviceRole::Server)
            .with_active_connection(Connection::from_url(&server.url()).unwrap());
        let item = MediaItem::classify(attrs(&[("type", "movie"), ("ratingKey", "42")]));

        assert!(matches!(
            item.mark_unwatched(&device, &HttpClient::new()),
            Err(MediaError::Status(500))
        ));

        let no_key = MediaItem::classify(attrs(&[("type", "movie")]));
        assert!(matches!(
            no_key.mark_watched(&device, &HttpClient::new()),
            Err(MediaError::MissingRatingKey(_))
        ));
    }
}
