//! Controlled vocabulary for catalog metadata and resource attributes
//!
//! Rule code sees metadata and resource attributes by their wire keys
//! (`dc:title`, `protocolInfo`, ...). Only keys enumerated here may flow back
//! from a rule surface into a catalog object; anything else is dropped.
//!
//! Each entry also has a symbol (`M_TITLE`, `R_SIZE`) under which rule
//! runtimes publish the key to rule code.

use serde::{Deserialize, Serialize};

/// Metadata fields accepted into a catalog object's metadata mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetaField {
    #[serde(rename = "dc:title")]
    Title,
    #[serde(rename = "upnp:artist")]
    Artist,
    #[serde(rename = "upnp:album")]
    Album,
    #[serde(rename = "dc:date")]
    Date,
    #[serde(rename = "upnp:date")]
    UpnpDate,
    #[serde(rename = "upnp:genre")]
    Genre,
    #[serde(rename = "dc:description")]
    Description,
    #[serde(rename = "upnp:longDescription")]
    LongDescription,
    #[serde(rename = "upnp:episodeSeason")]
    PartNumber,
    #[serde(rename = "upnp:originalTrackNumber")]
    TrackNumber,
    #[serde(rename = "upnp:albumArtURI")]
    AlbumArtUri,
    #[serde(rename = "upnp:region")]
    Region,
    #[serde(rename = "dc:creator")]
    Creator,
    #[serde(rename = "upnp:author")]
    Author,
    #[serde(rename = "upnp:director")]
    Director,
    #[serde(rename = "dc:publisher")]
    Publisher,
    #[serde(rename = "upnp:rating")]
    Rating,
    #[serde(rename = "upnp:actor")]
    Actor,
    #[serde(rename = "upnp:producer")]
    Producer,
    #[serde(rename = "upnp:albumArtist")]
    AlbumArtist,
    #[serde(rename = "upnp:composer")]
    Composer,
    #[serde(rename = "upnp:conductor")]
    Conductor,
    #[serde(rename = "upnp:orchestra")]
    Orchestra,
}

impl MetaField {
    /// Every metadata field, in vocabulary order
    pub const ALL: [MetaField; 23] = [
        MetaField::Title,
        MetaField::Artist,
        MetaField::Album,
        MetaField::Date,
        MetaField::UpnpDate,
        MetaField::Genre,
        MetaField::Description,
        MetaField::LongDescription,
        MetaField::PartNumber,
        MetaField::TrackNumber,
        MetaField::AlbumArtUri,
        MetaField::Region,
        MetaField::Creator,
        MetaField::Author,
        MetaField::Director,
        MetaField::Publisher,
        MetaField::Rating,
        MetaField::Actor,
        MetaField::Producer,
        MetaField::AlbumArtist,
        MetaField::Composer,
        MetaField::Conductor,
        MetaField::Orchestra,
    ];

    /// Wire key used in the `meta` namespace of a rule surface
    pub fn key(self) -> &'static str {
        match self {
            MetaField::Title => "dc:title",
            MetaField::Artist => "upnp:artist",
            MetaField::Album => "upnp:album",
            MetaField::Date => "dc:date",
            MetaField::UpnpDate => "upnp:date",
            MetaField::Genre => "upnp:genre",
            MetaField::Description => "dc:description",
            MetaField::LongDescription => "upnp:longDescription",
            MetaField::PartNumber => "upnp:episodeSeason",
            MetaField::TrackNumber => "upnp:originalTrackNumber",
            MetaField::AlbumArtUri => "upnp:albumArtURI",
            MetaField::Region => "upnp:region",
            MetaField::Creator => "dc:creator",
            MetaField::Author => "upnp:author",
            MetaField::Director => "upnp:director",
            MetaField::Publisher => "dc:publisher",
            MetaField::Rating => "upnp:rating",
            MetaField::Actor => "upnp:actor",
            MetaField::Producer => "upnp:producer",
            MetaField::AlbumArtist => "upnp:albumArtist",
            MetaField::Composer => "upnp:composer",
            MetaField::Conductor => "upnp:conductor",
            MetaField::Orchestra => "upnp:orchestra",
        }
    }

    /// Symbol exposed to rule code
    pub fn symbol(self) -> &'static str {
        match self {
            MetaField::Title => "M_TITLE",
            MetaField::Artist => "M_ARTIST",
            MetaField::Album => "M_ALBUM",
            MetaField::Date => "M_DATE",
            MetaField::UpnpDate => "M_UPNP_DATE",
            MetaField::Genre => "M_GENRE",
            MetaField::Description => "M_DESCRIPTION",
            MetaField::LongDescription => "M_LONGDESCRIPTION",
            MetaField::PartNumber => "M_PARTNUMBER",
            MetaField::TrackNumber => "M_TRACKNUMBER",
            MetaField::AlbumArtUri => "M_ALBUMARTURI",
            MetaField::Region => "M_REGION",
            MetaField::Creator => "M_CREATOR",
            MetaField::Author => "M_AUTHOR",
            MetaField::Director => "M_DIRECTOR",
            MetaField::Publisher => "M_PUBLISHER",
            MetaField::Rating => "M_RATING",
            MetaField::Actor => "M_ACTOR",
            MetaField::Producer => "M_PRODUCER",
            MetaField::AlbumArtist => "M_ALBUMARTIST",
            MetaField::Composer => "M_COMPOSER",
            MetaField::Conductor => "M_CONDUCTOR",
            MetaField::Orchestra => "M_ORCHESTRA",
        }
    }

    /// Look up a field by its wire key
    pub fn from_key(key: &str) -> Option<MetaField> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }

    /// Look up a field by its rule-code symbol
    pub fn from_symbol(symbol: &str) -> Option<MetaField> {
        Self::ALL.iter().copied().find(|f| f.symbol() == symbol)
    }
}

/// Resource attributes accepted into a resource's attribute map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResAttr {
    #[serde(rename = "size")]
    Size,
    #[serde(rename = "duration")]
    Duration,
    #[serde(rename = "bitrate")]
    Bitrate,
    #[serde(rename = "sampleFrequency")]
    SampleFrequency,
    #[serde(rename = "nrAudioChannels")]
    NrAudioChannels,
    #[serde(rename = "resolution")]
    Resolution,
    #[serde(rename = "colorDepth")]
    ColorDepth,
    #[serde(rename = "protocolInfo")]
    ProtocolInfo,
    #[serde(rename = "resFile")]
    ResourceFile,
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "fanArtObject")]
    FanArtObjectId,
    #[serde(rename = "fanArtResource")]
    FanArtResourceId,
    #[serde(rename = "bitsPerSample")]
    BitsPerSample,
    #[serde(rename = "language")]
    Language,
    #[serde(rename = "audioCodec")]
    AudioCodec,
    #[serde(rename = "videoCodec")]
    VideoCodec,
}

impl ResAttr {
    pub const ALL: [ResAttr; 16] = [
        ResAttr::Size,
        ResAttr::Duration,
        ResAttr::Bitrate,
        ResAttr::SampleFrequency,
        ResAttr::NrAudioChannels,
        ResAttr::Resolution,
        ResAttr::ColorDepth,
        ResAttr::ProtocolInfo,
        ResAttr::ResourceFile,
        ResAttr::Type,
        ResAttr::FanArtObjectId,
        ResAttr::FanArtResourceId,
        ResAttr::BitsPerSample,
        ResAttr::Language,
        ResAttr::AudioCodec,
        ResAttr::VideoCodec,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ResAttr::Size => "size",
            ResAttr::Duration => "duration",
            ResAttr::Bitrate => "bitrate",
            ResAttr::SampleFrequency => "sampleFrequency",
            ResAttr::NrAudioChannels => "nrAudioChannels",
            ResAttr::Resolution => "resolution",
            ResAttr::ColorDepth => "colorDepth",
            ResAttr::ProtocolInfo => "protocolInfo",
            ResAttr::ResourceFile => "resFile",
            ResAttr::Type => "type",
            ResAttr::FanArtObjectId => "fanArtObject",
            ResAttr::FanArtResourceId => "fanArtResource",
            ResAttr::BitsPerSample => "bitsPerSample",
            ResAttr::Language => "language",
            ResAttr::AudioCodec => "audioCodec",
            ResAttr::VideoCodec => "videoCodec",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ResAttr::Size => "R_SIZE",
            ResAttr::Duration => "R_DURATION",
            ResAttr::Bitrate => "R_BITRATE",
            ResAttr::SampleFrequency => "R_SAMPLEFREQUENCY",
            ResAttr::NrAudioChannels => "R_NRAUDIOCHANNELS",
            ResAttr::Resolution => "R_RESOLUTION",
            ResAttr::ColorDepth => "R_COLORDEPTH",
            ResAttr::ProtocolInfo => "R_PROTOCOLINFO",
            ResAttr::ResourceFile => "R_RESOURCE_FILE",
            ResAttr::Type => "R_TYPE",
            ResAttr::FanArtObjectId => "R_FANART_OBJ_ID",
            ResAttr::FanArtResourceId => "R_FANART_RES_ID",
            ResAttr::BitsPerSample => "R_BITS_PER_SAMPLE",
            ResAttr::Language => "R_LANGUAGE",
            ResAttr::AudioCodec => "R_AUDIOCODEC",
            ResAttr::VideoCodec => "R_VIDEOCODEC",
        }
    }

    pub fn from_key(key: &str) -> Option<ResAttr> {
        Self::ALL.iter().copied().find(|a| a.key() == key)
    }

    pub fn from_symbol(symbol: &str) -> Option<ResAttr> {
        Self::ALL.iter().copied().find(|a| a.symbol() == symbol)
    }
}

/// UPnP class strings used for containers and items
pub mod upnp_class {
    pub const CONTAINER: &str = "object.container";
    pub const MUSIC_ALBUM: &str = "object.container.album.musicAlbum";
    pub const MUSIC_GENRE: &str = "object.container.genre.musicGenre";
    pub const MUSIC_ARTIST: &str = "object.container.person.musicArtist";
    pub const MUSIC_COMPOSER: &str = "object.container.person.musicComposer";
    pub const PLAYLIST_CONTAINER: &str = "object.container.playlistContainer";

    pub const ITEM: &str = "object.item";
    pub const AUDIO_ITEM: &str = "object.item.audioItem";
    pub const MUSIC_TRACK: &str = "object.item.audioItem.musicTrack";
    pub const VIDEO_ITEM: &str = "object.item.videoItem";
    pub const IMAGE_ITEM: &str = "object.item.imageItem";

    /// (symbol, class) pairs published to rule code
    pub const SYMBOLS: [(&str, &str); 11] = [
        ("UPNP_CLASS_CONTAINER", CONTAINER),
        ("UPNP_CLASS_CONTAINER_MUSIC_ALBUM", MUSIC_ALBUM),
        ("UPNP_CLASS_CONTAINER_MUSIC_GENRE", MUSIC_GENRE),
        ("UPNP_CLASS_CONTAINER_MUSIC_ARTIST", MUSIC_ARTIST),
        ("UPNP_CLASS_CONTAINER_MUSIC_COMPOSER", MUSIC_COMPOSER),
        ("UPNP_CLASS_PLAYLIST_CONTAINER", PLAYLIST_CONTAINER),
        ("UPNP_CLASS_ITEM", ITEM),
        ("UPNP_CLASS_AUDIO_ITEM", AUDIO_ITEM),
        ("UPNP_CLASS_ITEM_MUSIC_TRACK", MUSIC_TRACK),
        ("UPNP_CLASS_VIDEO_ITEM", VIDEO_ITEM),
        ("UPNP_CLASS_IMAGE_ITEM", IMAGE_ITEM),
    ];

    /// Class published under `symbol`
    pub fn from_symbol(symbol: &str) -> Option<&'static str> {
        SYMBOLS.iter().find(|(s, _)| *s == symbol).map(|(_, class)| *class)
    }
}

/// Auxiliary data keys with a fixed meaning
pub mod aux_key {
    /// Online service type code, present when the ONLINE_SERVICE flag is set
    pub const ONLINE_SERVICE_ID: &str = "os";
    /// Original posting date of an Apple trailer (YYYY-MM-DD)
    pub const APPLE_TRAILERS_POST_DATE: &str = "T0";
}

/// Online service type codes
pub mod online_service {
    pub const NONE: i64 = 0;
    pub const APPLE_TRAILERS: i64 = 2;
}
