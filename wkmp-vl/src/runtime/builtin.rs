//! Stock media layout
//!
//! Audio is filed by artist, album, genre, year and composer; pictures by
//! date and directory; video by directory; Apple trailers by genre and date.

use super::{relative_dirs, ClassificationRuntime, PlaceCallback, PlacementRequest};
use crate::error::RuntimeFault;
use crate::surface::{keys, Surface};
use async_trait::async_trait;
use tracing::{debug, trace};
use wkmp_common::catalog::vocabulary::{aux_key, online_service, upnp_class};
use wkmp_common::catalog::MetaField;

const UNKNOWN: &str = "Unknown";

/// Playlists are handled by the playlist parser, not the layout
const SKIPPED_MIME_TYPES: [&str; 2] = ["audio/x-mpegurl", "audio/x-scpls"];

#[derive(Debug, Default)]
pub struct BuiltinLayout;

impl BuiltinLayout {
    pub fn new() -> Self {
        Self
    }

    async fn add_audio(&self, surface: &Surface, place: &dyn PlaceCallback) {
        let meta = |field: MetaField, default: &str| {
            surface
                .meta(field.key())
                .map(str::to_string)
                .unwrap_or_else(|| default.to_string())
        };

        let title = surface
            .meta(MetaField::Title.key())
            .map(str::to_string)
            .unwrap_or_else(|| surface.title());
        let artist = meta(MetaField::Artist, UNKNOWN);
        let album = meta(MetaField::Album, UNKNOWN);
        let genre = meta(MetaField::Genre, UNKNOWN);
        let composer = meta(MetaField::Composer, "None");
        let date = meta(MetaField::Date, UNKNOWN);
        let year = date.split('-').next().unwrap_or(UNKNOWN).to_string();

        let mut fields = surface.clone();
        fields.set_title(title.as_str());

        place_at(place, &fields, &["Audio", "All Audio"], upnp_class::CONTAINER).await;
        place_at(
            place,
            &fields,
            &["Audio", "Artists", artist.as_str(), "All Songs"],
            upnp_class::CONTAINER,
        )
        .await;

        let mut full_name = surface.clone();
        full_name.set_title(format!("{} - {} - {}", artist, album, title));
        place_at(place, &full_name, &["Audio", "All - full name"], upnp_class::CONTAINER).await;
        place_at(
            place,
            &full_name,
            &["Audio", "Artists", artist.as_str(), "All - full name"],
            upnp_class::CONTAINER,
        )
        .await;

        place_at(
            place,
            &fields,
            &["Audio", "Artists", artist.as_str(), album.as_str()],
            upnp_class::MUSIC_ALBUM,
        )
        .await;
        let albums = ["Audio", "Albums", album.as_str()];
        place_at(place, &fields, &albums, upnp_class::MUSIC_ALBUM).await;
        let genres = ["Audio", "Genres", genre.as_str()];
        place_at(place, &fields, &genres, upnp_class::MUSIC_GENRE).await;
        place_at(place, &fields, &["Audio", "Year", year.as_str()], upnp_class::CONTAINER).await;
        place_at(
            place,
            &fields,
            &["Audio", "Composers", composer.as_str()],
            upnp_class::MUSIC_COMPOSER,
        )
        .await;
    }

    async fn add_image(&self, surface: &Surface, import_path: &str, place: &dyn PlaceCallback) {
        if let Some(date) = surface.meta(MetaField::Date.key()) {
            let mut parts = date.split('-');
            match (parts.next(), parts.next()) {
                (Some(year), Some(month)) if !year.is_empty() && !month.is_empty() => {
                    place_at(
                        place,
                        surface,
                        &["Pictures", "Date", year, month],
                        upnp_class::CONTAINER,
                    )
                    .await;
                }
                _ => debug!(date = %date, "Image date has no year-month, skipping date placement"),
            }
        }

        let dirs = relative_dirs(&surface.location(), import_path);
        if !dirs.is_empty() {
            let mut chain = vec!["Pictures".to_string(), "Directories".to_string()];
            chain.extend(dirs);
            place.place(PlacementRequest::new(surface.clone(), chain, upnp_class::CONTAINER)).await;
        }
    }

    async fn add_video(&self, surface: &Surface, import_path: &str, place: &dyn PlaceCallback) {
        place_at(place, surface, &["Video", "All Video"], upnp_class::CONTAINER).await;

        let dirs = relative_dirs(&surface.location(), import_path);
        if !dirs.is_empty() {
            let mut chain = vec!["Video".to_string(), "Directories".to_string()];
            chain.extend(dirs);
            place.place(PlacementRequest::new(surface.clone(), chain, upnp_class::CONTAINER)).await;
        }
    }

    async fn add_trailer(&self, surface: &Surface, place: &dyn PlaceCallback) {
        const ROOT: [&str; 2] = ["Online Services", "Apple Trailers"];

        place_at(place, surface, &[ROOT[0], ROOT[1], "All Trailers"], upnp_class::CONTAINER).await;

        if let Some(genres) = surface.meta(MetaField::Genre.key()) {
            for genre in genres.split(", ").filter(|g| !g.is_empty()) {
                place_at(
                    place,
                    surface,
                    &[ROOT[0], ROOT[1], "Genres", genre],
                    upnp_class::CONTAINER,
                )
                .await;
            }
        }

        if let Some(month) = surface.meta(MetaField::Date.key()).and_then(year_month) {
            place_at(
                place,
                surface,
                &[ROOT[0], ROOT[1], "Release Date", month],
                upnp_class::CONTAINER,
            )
            .await;
        }

        if let Some(month) = surface.aux(aux_key::APPLE_TRAILERS_POST_DATE).and_then(year_month) {
            place_at(
                place,
                surface,
                &[ROOT[0], ROOT[1], "Post Date", month],
                upnp_class::CONTAINER,
            )
            .await;
        }
    }
}

#[async_trait]
impl ClassificationRuntime for BuiltinLayout {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn invoke(
        &mut self,
        surface: Surface,
        import_path: &str,
        place: &dyn PlaceCallback,
    ) -> Result<(), RuntimeFault> {
        let mime_type = surface.mime_type();
        if SKIPPED_MIME_TYPES.contains(&mime_type.as_str()) {
            trace!(mime_type = %mime_type, "Playlist, not laid out");
            return Ok(());
        }

        match mime_type.split('/').next().unwrap_or("") {
            "audio" => self.add_audio(&surface, place).await,
            "image" => self.add_image(&surface, import_path, place).await,
            "video" => {
                if surface.int(keys::ONLINE_SERVICE) == Some(online_service::APPLE_TRAILERS) {
                    self.add_trailer(&surface, place).await;
                } else {
                    self.add_video(&surface, import_path, place).await;
                }
            }
            _ => {}
        }

        if mime_type == "application/ogg" {
            if surface.int(keys::THEORA) == Some(1) {
                self.add_video(&surface, import_path, place).await;
            } else {
                self.add_audio(&surface, place).await;
            }
        }

        Ok(())
    }
}

async fn place_at(place: &dyn PlaceCallback, fields: &Surface, chain: &[&str], class: &str) {
    let chain = chain.iter().map(|s| s.to_string()).collect();
    place.place(PlacementRequest::new(fields.clone(), chain, class)).await;
}

/// `YYYY-MM` prefix of a date, if it has one
fn year_month(date: &str) -> Option<&str> {
    date.get(..7)
}
