/// Gallery of uploaded images
/// Two-column grid of remote images, backed by the image registry
use iced::widget::image::Handle;
use iced::widget::{container, image, text};
use iced::{Border, Color, ContentFit, Element, Length};
use iced_aw::Wrap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Horizontal space reserved around each cell
pub const CELL_MARGIN: f32 = 15.0;

/// Height of a grid cell
pub const CELL_HEIGHT: f32 = 100.0;

/// Remote images are downscaled to fit this square before display
const THUMBNAIL_SIZE: u32 = 256;

/// Width of one grid cell for the given window width
pub fn cell_width(window_width: f32) -> f32 {
    (window_width / 2.0 - CELL_MARGIN).max(0.0)
}

/// Heading shown above the grid
pub fn heading(count: usize) -> &'static str {
    if count > 0 {
        "Your uploaded images"
    } else {
        "There is no image you uploaded"
    }
}

/// Display state of one remote image
#[derive(Debug, Clone)]
pub enum Thumbnail {
    Loading,
    Ready(Handle),
    Failed,
}

#[derive(Debug)]
pub struct Gallery {
    thumbnails: HashMap<String, Thumbnail>,
    cell_width: f32,
}

impl Gallery {
    pub fn new(window_width: f32) -> Self {
        Self {
            thumbnails: HashMap::new(),
            cell_width: cell_width(window_width),
        }
    }

    pub fn resize(&mut self, window_width: f32) {
        self.cell_width = cell_width(window_width);
    }

    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }

    pub fn thumbnail(&self, url: &str) -> Option<&Thumbnail> {
        self.thumbnails.get(url)
    }

    /// Drop state for URLs no longer listed and return the URLs that still
    /// have to be fetched. Returned URLs are marked as loading.
    pub fn sync(&mut self, urls: &[String]) -> Vec<String> {
        self.thumbnails.retain(|url, _| urls.contains(url));

        let mut pending = Vec::new();
        for url in urls {
            if !self.thumbnails.contains_key(url) {
                self.thumbnails.insert(url.clone(), Thumbnail::Loading);
                pending.push(url.clone());
            }
        }
        pending
    }

    /// Record the result of fetching `url`
    pub fn loaded(&mut self, url: &str, result: Result<Handle, String>) {
        let thumbnail = match result {
            Ok(handle) => Thumbnail::Ready(handle),
            Err(e) => {
                warn!("Failed to load {}: {}", url, e);
                Thumbnail::Failed
            }
        };
        // A result for a URL removed in the meantime is stale
        if let Some(slot) = self.thumbnails.get_mut(url) {
            *slot = thumbnail;
        }
    }

    /// Position of the first cell whose image failed to load
    pub fn first_failed(&self, urls: &[String]) -> Option<usize> {
        urls.iter()
            .position(|url| matches!(self.thumbnails.get(url), Some(Thumbnail::Failed)))
    }

    /// Build the grid for `urls`
    pub fn view<'a, Message: 'a>(&'a self, urls: &'a [String]) -> Element<'a, Message> {
        let cells: Vec<Element<'a, Message>> = urls
            .iter()
            .map(|url| self.cell(self.thumbnail(url)))
            .collect();

        Wrap::with_elements(cells).into()
    }

    fn cell<'a, Message: 'a>(&self, thumbnail: Option<&Thumbnail>) -> Element<'a, Message> {
        let content: Element<'a, Message> = match thumbnail {
            Some(Thumbnail::Ready(handle)) => image(handle.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .content_fit(ContentFit::Contain)
                .into(),
            Some(Thumbnail::Failed) => text("").into(),
            Some(Thumbnail::Loading) | None => text("…").size(14).into(),
        };

        container(
            container(content)
                .width(Length::Fixed(self.cell_width()))
                .height(Length::Fixed(CELL_HEIGHT))
                .center_x(Length::Fixed(self.cell_width()))
                .center_y(Length::Fixed(CELL_HEIGHT))
                .style(|_theme| container::Style {
                    background: Some(Color::from_rgb8(0xcc, 0xcc, 0xcc).into()),
                    border: Border {
                        color: Color::from_rgb8(0xee, 0xee, 0xee),
                        width: 1.0,
                        radius: 0.0.into(),
                    },
                    ..Default::default()
                }),
        )
        .padding(5)
        .into()
    }
}

/// Download `url` and decode it into a display-ready thumbnail.
///
/// Any failure (transport, HTTP status, undecodable bytes) is reported as an
/// error string; the caller treats all of them as a broken image.
pub async fn fetch_thumbnail(client: reqwest::Client, url: String) -> Result<Handle, String> {
    debug!("Fetching {}", url);

    let response = client
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| e.to_string())?;

    let bytes = response.bytes().await.map_err(|e| e.to_string())?;

    // Decoding is CPU-bound
    tokio::task::spawn_blocking(move || decode_thumbnail(&bytes))
        .await
        .map_err(|e| format!("Task join error: {}", e))?
}

/// Decode image bytes and downscale them to thumbnail size
pub fn decode_thumbnail(bytes: &[u8]) -> Result<Handle, String> {
    let img = ::image::load_from_memory(bytes)
        .map_err(|e| format!("Failed to decode image: {}", e))?;

    let thumbnail = img
        .resize(
            THUMBNAIL_SIZE,
            THUMBNAIL_SIZE,
            ::image::imageops::FilterType::Lanczos3,
        )
        .to_rgba8();
    let (width, height) = thumbnail.dimensions();

    Ok(Handle::from_rgba(width, height, thumbnail.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ::image::RgbaImage::from_pixel(width, height, ::image::Rgba([3, 154, 229, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ::image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_cell_width() {
        assert_eq!(cell_width(400.0), 185.0);
        assert_eq!(cell_width(20.0), 0.0);

        let mut gallery = Gallery::new(400.0);
        gallery.resize(800.0);
        assert_eq!(gallery.cell_width(), 385.0);
    }

    #[test]
    fn test_heading() {
        assert_eq!(heading(0), "There is no image you uploaded");
        assert_eq!(heading(2), "Your uploaded images");
    }

    #[test]
    fn test_sync_fetches_each_url_once_and_prunes() {
        let mut gallery = Gallery::new(400.0);

        let pending = gallery.sync(&urls(&["a", "b", "a"]));
        assert_eq!(pending, urls(&["a", "b"]));
        assert!(gallery.sync(&urls(&["a", "b", "a"])).is_empty());

        gallery.sync(&urls(&["b"]));
        assert!(gallery.thumbnail("a").is_none());
        assert!(matches!(gallery.thumbnail("b"), Some(Thumbnail::Loading)));
    }

    #[test]
    fn test_first_failed_reports_position() {
        let list = urls(&["ok", "broken", "ok2", "broken"]);
        let mut gallery = Gallery::new(400.0);
        gallery.sync(&list);

        gallery.loaded("ok", Ok(Handle::from_rgba(1, 1, vec![0u8; 4])));
        assert_eq!(gallery.first_failed(&list), None);

        gallery.loaded("broken", Err("404".to_string()));
        assert_eq!(gallery.first_failed(&list), Some(1));
        assert_eq!(gallery.first_failed(&list[2..]), Some(1));
    }

    #[test]
    fn test_stale_result_is_ignored() {
        let mut gallery = Gallery::new(400.0);
        gallery.loaded("gone", Err("404".to_string()));
        assert!(gallery.thumbnail("gone").is_none());
    }

    #[test]
    fn test_decode_thumbnail_downscales() {
        let handle = decode_thumbnail(&png_bytes(512, 128));
        assert!(handle.is_ok());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_thumbnail(b"<html>not found</html>").is_err());
    }

    #[tokio::test]
    async fn test_fetch_invalid_url_fails() {
        let result = fetch_thumbnail(reqwest::Client::new(), "not a url".to_string()).await;
        assert!(result.is_err());
    }
}
