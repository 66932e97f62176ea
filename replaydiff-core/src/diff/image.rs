//! Image content comparison.
//!
//! Both response bodies are decoded and reduced to an [`ImageInfo`]:
//! dimensions, format, frame count and three perceptual hashes. Decoding
//! failures are recorded as text in `ImageInfo::error` rather than
//! returned, so a broken replay image shows up as an `image_error` diff.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageDecoder, ImageFormat, ImageReader, ImageResult, Limits};

use crate::diff::engine::ContentComparer;
use crate::diff::hash::ImageHash;
use crate::diff::{
    AVERAGE_HASH, DIFFERENCE_HASH, DiffEntry, DiffResult, FORMAT, FRAME_NUM, HEIGHT, IMAGE_ERROR,
    PERCEPTION_HASH, WIDTH,
};
use crate::http;

// ── ImageInfo ────────────────────────────────────────────────────

/// What the content stage knows about one response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    /// Decoder error text; empty when decoding succeeded.
    pub error: String,
    pub width: u32,
    pub height: u32,
    /// Short lowercase format name (`png`, `jpeg`, `gif`, ...).
    pub format: String,
    /// Number of animation frames; 1 for still images, 0 if unknown.
    pub frame_num: u32,
    pub average_hash: Option<ImageHash>,
    pub difference_hash: Option<ImageHash>,
    pub perception_hash: Option<ImageHash>,
}

impl ImageInfo {
    /// Decode `data` and collect everything the comparison needs.
    pub fn parse(data: &[u8]) -> Self {
        let mut info = Self::default();
        // Frames are only counted for bodies that fully decode within the
        // default limits.
        if let Some(format) = info.parse_base(data) {
            if info.parse_hashes(data, format) {
                info.parse_frames(data, format);
            }
        }
        info
    }

    /// Header-only pass: format and dimensions.
    fn parse_base(&mut self, data: &[u8]) -> Option<ImageFormat> {
        let reader = match ImageReader::new(Cursor::new(data)).with_guessed_format() {
            Ok(reader) => reader,
            Err(e) => {
                self.error = e.to_string();
                return None;
            }
        };
        let Some(format) = reader.format() else {
            self.error = "image: unknown format".to_string();
            return None;
        };
        match reader.into_dimensions() {
            Ok((width, height)) => {
                self.width = width;
                self.height = height;
                self.format = format_name(format);
                Some(format)
            }
            Err(e) => {
                self.error = e.to_string();
                None
            }
        }
    }

    fn parse_frames(&mut self, data: &[u8], format: ImageFormat) {
        if format != ImageFormat::Gif {
            self.frame_num = 1;
            return;
        }
        if let Err(e) = self.count_gif_frames(data) {
            self.error = e.to_string();
        }
    }

    /// Counts frames up to the first decode error. The frame iterator keeps
    /// yielding the same error after a corrupt block, so it must not be
    /// drained past one.
    fn count_gif_frames(&mut self, data: &[u8]) -> ImageResult<()> {
        let mut decoder = GifDecoder::new(Cursor::new(data))?;
        // The GIF decoder starts without limits; the canvas of every frame
        // is sized from the declared screen.
        decoder.set_limits(Limits::default())?;
        for frame in decoder.into_frames() {
            frame?;
            self.frame_num += 1;
        }
        Ok(())
    }

    /// Full decode for the perceptual hashes.
    fn parse_hashes(&mut self, data: &[u8], format: ImageFormat) -> bool {
        match image::load_from_memory_with_format(data, format) {
            Ok(img) => {
                self.average_hash = Some(ImageHash::average(&img));
                self.difference_hash = Some(ImageHash::difference(&img));
                self.perception_hash = Some(ImageHash::perception(&img));
                true
            }
            Err(e) => {
                self.error = e.to_string();
                false
            }
        }
    }

    /// Add an entry to `result` for every field that differs from `replayed`.
    pub fn compare(&self, replayed: &ImageInfo, result: &mut DiffResult) {
        if self.error != replayed.error {
            result.insert(IMAGE_ERROR, DiffEntry::string(&self.error, &replayed.error));
        }
        if self.width != replayed.width {
            result.insert(WIDTH, DiffEntry::int(self.width.into(), replayed.width.into()));
        }
        if self.height != replayed.height {
            result.insert(HEIGHT, DiffEntry::int(self.height.into(), replayed.height.into()));
        }
        if self.format != replayed.format {
            result.insert(FORMAT, DiffEntry::string(&self.format, &replayed.format));
        }
        if self.frame_num != replayed.frame_num {
            result.insert(
                FRAME_NUM,
                DiffEntry::int(self.frame_num.into(), replayed.frame_num.into()),
            );
        }

        let hashes = [
            (AVERAGE_HASH, self.average_hash, replayed.average_hash),
            (DIFFERENCE_HASH, self.difference_hash, replayed.difference_hash),
            (PERCEPTION_HASH, self.perception_hash, replayed.perception_hash),
        ];
        for (field, original, replayed) in hashes {
            let distance = hash_distance(original, replayed);
            if distance != 0 {
                result.insert(field, DiffEntry::int(distance.into(), 0));
            }
        }
    }
}

/// Missing or incomparable hashes count as distance 0.
fn hash_distance(original: Option<ImageHash>, replayed: Option<ImageHash>) -> u32 {
    match (original, replayed) {
        (Some(a), Some(b)) => a.distance(&b).unwrap_or(0),
        _ => 0,
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        other => other
            .extensions_str()
            .first()
            .map(|ext| ext.to_string())
            .unwrap_or_else(|| format!("{other:?}").to_lowercase()),
    }
}

// ── ImageComparer ────────────────────────────────────────────────

/// Default content stage: treats both bodies as images.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageComparer;

impl ContentComparer for ImageComparer {
    fn compare_content(&self, original: &[u8], replayed: &[u8], result: &mut DiffResult) {
        let original = ImageInfo::parse(&http::body(original));
        let replayed = ImageInfo::parse(&http::body(replayed));
        original.compare(&replayed, result);
    }
}
