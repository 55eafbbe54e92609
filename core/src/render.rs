use crate::cache::{EntryTags, SOFTWARE_TAG};
use crate::tier::SizeTier;
use image::imageops::FilterType;
use image::DynamicImage;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Scales a normalized image down to a tier's longest-edge target,
/// preserving aspect ratio. Sources already within the target are passed
/// through unscaled — a thumbnail is never an enlargement.
pub fn render(image: &DynamicImage, tier: SizeTier) -> DynamicImage {
    let target = tier.pixels();
    let longest = image.width().max(image.height());
    if longest <= target {
        image.clone()
    } else {
        image.resize(target, target, FilterType::Lanczos3)
    }
}

/// Serializes a rendered thumbnail to PNG with the cache metadata embedded
/// as `tEXt` chunks. The `Thumb::URI`/`Thumb::MTime`/`Thumb::Size` keys are
/// the compatibility contract that lets any cache consumer detect
/// staleness without touching the source file's hash again.
pub fn encode_png(image: &DynamicImage, tags: &EntryTags) -> Result<Vec<u8>, RenderError> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut bytes = Vec::new();
    let mut encoder = png::Encoder::new(&mut bytes, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .add_text_chunk(String::from("Thumb::URI"), tags.uri.clone())
        .map_err(RenderError::Encode)?;
    encoder
        .add_text_chunk(String::from("Thumb::MTime"), tags.mtime.to_string())
        .map_err(RenderError::Encode)?;
    encoder
        .add_text_chunk(String::from("Thumb::Size"), tags.size.to_string())
        .map_err(RenderError::Encode)?;
    encoder
        .add_text_chunk(String::from("Software"), String::from(SOFTWARE_TAG))
        .map_err(RenderError::Encode)?;

    let mut writer = encoder.write_header().map_err(RenderError::Encode)?;
    writer
        .write_image_data(rgba.as_raw())
        .map_err(RenderError::Encode)?;
    writer.finish().map_err(RenderError::Encode)?;

    Ok(bytes)
}

#[derive(Debug)]
pub enum RenderError {
    Encode(png::EncodingError),
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(error) => write!(f, "png encoding failed: {}", error),
        }
    }
}

impl Error for RenderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode(error) => Some(error),
        }
    }
}
