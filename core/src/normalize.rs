use image::DynamicImage;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Decodes an in-memory byte stream (typically an extracted RAW preview)
/// and stands the result upright.
pub fn decode_oriented(bytes: &[u8], orientation: u32) -> Result<DynamicImage, DecodeError> {
    let image = image::load_from_memory(bytes).map_err(DecodeError::Malformed)?;
    Ok(apply_orientation(image, orientation))
}

/// Decodes a natively supported file straight from disk and stands the
/// result upright.
pub fn open_oriented(path: &Path, orientation: u32) -> Result<DynamicImage, DecodeError> {
    let image = image::open(path).map_err(DecodeError::Malformed)?;
    Ok(apply_orientation(image, orientation))
}

/// Applies the transform implied by a standard EXIF orientation code.
/// Codes outside 1-8 are treated as 1 (no transform).
///
/// 2 mirrors horizontally, 3 rotates 180, 4 mirrors vertically, 5 is the
/// main-diagonal transpose, 6 rotates 90 CW, 7 is the anti-diagonal
/// transpose, 8 rotates 270 CW.
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

#[derive(Debug)]
pub enum DecodeError {
    Malformed(image::ImageError),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(error) => write!(f, "cannot decode image: {}", error),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use std::io::Cursor;

    const MARK: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const FILL: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// 3x2 image with a single red marker in the top-left corner — the
    /// asymmetry makes every one of the eight transforms distinguishable.
    fn marker_image() -> DynamicImage {
        let mut image = RgbaImage::from_pixel(3, 2, FILL);
        image.put_pixel(0, 0, MARK);
        DynamicImage::ImageRgba8(image)
    }

    fn marker_position(image: &DynamicImage) -> (u32, u32) {
        for (x, y, pixel) in image.pixels() {
            if pixel == MARK {
                return (x, y);
            }
        }
        panic!("marker not found");
    }

    #[test]
    fn orientation_transforms_move_the_marker_correctly() {
        // (code, expected dimensions, expected marker position)
        let expectations = [
            (1, (3, 2), (0, 0)),
            (2, (3, 2), (2, 0)),
            (3, (3, 2), (2, 1)),
            (4, (3, 2), (0, 1)),
            (5, (2, 3), (0, 0)),
            (6, (2, 3), (1, 0)),
            (7, (2, 3), (1, 2)),
            (8, (2, 3), (0, 2)),
        ];

        for (code, dimensions, position) in expectations {
            let upright = apply_orientation(marker_image(), code);
            assert_eq!(
                upright.dimensions(),
                dimensions,
                "dimensions for code {code}"
            );
            assert_eq!(
                marker_position(&upright),
                position,
                "marker position for code {code}"
            );
        }
    }

    #[test]
    fn unknown_codes_leave_the_image_alone() {
        for code in [0, 9, 42] {
            let upright = apply_orientation(marker_image(), code);
            assert_eq!(upright.dimensions(), (3, 2));
            assert_eq!(marker_position(&upright), (0, 0));
        }
    }

    #[test]
    fn decode_oriented_round_trips_png_bytes() {
        let mut bytes = Vec::new();
        marker_image()
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let upright = decode_oriented(&bytes, 6).unwrap();
        assert_eq!(upright.dimensions(), (2, 3));
        assert_eq!(marker_position(&upright), (1, 0));
    }

    #[test]
    fn malformed_bytes_fail_to_decode() {
        let error = decode_oriented(b"definitely not an image", 1).unwrap_err();
        assert!(matches!(error, DecodeError::Malformed(_)));
    }
}
