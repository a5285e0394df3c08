use image::{
    DynamicImage, ImageError, RgbImage,
    error::{ParameterError, ParameterErrorKind},
};

/// Anything the pipeline can decode into an image.
pub trait ImageSource {
    /// Client-facing name, used only for reporting.
    fn display_name(&self) -> &str;

    fn load(&self) -> Result<DynamicImage, ImageError>;
}

/// Image bytes held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl InMemoryImage {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

impl ImageSource for InMemoryImage {
    fn display_name(&self) -> &str {
        &self.filename
    }

    fn load(&self) -> Result<DynamicImage, ImageError> {
        image::load_from_memory(&self.bytes)
    }
}

/// Decode a source and normalise its colour type to 8-bit RGB.
///
/// Images with no pixels are rejected here so they never reach a backend
/// group.
pub fn decode_rgb<S: ImageSource + ?Sized>(source: &S) -> Result<RgbImage, ImageError> {
    let image = source.load()?;

    if image.width() == 0 || image.height() == 0 {
        return Err(ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::Generic(format!(
                "image has zero size ({}x{})",
                image.width(),
                image.height()
            )),
        )));
    }

    if !matches!(image, DynamicImage::ImageRgb8(_)) {
        tracing::debug!(
            filename = source.display_name(),
            color = ?image.color(),
            "Converting image to RGB"
        );
    }

    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, LumaA, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_rgba_png_is_converted_to_rgb() {
        let rgba = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 128]));
        let source = InMemoryImage::new("alpha.png", encode(rgba.into(), ImageFormat::Png));

        let rgb = decode_rgb(&source).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_grayscale_is_expanded_to_three_channels() {
        let gray = image::ImageBuffer::from_pixel(2, 2, LumaA([200u8, 255]));
        let source = InMemoryImage::new(
            "gray.png",
            encode(DynamicImage::ImageLumaA8(gray), ImageFormat::Png),
        );

        let rgb = decode_rgb(&source).unwrap();
        assert_eq!(rgb.get_pixel(1, 1).0, [200, 200, 200]);
    }

    struct Decoded(DynamicImage);

    impl ImageSource for Decoded {
        fn display_name(&self) -> &str {
            "decoded"
        }

        fn load(&self) -> Result<DynamicImage, ImageError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_zero_sized_image_is_rejected() {
        let err = decode_rgb(&Decoded(DynamicImage::new_rgb8(0, 4))).unwrap_err();
        assert!(err.to_string().contains("zero size (0x4)"));
        assert!(decode_rgb(&Decoded(DynamicImage::new_rgb8(1, 1))).is_ok());
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let source = InMemoryImage::new("notes.txt", b"definitely not an image".to_vec());
        assert!(decode_rgb(&source).is_err());
    }
}
