use std::fs;
use std::io::Read;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::DynamicImage;
use ndarray::Array3;

use super::error::PipelineError;
use super::model::InputGeometry;

/// Where an uploaded image comes from.
pub enum ImageSource<'a> {
    /// A stream, read from its current position to the end
    Reader(&'a mut dyn Read),
    /// Encoded image bytes
    Bytes(&'a [u8]),
    /// An image file on disk
    Path(&'a Path),
}

impl<'a> From<&'a [u8]> for ImageSource<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ImageSource::Bytes(bytes)
    }
}

impl<'a> From<&'a Path> for ImageSource<'a> {
    fn from(path: &'a Path) -> Self {
        ImageSource::Path(path)
    }
}

/// Decodes the source. The format is sniffed from the content, not the file name.
pub fn decode_image(source: ImageSource<'_>) -> Result<DynamicImage, PipelineError> {
    let owned;
    let bytes: &[u8] = match source {
        ImageSource::Bytes(bytes) => bytes,
        ImageSource::Reader(reader) => {
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .map_err(|e| PipelineError::ImageDecode(format!("cannot read upload: {}", e)))?;
            owned = buf;
            &owned
        }
        ImageSource::Path(path) => {
            owned = fs::read(path)
                .map_err(|e| PipelineError::ImageDecode(format!("cannot read {:?}: {}", path, e)))?;
            &owned
        }
    };
    if bytes.is_empty() {
        return Err(PipelineError::ImageDecode("image data is empty".into()));
    }
    image::load_from_memory(bytes).map_err(|e| PipelineError::ImageDecode(e.to_string()))
}

/// Converts to RGB and resizes with a bicubic (Catmull-Rom) filter to the model geometry.
///
/// The result is `(height, width, 3)` with raw 0..=255 channel values; feature scaling is
/// applied later by the predictor.
pub fn normalize_image(image: &DynamicImage, geometry: &InputGeometry) -> Array3<f32> {
    let rgb = image.to_rgb8();
    let resized = if rgb.dimensions() == (geometry.width, geometry.height) {
        rgb
    } else {
        imageops::resize(&rgb, geometry.width, geometry.height, FilterType::CatmullRom)
    };
    Array3::from_shape_fn(
        (geometry.height as usize, geometry.width as usize, InputGeometry::CHANNELS),
        |(y, x, c)| f32::from(resized.get_pixel(x as u32, y as u32)[c]),
    )
}

/// Decodes and normalizes in one step.
pub fn load_normalized(
    source: ImageSource<'_>,
    geometry: &InputGeometry,
) -> Result<Array3<f32>, PipelineError> {
    let image = decode_image(source)?;
    Ok(normalize_image(&image, geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn geometry(height: u32, width: u32) -> InputGeometry {
        InputGeometry { height, width, ..InputGeometry::default() }
    }

    #[test]
    fn test_grayscale_becomes_three_channels() {
        let gray = GrayImage::from_pixel(10, 8, Luma([200]));
        let bytes = encode(DynamicImage::ImageLuma8(gray));
        let tensor = load_normalized(ImageSource::Bytes(&bytes), &geometry(4, 6)).unwrap();
        assert_eq!(tensor.shape(), &[4, 6, 3]);
        assert!(tensor.iter().all(|&v| (v - 200.0).abs() < 1e-3));
    }

    #[test]
    fn test_rgba_alpha_is_dropped() {
        let rgba = RgbaImage::from_pixel(5, 5, Rgba([10, 20, 30, 0]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba));
        let tensor = load_normalized(ImageSource::Bytes(&bytes), &geometry(5, 5)).unwrap();
        assert_eq!(tensor[[2, 2, 0]], 10.0);
        assert_eq!(tensor[[2, 2, 1]], 20.0);
        assert_eq!(tensor[[2, 2, 2]], 30.0);
    }

    #[test]
    fn test_palette_image_is_expanded() {
        // 1x1 GIF whose only pixel is palette entry 0 = (10, 20, 30)
        let gif: &[u8] = &[
            b'G', b'I', b'F', b'8', b'9', b'a', 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00,
            10, 20, 30, 0, 0, 0,
            0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00,
            0x02, 0x02, 0x44, 0x01, 0x00,
            0x3b,
        ];
        let tensor = load_normalized(ImageSource::Bytes(gif), &geometry(3, 3)).unwrap();
        assert_eq!(tensor.shape(), &[3, 3, 3]);
        for ((_, _, c), &v) in tensor.indexed_iter() {
            assert!((v - [10.0, 20.0, 30.0][c]).abs() <= 1.0);
        }
    }

    #[test]
    fn test_reader_source() {
        let gray = GrayImage::from_pixel(3, 3, Luma([0]));
        let bytes = encode(DynamicImage::ImageLuma8(gray));
        let mut reader = Cursor::new(bytes);
        let tensor = load_normalized(ImageSource::Reader(&mut reader), &geometry(7, 7)).unwrap();
        assert_eq!(tensor.shape(), &[7, 7, 3]);
    }

    #[test]
    fn test_path_source() {
        let dir = tempfile::tempdir().unwrap();
        // Extension deliberately wrong: the format is sniffed from content
        let path = dir.path().join("upload.jpg");
        let gray = GrayImage::from_pixel(16, 16, Luma([90]));
        std::fs::write(&path, encode(DynamicImage::ImageLuma8(gray))).unwrap();
        let tensor = load_normalized(ImageSource::Path(&path), &geometry(8, 8)).unwrap();
        assert_eq!(tensor.shape(), &[8, 8, 3]);
    }

    #[test]
    fn test_corrupt_data_is_decode_error() {
        for bytes in [&b""[..], &b"definitely not an image"[..], &[0x89, b'P', b'N', b'G'][..]] {
            let result = decode_image(ImageSource::Bytes(bytes));
            assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
        }
        let missing = decode_image(ImageSource::Path(Path::new("/nonexistent/scan.png")));
        assert!(matches!(missing, Err(PipelineError::ImageDecode(_))));
    }
}
