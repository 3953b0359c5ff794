use std::fs;
use std::path::{Path, PathBuf};

use failure::Error;
use image::ImageFormat;
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;

use crate::error::ExtractError;
use crate::formatting::degrees_to_dms;

/// What gets written into the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub make: String,
    pub model: Option<String>,
}

fn image_error<E: std::fmt::Display>(path: &Path, e: E) -> ExtractError {
    ExtractError::Image(format!("{}: {}", path.display(), e))
}

/// Sniff and fully decode an image, so that a truncated or mislabelled file is caught before we
/// touch it.
pub fn inspect(path: &Path) -> Result<ImageFormat, ExtractError> {
    let reader = image::io::Reader::open(path)
        .map_err(|e| image_error(path, e))?
        .with_guessed_format()
        .map_err(|e| image_error(path, e))?;
    let format = reader
        .format()
        .ok_or_else(|| image_error(path, "unrecognised image format"))?;
    reader.decode().map_err(|e| image_error(path, e))?;
    Ok(format)
}

/// The extension little_exif dispatches on, for the formats that can carry EXIF.
fn exif_extension(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::Tiff => Some("tiff"),
        ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}

fn rational(nominator: u32, denominator: u32) -> uR64 {
    uR64 { nominator, denominator }
}

fn dms(decimal: f64) -> Vec<uR64> {
    let (degrees, minutes, seconds) = degrees_to_dms(decimal, 4);
    vec![
        rational(degrees, 1),
        rational(minutes, 1),
        rational((seconds * 10_000.0).round() as u32, 10_000),
    ]
}

fn apply(metadata: &mut Metadata, annotation: &Annotation) {
    let lat_ref = if annotation.latitude < 0.0 { "S" } else { "N" };
    let lon_ref = if annotation.longitude < 0.0 { "W" } else { "E" };

    metadata.set_tag(ExifTag::GPSLatitudeRef(lat_ref.to_string()));
    metadata.set_tag(ExifTag::GPSLatitude(dms(annotation.latitude)));
    metadata.set_tag(ExifTag::GPSLongitudeRef(lon_ref.to_string()));
    metadata.set_tag(ExifTag::GPSLongitude(dms(annotation.longitude)));

    if let Some(altitude) = annotation.altitude {
        // 0 is above sea level, 1 below
        let below = if altitude < 0.0 { 1 } else { 0 };
        metadata.set_tag(ExifTag::GPSAltitudeRef(vec![below]));
        metadata.set_tag(ExifTag::GPSAltitude(vec![rational(
            (altitude.abs() * 1000.0).round() as u32,
            1000,
        )]));
    }

    metadata.set_tag(ExifTag::Make(annotation.make.clone()));
    if let Some(ref model) = annotation.model {
        metadata.set_tag(ExifTag::Model(model.clone()));
    }
}

/// Write the annotation into `image`'s EXIF block. With an `output` the original is left alone
/// and the annotated copy lands there instead. Returns the path that was written.
///
/// The work happens on a temporary copy next to the destination which is only moved into place
/// once the write succeeded, so a failure never leaves a half written file behind.
pub fn annotate_image(image: &Path, output: Option<&Path>, annotation: &Annotation) -> Result<PathBuf, Error> {
    if !image.is_file() {
        return Err(ExtractError::image_not_found(image).into());
    }
    let format = inspect(image)?;
    let extension = exif_extension(format)
        .ok_or_else(|| image_error(image, format!("{:?} images can't carry EXIF GPS tags", format)))?;

    let destination = output.unwrap_or(image).to_path_buf();
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let scratch = tempfile::Builder::new()
        .prefix(".gps-extract")
        .suffix(&format!(".{}", extension))
        .tempfile_in(&dir)
        .map_err(|e| image_error(&destination, e))?;
    fs::copy(image, scratch.path()).map_err(|e| image_error(image, e))?;

    let mut metadata = match Metadata::new_from_path(scratch.path()) {
        Ok(m) => m,
        Err(e) => {
            debug!("No existing EXIF in {:?} ({}), starting fresh", image, e);
            Metadata::new()
        }
    };
    apply(&mut metadata, annotation);
    metadata
        .write_to_file(scratch.path())
        .map_err(|e| image_error(&destination, e))?;

    let written = inspect(scratch.path())?;
    if written != format {
        return Err(image_error(&destination, format!("format changed from {:?} to {:?}", format, written)).into());
    }

    scratch
        .persist(&destination)
        .map_err(|e| image_error(&destination, e.error))?;
    info!("Wrote GPS tags to {:?}", &destination);
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_helpers::tempdir;
    use image::{Rgb, RgbImage};

    fn annotation() -> Annotation {
        Annotation {
            latitude: -33.856784,
            longitude: 151.215297,
            altitude: Some(42.5),
            make: "GoPro".into(),
            model: Some("HERO8 Black".into()),
        }
    }

    fn write_jpeg(path: &Path) {
        RgbImage::from_pixel(16, 16, Rgb([200, 40, 40])).save(path).unwrap();
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_annotates_a_copy() {
        let dir = tempdir();
        let original = dir.path().join("still.jpg");
        let copy = dir.path().join("still-gps.jpg");
        write_jpeg(&original);
        let before = fs::read(&original).unwrap();

        let written = annotate_image(&original, Some(&copy), &annotation()).unwrap();

        assert_eq!(written, copy);
        assert_eq!(fs::read(&original).unwrap(), before);
        assert_eq!(inspect(&copy).unwrap(), ImageFormat::Jpeg);
        let after = fs::read(&copy).unwrap();
        assert!(contains(&after, b"Exif"));
        assert!(contains(&after, b"HERO8 Black"));
    }

    #[test]
    fn test_annotates_in_place() {
        let dir = tempdir();
        let original = dir.path().join("still.jpg");
        write_jpeg(&original);

        annotate_image(&original, None, &annotation()).unwrap();

        assert_eq!(inspect(&original).unwrap(), ImageFormat::Jpeg);
        assert!(contains(&fs::read(&original).unwrap(), b"GoPro"));
        // Only the annotated file is left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_annotates_png_in_place() {
        let dir = tempdir();
        let still = dir.path().join("still.png");
        RgbImage::from_pixel(16, 16, Rgb([40, 200, 40])).save(&still).unwrap();

        annotate_image(&still, None, &annotation()).unwrap();

        assert_eq!(inspect(&still).unwrap(), ImageFormat::Png);
        let metadata = Metadata::new_from_path(&still).unwrap();
        match metadata.get_tag(&ExifTag::GPSLatitude(vec![])).next() {
            Some(ExifTag::GPSLatitude(parts)) => {
                let values: Vec<_> = parts.iter().map(|r| (r.nominator, r.denominator)).collect();
                assert_eq!(values, vec![(33, 1), (51, 1), (244_224, 10_000)]);
            }
            _ => panic!("no GPS latitude written to {:?}", still),
        }
    }

    #[test]
    fn test_rejects_formats_without_exif() {
        let dir = tempdir();
        let still = dir.path().join("still.bmp");
        RgbImage::from_pixel(16, 16, Rgb([40, 40, 200])).save(&still).unwrap();
        let before = fs::read(&still).unwrap();

        let err = annotate_image(&still, None, &annotation()).unwrap_err();
        match err.downcast_ref::<ExtractError>() {
            Some(ExtractError::Image(msg)) => assert!(msg.contains("can't carry EXIF"), "{}", msg),
            other => panic!("expected an image error, got {:?}", other),
        }
        assert_eq!(fs::read(&still).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_malformed_image() {
        let dir = tempdir();
        let bogus = dir.path().join("bogus.jpg");
        fs::write(&bogus, b"\xFF\xD8\xFF\xE0 definitely not a jpeg").unwrap();

        let err = annotate_image(&bogus, None, &annotation()).unwrap_err();
        let err = err.downcast_ref::<ExtractError>().unwrap();
        assert_eq!(err.kind(), ErrorKind::Output);
    }

    #[test]
    fn test_missing_image() {
        let dir = tempdir();
        let missing = dir.path().join("missing.jpg");

        let err = annotate_image(&missing, None, &annotation()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ExtractError>(),
            Some(&ExtractError::image_not_found(&missing))
        );
    }

    #[test]
    fn test_dms_rationals() {
        let parts = dms(-122.5);
        assert_eq!(parts[0].nominator, 122);
        assert_eq!(parts[1].nominator, 30);
        assert_eq!(parts[2].nominator, 0);
        assert_eq!(parts[2].denominator, 10_000);
    }

    #[test]
    fn test_dms_seconds_carry_into_degrees() {
        let parts = dms(37.99999999);
        let values: Vec<_> = parts.iter().map(|r| (r.nominator, r.denominator)).collect();
        assert_eq!(values, vec![(38, 1), (0, 1), (0, 10_000)]);
    }
}
