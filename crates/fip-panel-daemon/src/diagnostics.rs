//! Diagnostic dumps of frames the device rejected.

use std::path::{Path, PathBuf};

use chrono::Local;
use fip_panel_hw::Frame;
use image::ImageFormat;
use tracing::{info, warn};

/// File name prefix of rejected frame dumps.
pub const ERROR_BITMAP_PREFIX: &str = "fip_error_bitmap";

/// Path of a new dump in `dir`; never names an existing file.
pub fn error_bitmap_path(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d%H%M%S%3f").to_string();
    let mut path = dir.join(format!("{}{}.bmp", ERROR_BITMAP_PREFIX, stamp));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}{}_{}.bmp", ERROR_BITMAP_PREFIX, stamp, n));
        n += 1;
    }
    path
}

/// Writes `frame` as a BMP into `dir`, returning the path on success.
///
/// Best effort: failures are logged and swallowed.
pub fn dump_frame(dir: &Path, frame: &Frame) -> Option<PathBuf> {
    let path = error_bitmap_path(dir);
    match frame.to_rgb_image().save_with_format(&path, ImageFormat::Bmp) {
        Ok(()) => {
            info!("Rejected frame written to {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Could not write diagnostic bitmap {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_frame_writes_bmp() {
        let dir = tempfile::tempdir().unwrap();
        let mut frame = Frame::new();
        frame.set_pixel(0, 0, 0xFF0000);

        let path = dump_frame(dir.path(), &frame).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(ERROR_BITMAP_PREFIX));
        assert!(name.ends_with(".bmp"));

        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (320, 240));
    }

    #[test]
    fn test_dumps_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let first = dump_frame(dir.path(), &Frame::new()).unwrap();
        let second = dump_frame(dir.path(), &Frame::new()).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn test_unwritable_dir_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(dump_frame(&missing, &Frame::new()).is_none());
    }
}
