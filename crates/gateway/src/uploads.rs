use image::{DynamicImage, ImageError, ImageReader};
use inference::ImageSource;
use std::io;
use std::path::{Path, PathBuf};

const FALLBACK_NAME: &str = "upload";
const MAX_NAME_LEN: usize = 255;

/// Staging directory for uploaded images.
#[derive(Debug)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// Create the directory (and parents) if it does not exist.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under a fresh unique name.
    ///
    /// The client name is only kept, sanitised, for reporting.
    pub async fn stage(&self, original_name: &str, bytes: &[u8]) -> io::Result<StagedUpload> {
        let staged = StagedUpload {
            path: self.root.join(format!("{}.upload", uuid::Uuid::new_v4())),
            display_name: sanitize_filename(original_name),
        };

        // The guard is live before writing so a partial file is removed too
        tokio::fs::write(&staged.path, bytes).await?;

        tracing::debug!(
            filename = %staged.display_name,
            path = %staged.path.display(),
            bytes = bytes.len(),
            "Staged upload"
        );
        Ok(staged)
    }
}

/// An uploaded file on disk, removed when dropped.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    display_name: String,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for StagedUpload {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn load(&self) -> Result<DynamicImage, ImageError> {
        ImageReader::open(&self.path)?.with_guessed_format()?.decode()
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staged upload"
            ),
        }
    }
}

/// Reduce a client-supplied filename to a safe display name.
///
/// Keeps the last path component, replaces anything outside
/// `[A-Za-z0-9._-]` with `_` and strips leading dots.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed: String = cleaned
        .trim_start_matches('.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();

    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(4, 3))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("bunny.jpg"), "bunny.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\pic 1.png"), "pic_1.png");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("dir/"), "upload");
        assert_eq!(sanitize_filename("häschen.png"), "h_schen.png");
        assert_eq!(sanitize_filename(&"a".repeat(400)).len(), 255);
    }

    #[test]
    fn test_create_makes_missing_directories() {
        let tmp = tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");

        let dir = UploadDir::create(&nested).unwrap();
        assert!(dir.path().is_dir());
    }

    #[tokio::test]
    async fn test_staged_file_is_removed_on_drop() {
        let tmp = tempdir().unwrap();
        let dir = UploadDir::create(tmp.path()).unwrap();

        let staged = dir.stage("photo.png", &png_bytes()).await.unwrap();
        assert!(staged.path().exists());
        assert!(staged.path().starts_with(tmp.path()));
        assert_eq!(staged.display_name(), "photo.png");

        let image = staged.load().unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));

        drop(staged);
        assert_eq!(file_count(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_same_client_name_gets_distinct_paths() {
        let tmp = tempdir().unwrap();
        let dir = UploadDir::create(tmp.path()).unwrap();

        let a = dir.stage("same.png", b"one").await.unwrap();
        let b = dir.stage("same.png", b"two").await.unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read(a.path()).unwrap(), b"one");
        assert_eq!(std::fs::read(b.path()).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_traversal_name_stays_inside_staging_dir() {
        let tmp = tempdir().unwrap();
        let uploads = tmp.path().join("uploads");
        let dir = UploadDir::create(&uploads).unwrap();

        let staged = dir.stage("../../escape.png", b"x").await.unwrap();

        assert!(staged.path().starts_with(&uploads));
        assert_eq!(staged.display_name(), "escape.png");
        assert_eq!(file_count(tmp.path()), 1, "Only the uploads dir itself");
    }

    #[tokio::test]
    async fn test_staging_into_missing_dir_fails() {
        let tmp = tempdir().unwrap();
        let dir = UploadDir::create(tmp.path().join("gone")).unwrap();
        std::fs::remove_dir(dir.path()).unwrap();

        assert!(dir.stage("a.png", b"x").await.is_err());
    }

    #[test]
    fn test_undecodable_upload_reports_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.upload");
        std::fs::write(&path, b"nope").unwrap();
        let staged = StagedUpload {
            path,
            display_name: "bad.png".to_string(),
        };

        assert!(staged.load().is_err());
    }
}
