pub mod local;

use tracing::debug;

use crate::error::{Result, ValidationErrors};
use crate::ingest::{hasher, ImageFile};
use crate::media::mimetype;

pub use local::LocalObjectStorage;

pub const ARTWORK_BUCKET: &str = "artworks";
pub const AVATAR_BUCKET: &str = "avatars";

/// `<owner>/<file>` under a bucket.
const OBJECT_PATH_SEGMENTS: usize = 2;

pub const PRIMARY_IMAGE_FIELD: &str = "primaryImage";
pub const AVATAR_FIELD: &str = "avatar";

/// Durable blob storage addressed by bucket and object path.
pub trait ObjectStorage {
    fn upload(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    fn remove(&self, bucket: &str, paths: &[String]) -> Result<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Object path behind a stored public URL. URLs minted under another
    /// base fall back to the trailing `<owner>/<file>` segments that every
    /// upload path uses.
    fn object_path(&self, bucket: &str, url: &str) -> String {
        let prefix = self.public_url(bucket, "");
        if let Some(path) = url.strip_prefix(prefix.as_str()).filter(|p| !p.is_empty()) {
            return path.to_string();
        }
        let url = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
        let mut segments: Vec<&str> = url
            .rsplit('/')
            .filter(|s| !s.is_empty())
            .take(OBJECT_PATH_SEGMENTS)
            .collect();
        segments.reverse();
        segments.join("/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    pub mime: String,
    pub extension: &'static str,
    pub digest: String,
}

fn check_type(image: &ImageFile, field: &str) -> std::result::Result<ValidatedImage, ValidationErrors> {
    let mime = mimetype::detect_mimetype(&image.bytes, image.declared_mime.as_deref());
    match mimetype::extension_for(&mime) {
        Some(extension) if mimetype::is_accepted_image(&mime) => Ok(ValidatedImage {
            digest: hasher::hash_bytes(&image.bytes),
            mime,
            extension,
        }),
        _ => Err(ValidationErrors::single(
            field,
            format!("Unsupported image type {mime}; use JPEG, PNG or WebP"),
        )),
    }
}

/// Checks an artwork image before upload: non-empty, at most `max_bytes`,
/// and one of the accepted image types.
pub fn validate_artwork_image(
    image: &ImageFile,
    max_bytes: usize,
) -> std::result::Result<ValidatedImage, ValidationErrors> {
    if image.bytes.is_empty() {
        return Err(ValidationErrors::single(PRIMARY_IMAGE_FIELD, "Image file is empty"));
    }
    if image.size() > max_bytes {
        return Err(ValidationErrors::single(
            PRIMARY_IMAGE_FIELD,
            format!(
                "Image must be {} MB or smaller",
                max_bytes / (1024 * 1024)
            ),
        ));
    }
    check_type(image, PRIMARY_IMAGE_FIELD)
}

/// Avatars only have their type checked.
pub fn validate_avatar(image: &ImageFile) -> std::result::Result<ValidatedImage, ValidationErrors> {
    if image.bytes.is_empty() {
        return Err(ValidationErrors::single(AVATAR_FIELD, "Image file is empty"));
    }
    check_type(image, AVATAR_FIELD)
}

pub fn artwork_object_path(owner_id: &str, artwork_id: &str, validated: &ValidatedImage) -> String {
    format!(
        "{owner_id}/{artwork_id}-{}.{}",
        &validated.digest[..16],
        validated.extension
    )
}

pub fn avatar_object_path(user_id: &str, validated: &ValidatedImage) -> String {
    format!("{user_id}/avatar-{}.{}", &validated.digest[..16], validated.extension)
}

/// Stores an artwork image under the owner's namespace and returns its public URL.
pub fn upload_artwork_image(
    storage: &dyn ObjectStorage,
    owner_id: &str,
    artwork_id: &str,
    image: &ImageFile,
    max_bytes: usize,
) -> Result<String> {
    let validated = validate_artwork_image(image, max_bytes)?;
    let path = artwork_object_path(owner_id, artwork_id, &validated);
    storage.upload(ARTWORK_BUCKET, &path, &image.bytes, &validated.mime)?;
    debug!("Uploaded artwork image to {}/{}", ARTWORK_BUCKET, path);
    Ok(storage.public_url(ARTWORK_BUCKET, &path))
}

pub fn upload_avatar(storage: &dyn ObjectStorage, user_id: &str, image: &ImageFile) -> Result<String> {
    let validated = validate_avatar(image)?;
    let path = avatar_object_path(user_id, &validated);
    storage.upload(AVATAR_BUCKET, &path, &image.bytes, &validated.mime)?;
    debug!("Uploaded avatar to {}/{}", AVATAR_BUCKET, path);
    Ok(storage.public_url(AVATAR_BUCKET, &path))
}

/// Removes the object behind a public URL previously returned by an upload.
/// Always issues exactly one `remove`.
pub fn remove_by_url(storage: &dyn ObjectStorage, bucket: &str, url: &str) -> Result<()> {
    let path = storage.object_path(bucket, url);
    debug!("Removing {}/{}", bucket, path);
    storage.remove(bucket, &[path])
}

#[cfg(test)]
pub mod testing {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::error::Error;

    /// In-memory storage that records calls and can be told to fail.
    #[derive(Default)]
    pub struct RecordingStorage {
        pub uploads: RefCell<Vec<(String, String)>>,
        pub removals: RefCell<Vec<(String, Vec<String>)>>,
        pub fail_uploads: Cell<bool>,
        pub fail_removals: Cell<bool>,
    }

    impl RecordingStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn removal_count(&self) -> usize {
            self.removals.borrow().len()
        }
    }

    impl ObjectStorage for RecordingStorage {
        fn upload(&self, bucket: &str, path: &str, _bytes: &[u8], _content_type: &str) -> Result<()> {
            if self.fail_uploads.get() {
                return Err(Error::Storage("bucket unavailable".to_string()));
            }
            self.uploads
                .borrow_mut()
                .push((bucket.to_string(), path.to_string()));
            Ok(())
        }

        fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
            self.removals
                .borrow_mut()
                .push((bucket.to_string(), paths.to_vec()));
            if self.fail_removals.get() {
                return Err(Error::Storage("object is locked".to_string()));
            }
            Ok(())
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            format!("https://files.test/{bucket}/{path}")
        }
    }

    /// A PNG signature padded with zeros to `size` bytes.
    pub fn png_of_size(size: usize) -> ImageFile {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(size.max(bytes.len()), 0);
        ImageFile::new("artwork.png", Some("image/png"), bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{png_of_size, RecordingStorage};
    use super::*;
    use crate::error::Error;

    #[test]
    fn two_megabyte_png_is_accepted() {
        let image = png_of_size(2 * 1024 * 1024);
        let validated = validate_artwork_image(&image, 10 * 1024 * 1024).unwrap();
        assert_eq!(validated.mime, "image/png");
        assert_eq!(validated.extension, "png");
    }

    #[test]
    fn oversized_and_wrong_type_images_are_rejected() {
        let big = png_of_size(10 * 1024 * 1024 + 1);
        let err = validate_artwork_image(&big, 10 * 1024 * 1024).unwrap_err();
        assert!(err.contains(PRIMARY_IMAGE_FIELD));

        let gif = ImageFile::new("a.gif", Some("image/gif"), b"GIF89a-data".to_vec());
        let err = validate_artwork_image(&gif, 10 * 1024 * 1024).unwrap_err();
        assert!(err.get(PRIMARY_IMAGE_FIELD).unwrap().contains("image/gif"));

        let err = validate_avatar(&gif).unwrap_err();
        assert!(err.contains(AVATAR_FIELD));
    }

    #[test]
    fn avatars_skip_the_size_limit() {
        assert!(validate_avatar(&png_of_size(12 * 1024 * 1024)).is_ok());
    }

    #[test]
    fn upload_paths_are_namespaced_by_owner() {
        let storage = RecordingStorage::new();
        let url = upload_artwork_image(&storage, "owner-1", "art-9", &png_of_size(64), 1024).unwrap();

        let uploads = storage.uploads.borrow();
        assert_eq!(uploads.len(), 1);
        let (bucket, path) = &uploads[0];
        assert_eq!(bucket, ARTWORK_BUCKET);
        assert!(path.starts_with("owner-1/art-9-"));
        assert!(path.ends_with(".png"));
        assert_eq!(url, format!("https://files.test/artworks/{path}"));
        assert_eq!(storage.object_path(ARTWORK_BUCKET, &url), *path);
    }

    #[test]
    fn object_path_survives_a_base_url_change() {
        let storage = RecordingStorage::new();
        assert_eq!(
            storage.object_path(ARTWORK_BUCKET, "https://cdn.other/artworks/owner/x.png"),
            "owner/x.png"
        );
        assert_eq!(
            storage.object_path(AVATAR_BUCKET, "http://old-host/storage/avatars/u1/avatar-1.jpg?v=2"),
            "u1/avatar-1.jpg"
        );

        remove_by_url(&storage, ARTWORK_BUCKET, "https://cdn.other/artworks/owner/x.png").unwrap();
        assert_eq!(storage.removal_count(), 1);
        assert_eq!(
            storage.removals.borrow()[0],
            (ARTWORK_BUCKET.to_string(), vec!["owner/x.png".to_string()])
        );
    }

    #[test]
    fn storage_failures_surface_as_errors() {
        let storage = RecordingStorage::new();
        storage.fail_uploads.set(true);
        let err = upload_avatar(&storage, "user-1", &png_of_size(64)).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
