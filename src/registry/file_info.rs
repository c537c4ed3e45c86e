//! Source file description used for candidate resolution.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use url::Url;

use crate::cache::Flavor;

#[derive(Debug, Clone, Copy)]
struct FileStat {
    size: u64,
    mtime: Option<SystemTime>,
}

/// One URI to thumbnail, with its MIME hint and the requested flavor.
///
/// The file is stat'ed at most once, and only when size or mtime is asked
/// for.
#[derive(Debug, Clone)]
pub struct FileInfo {
    uri: String,
    mime_type: String,
    flavor: Flavor,
    scheme: String,
    path: Option<PathBuf>,
    stat: OnceLock<Option<FileStat>>,
}

impl FileInfo {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>, flavor: Flavor) -> Self {
        let uri = uri.into();
        let (scheme, path) = match Url::parse(&uri) {
            Ok(url) => {
                let path = if url.scheme() == "file" { url.to_file_path().ok() } else { None };
                (url.scheme().to_string(), path)
            }
            Err(_) => {
                let scheme = uri.split_once(':').map(|(s, _)| s.to_ascii_lowercase());
                (scheme.unwrap_or_default(), None)
            }
        };
        Self {
            uri,
            mime_type: mime_type.into(),
            flavor,
            scheme,
            path,
            stat: OnceLock::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Local filesystem path for `file://` URIs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Registry hash key: `"<scheme>-<mime>"`.
    pub fn hash_key(&self) -> String {
        super::hash_key(&self.scheme, &self.mime_type)
    }

    /// Size in bytes, `None` when the file cannot be stat'ed.
    pub fn size(&self) -> Option<u64> {
        self.stat().map(|s| s.size)
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.stat().and_then(|s| s.mtime)
    }

    /// True if the file lies under `root` (component-wise prefix). Always
    /// false for URIs without a local path.
    pub fn is_under(&self, root: &Path) -> bool {
        self.path.as_deref().is_some_and(|p| p.starts_with(root))
    }

    fn stat(&self) -> Option<FileStat> {
        *self.stat.get_or_init(|| {
            let path = self.path.as_deref()?;
            let meta = std::fs::metadata(path).ok()?;
            Some(FileStat { size: meta.len(), mtime: meta.modified().ok() })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_file_uri() {
        let info = FileInfo::new("file:///tmp/some%20dir/a.png", "image/png", Flavor::Normal);
        assert_eq!(info.scheme(), "file");
        assert_eq!(info.path(), Some(Path::new("/tmp/some dir/a.png")));
        assert_eq!(info.hash_key(), "file-image/png");
    }

    #[test]
    fn remote_uri_has_no_path() {
        let info = FileInfo::new("sftp://host/a.jpg", "image/jpeg", Flavor::Large);
        assert_eq!(info.scheme(), "sftp");
        assert!(info.path().is_none());
        assert!(info.size().is_none());
        assert_eq!(info.hash_key(), "sftp-image/jpeg");
    }

    #[test]
    fn stats_local_file_lazily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 1234]).unwrap();
        let uri = Url::from_file_path(file.path()).unwrap().to_string();

        let info = FileInfo::new(uri, "image/png", Flavor::Normal);
        assert_eq!(info.size(), Some(1234));
        assert!(info.mtime().is_some());
    }

    #[test]
    fn mount_prefix_matching() {
        let info = FileInfo::new("file:///media/usb/photos/a.jpg", "image/jpeg", Flavor::Normal);
        assert!(info.is_under(Path::new("/media/usb")));
        assert!(!info.is_under(Path::new("/media/usb2")));
        assert!(!info.is_under(Path::new("/home")));

        let remote = FileInfo::new("https://example.com/media/usb/a.jpg", "image/jpeg", Flavor::Normal);
        assert!(!remote.is_under(Path::new("/media/usb")));
        assert!(!remote.is_under(Path::new("/")));
    }
}
