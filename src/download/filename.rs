//! Filename derivation, sanitization, and unique-path reservation.
//!
//! Names come from the `Content-Disposition` header, then the requested URL's
//! last path segment, then `download` plus an extension guessed from the
//! `Content-Type`. [`NameRegistry`] turns a derived name into an exclusively
//! created file, adding `_1`, `_2`, ... suffixes when the name is taken.

use std::io;
use std::path::{Component, Path, PathBuf};

use dashmap::DashSet;
use tokio::fs::{File, OpenOptions};
use tracing::debug;
use url::Url;

use super::constants::MAX_NAME_SUFFIX;

/// Derives the local filename for a response.
///
/// `requested` is the URL from the input list, not the post-redirect URL.
#[must_use]
pub fn derive_filename(
    requested: &Url,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
) -> String {
    if let Some(name) = content_disposition
        .and_then(parse_content_disposition)
        .and_then(|name| usable_name(&name))
    {
        return name;
    }

    if let Some(name) = last_path_segment(requested).and_then(|name| usable_name(&name)) {
        return name;
    }

    let extension = content_type.map_or(".bin", extension_from_content_type);
    format!("download{extension}")
}

/// Strips any directory part and sanitizes; `None` if nothing usable remains.
fn usable_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if base.is_empty() {
        return None;
    }
    let sanitized = sanitize_filename(base);
    (!sanitized.trim_matches(['_', '.']).is_empty()).then_some(sanitized)
}

/// Percent-decoded last path segment of `url`, if non-empty.
fn last_path_segment(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    Some(decoded)
}

/// Guess file extension from Content-Type header.
pub(crate) fn extension_from_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "text/html" => ".html",
        "text/plain" => ".txt",
        "application/json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "application/pdf" => ".pdf",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/svg+xml" => ".svg",
        "application/zip" => ".zip",
        "application/gzip" | "application/x-gzip" => ".gz",
        "application/x-tar" => ".tar",
        "text/css" => ".css",
        "text/csv" => ".csv",
        "text/javascript" | "application/javascript" => ".js",
        "video/mp4" => ".mp4",
        "audio/mpeg" => ".mp3",
        _ => ".bin",
    }
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987, preferred)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    let pos = header.find("filename=")?;
    let value = header[pos + 9..].trim();
    if let Some(stripped) = value.strip_prefix('"') {
        let end = stripped.find('"')?;
        return Some(stripped[..end].to_string());
    }
    let end = value.find(';').unwrap_or(value.len());
    let filename = value[..end].trim();
    (!filename.is_empty()).then(|| filename.to_string())
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Returns `name` with a numeric suffix before the extension (`0` means none).
///
/// `file.pdf` → `file_1.pdf`; `archive` → `archive_1`; `.bashrc` → `.bashrc_1`.
fn with_suffix(name: &str, n: usize) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(pos) if pos > 0 => format!("{}_{n}{}", &name[..pos], &name[pos..]),
        _ => format!("{name}_{n}"),
    }
}

/// Per-run registry of output paths handed out to workers.
///
/// Reservation is atomic across workers: two URLs deriving the same name in
/// the same run always get distinct paths, and an existing file on disk is
/// never overwritten (files are opened with `create_new`).
#[derive(Debug)]
pub struct NameRegistry {
    directory: PathBuf,
    reserved: DashSet<PathBuf>,
}

impl NameRegistry {
    /// Creates an empty registry for `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            reserved: DashSet::new(),
        }
    }

    /// The directory files are created in.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Reserves a unique path for `name` and creates the file exclusively.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error for permission or path problems, or
    /// `AlreadyExists` once every suffix up to the limit is taken.
    pub async fn create(&self, name: &str) -> io::Result<(PathBuf, File)> {
        for n in 0..MAX_NAME_SUFFIX {
            let path = self.directory.join(with_suffix(name, n));
            if !self.reserved.insert(path.clone()) {
                continue;
            }
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    debug!(path = %path.display(), "reserved output file");
                    return Ok((path, file));
                }
                // Stays reserved: the path belongs to someone else.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    self.reserved.remove(&path);
                    return Err(e);
                }
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free filename for {name} in {}", self.directory.display()),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Component;

    use super::*;
    use tempfile::TempDir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file\\name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file:name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file<name>.pdf"), "file_name_.pdf");
        assert_eq!(sanitize_filename("file|name.pdf"), "file_name.pdf");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(".."), "__");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("file (1).pdf"), "file (1).pdf");
        assert_eq!(sanitize_filename("日本語.pdf"), "日本語.pdf");
    }

    #[test]
    fn test_parse_content_disposition_variants() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="example.pdf"; size=1"#),
            Some("example.pdf".to_string())
        );
        assert_eq!(
            parse_content_disposition("attachment; filename=example.pdf"),
            Some("example.pdf".to_string())
        );
        assert_eq!(
            parse_content_disposition("attachment; filename*=UTF-8''example%20file.pdf"),
            Some("example file.pdf".to_string())
        );
        assert_eq!(parse_content_disposition("attachment"), None);
    }

    #[test]
    fn test_extension_from_content_type_strips_parameters() {
        assert_eq!(
            extension_from_content_type("text/html; charset=utf-8"),
            ".html"
        );
        assert_eq!(extension_from_content_type("Application/PDF"), ".pdf");
        assert_eq!(
            extension_from_content_type("application/octet-stream"),
            ".bin"
        );
    }

    #[test]
    fn test_derive_filename_prefers_content_disposition() {
        let name = derive_filename(
            &url("https://example.com/get?id=7"),
            Some(r#"attachment; filename="report.csv""#),
            Some("text/csv"),
        );
        assert_eq!(name, "report.csv");
    }

    #[test]
    fn test_derive_filename_strips_directories_from_disposition() {
        let name = derive_filename(
            &url("https://example.com/x"),
            Some(r#"attachment; filename="../../etc/passwd""#),
            None,
        );
        assert_eq!(name, "passwd");
    }

    #[test]
    fn test_derive_filename_uses_decoded_last_segment() {
        let name = derive_filename(&url("https://example.com/dir/my%20file.tar.gz"), None, None);
        assert_eq!(name, "my file.tar.gz");
    }

    #[test]
    fn test_derive_filename_sanitizes_encoded_separators() {
        let name = derive_filename(&url("https://example.com/a%2Fb%3Ac.txt"), None, None);
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_derive_filename_falls_back_to_content_type() {
        let name = derive_filename(&url("https://example.com/"), None, Some("text/html"));
        assert_eq!(name, "download.html");
        let name = derive_filename(&url("https://example.com/"), None, None);
        assert_eq!(name, "download.bin");
    }

    #[test]
    fn test_derive_filename_rejects_dot_segment_names() {
        let name = derive_filename(&url("https://example.com/"), Some("attachment; filename=.."), None);
        assert_eq!(name, "download.bin");
    }

    #[test]
    fn test_with_suffix_inserts_before_extension() {
        assert_eq!(with_suffix("file.pdf", 0), "file.pdf");
        assert_eq!(with_suffix("file.pdf", 2), "file_2.pdf");
        assert_eq!(with_suffix("archive", 1), "archive_1");
        assert_eq!(with_suffix(".bashrc", 1), ".bashrc_1");
        assert_eq!(with_suffix("a.tar.gz", 1), "a.tar_1.gz");
    }

    #[tokio::test]
    async fn test_name_registry_creates_plain_name_first() {
        let temp_dir = TempDir::new().unwrap();
        let registry = NameRegistry::new(temp_dir.path());
        let (path, _file) = registry.create("test.pdf").await.unwrap();
        assert_eq!(path, temp_dir.path().join("test.pdf"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_name_registry_skips_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("test.pdf"), b"1").unwrap();
        std::fs::write(temp_dir.path().join("test_1.pdf"), b"2").unwrap();

        let registry = NameRegistry::new(temp_dir.path());
        let (path, _file) = registry.create("test.pdf").await.unwrap();
        assert_eq!(path, temp_dir.path().join("test_2.pdf"));
        assert_eq!(std::fs::read(temp_dir.path().join("test.pdf")).unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_name_registry_same_name_twice_gets_distinct_paths() {
        let temp_dir = TempDir::new().unwrap();
        let registry = NameRegistry::new(temp_dir.path());
        let (first, _a) = registry.create("data.bin").await.unwrap();
        let (second, _b) = registry.create("data.bin").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(second, temp_dir.path().join("data_1.bin"));
    }

    #[tokio::test]
    async fn test_name_registry_concurrent_reservations_are_unique() {
        let temp_dir = TempDir::new().unwrap();
        let registry = std::sync::Arc::new(NameRegistry::new(temp_dir.path()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.create("same.txt").await.unwrap().0
            }));
        }
        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[tokio::test]
    async fn test_name_registry_paths_stay_under_directory() {
        let temp_dir = TempDir::new().unwrap();
        let registry = NameRegistry::new(temp_dir.path());
        for malicious in ["../../etc/passwd", "..", "a/\\b\\c"] {
            let name = derive_filename(
                &url("https://example.com/"),
                Some(&format!("attachment; filename=\"{malicious}\"")),
                None,
            );
            let (path, _file) = registry.create(&name).await.unwrap();
            assert!(path.starts_with(temp_dir.path()));
            assert!(!path.components().any(|c| c == Component::ParentDir));
        }
    }

    #[tokio::test]
    async fn test_name_registry_missing_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let registry = NameRegistry::new(temp_dir.path().join("missing"));
        let err = registry.create("x.bin").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
