use crate::PackageError;
use std::path::Path;

/// Hosts we accept package URLs from. Mirrors the hosting providers the
/// product supports for voice-model downloads.
pub const ALLOWED_HOSTS: &[&str] = &[
    "huggingface.co",
    "drive.google.com",
    "pixeldrain.com",
    "mega.nz",
    "disk.yandex.ru",
    "yadi.sk",
];

/// External collaborator that downloads a remote archive to a local path.
///
/// Per-provider plumbing (API endpoints, share-link parsing) lives behind
/// this trait; the package store only sees the resulting file.
pub trait ArchiveFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), PackageError>;
}

/// Check a package URL against the provider allow-list.
pub fn check_url(url: &str) -> Result<(), PackageError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| PackageError::UnsupportedUrl(url.to_string()))?;
    let host = rest.split('/').next().unwrap_or("");
    let host = host.split('@').next_back().unwrap_or(host);
    let host = host.split(':').next().unwrap_or(host);

    let allowed = ALLOWED_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{h}")));
    if allowed {
        Ok(())
    } else {
        Err(PackageError::UnsupportedUrl(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_hosts() {
        check_url("https://huggingface.co/some/model.zip").unwrap();
        check_url("https://drive.google.com/file/d/abc/view").unwrap();
        check_url("https://cdn.pixeldrain.com/u/xyz").unwrap();
    }

    #[test]
    fn rejects_unknown_hosts() {
        assert!(check_url("https://example.com/model.zip").is_err());
        assert!(check_url("ftp://huggingface.co/model.zip").is_err());
        // Suffix spoofing is not an allow-list match
        assert!(check_url("https://nothuggingface.co/model.zip").is_err());
    }
}
