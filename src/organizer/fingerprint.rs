use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// SHA-256 of a file's full byte content, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileFingerprint(String);

impl FileFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    #[cfg(test)]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Streams the file through the hasher so large media never sits in memory.
pub fn fingerprint(path: &Path) -> Result<FileFingerprint> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::with_capacity(READ_CHUNK_BYTES, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = reader
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(FileFingerprint(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::{FileFingerprint, fingerprint};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn identical_content_matches_across_names_and_dirs() {
        let tmp = tempdir().expect("tempdir");
        let a = tmp.path().join("photo.jpg");
        let nested = tmp.path().join("nested");
        fs::create_dir_all(&nested).expect("mkdir");
        let b = nested.join("copy of photo.png");
        fs::write(&a, b"same bytes").expect("write a");
        fs::write(&b, b"same bytes").expect("write b");

        assert_eq!(fingerprint(&a).expect("a"), fingerprint(&b).expect("b"));
    }

    #[test]
    fn streamed_digest_equals_whole_buffer_digest() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("large.bin");
        let bytes = (0..300_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        fs::write(&path, &bytes).expect("write");

        assert_eq!(
            fingerprint(&path).expect("stream"),
            FileFingerprint::of_bytes(&bytes)
        );
    }

    #[test]
    fn different_content_differs() {
        let tmp = tempdir().expect("tempdir");
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::write(&a, b"A").expect("write");
        fs::write(&b, b"B").expect("write");
        assert_ne!(fingerprint(&a).expect("a"), fingerprint(&b).expect("b"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let err = fingerprint(&tmp.path().join("gone.jpg")).expect_err("should fail");
        assert!(format!("{err:#}").contains("failed to open"));
    }
}
