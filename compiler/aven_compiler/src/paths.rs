//! Content-addressed bytecode output paths.
//!
//! Each module's output path derives from the SHA-1 of its absolute source
//! path: the first two hex characters pick a sub-directory, the remainder
//! plus the fixed extension form the file name. The sharding keeps any
//! single output directory from holding too many files.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

/// Extension of serialized bytecode images.
pub const BYTECODE_EXTENSION: &str = "avc";

/// The output path for a module compiled from `source`, under `root`.
pub fn output_path(root: &Path, source: &Path) -> PathBuf {
    let digest = Sha1::digest(source.to_string_lossy().as_bytes());
    let mut hex = String::with_capacity(40);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    root.join(&hex[..2])
        .join(format!("{}.{BYTECODE_EXTENSION}", &hex[2..]))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_path_shape() {
        let path = output_path(Path::new("build"), Path::new("/src/main.av"));
        let shard = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string);
        let file = path.file_name().and_then(|n| n.to_str()).map(str::to_string);

        assert_eq!(shard.as_ref().map(String::len), Some(2));
        // 38 remaining hex characters plus ".avc".
        assert_eq!(file.as_ref().map(String::len), Some(42));
        assert!(file.is_some_and(|f| f.ends_with(".avc")));
    }

    #[test]
    fn test_deterministic_and_source_sensitive() {
        let root = Path::new("build");
        let a = output_path(root, Path::new("/src/a.av"));
        let a_again = output_path(root, Path::new("/src/a.av"));
        let b = output_path(root, Path::new("/src/b.av"));

        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }
}
