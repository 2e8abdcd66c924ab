use std::path::{Path, PathBuf};

pub type FileId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub file: FileId,
    pub lo: u32,
    pub hi: u32,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Span({}:{}-{})", self.file, self.lo, self.hi)
    }
}

impl Span {
    pub fn new(file: FileId, lo: u32, hi: u32) -> Span {
        Span { file, lo, hi }
    }

    pub fn null() -> Span {
        Span {
            file: 0,
            lo: 0,
            hi: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.file == 0 && self.lo == 0 && self.hi == 0
    }

    /// Smallest span covering both inputs. Only meaningful within one file.
    pub fn join(&self, other: Span) -> Span {
        if self.is_null() {
            return other;
        }
        if other.is_null() {
            return *self;
        }
        Span {
            file: self.file,
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }
}

/// Derive a file id by hashing the path, so ids are stable for a given path.
pub fn file_id_of(path: &Path) -> FileId {
    stable_hash(&path)
}

/// Deterministic hash for derived identifiers (file ids, generated method
/// names, output unit names).
pub fn stable_hash<T: std::hash::Hash>(value: &T) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileInfo {
    pub file: PathBuf,
}
