//! File types and the empty marker type used by stages.
//!
//! A Martian file type is a path whose extension carries meaning in the MRO
//! (`out txt report`). Stages declare one with [`martian_filetype!`] and get a
//! newtype over `PathBuf` that serializes as the bare path.

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde::ser::SerializeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A path with a fixed extension that Martian knows as a `filetype`.
pub trait MartianFileType: AsRef<Path> {
    /// Extension without the leading dot, e.g. `fastq.lz4`.
    fn extension() -> &'static str;

    /// Wrap an existing path without touching its extension.
    fn from_path(path: PathBuf) -> Self;

    /// Build `<dir>/<file_name>.<extension>`. The extension is only appended
    /// when the name does not already carry it.
    fn new(dir: impl AsRef<Path>, file_name: impl AsRef<Path>) -> Self
    where
        Self: Sized,
    {
        let mut path = dir.as_ref().join(file_name.as_ref());
        let suffix = format!(".{}", Self::extension());
        let has_ext = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&suffix));
        if !has_ext {
            let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(&suffix);
            path.set_file_name(name);
        }
        Self::from_path(path)
    }
}

/// Marker for "nothing here": the chunk types of a stage without a split, or
/// a stage with no outputs. Serializes as `{}` and accepts any JSON object.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MartianVoid;

impl Serialize for MartianVoid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

struct VoidVisitor;

impl<'de> Visitor<'de> for VoidVisitor {
    type Value = MartianVoid;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map or null")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        while map
            .next_entry::<de::IgnoredAny, de::IgnoredAny>()?
            .is_some()
        {}
        Ok(MartianVoid)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(MartianVoid)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(MartianVoid)
    }
}

impl<'de> Deserialize<'de> for MartianVoid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(VoidVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::martian_filetype!(TxtFile, "txt");
    crate::martian_filetype!(FastqLz4File, "fastq.lz4");

    #[test]
    fn test_filetype_new_appends_extension() {
        let f = TxtFile::new("/tmp/files", "report");
        assert_eq!(f.as_ref(), Path::new("/tmp/files/report.txt"));
    }

    #[test]
    fn test_filetype_new_keeps_existing_extension() {
        let f = TxtFile::new("/tmp/files", "report.txt");
        assert_eq!(f.as_ref(), Path::new("/tmp/files/report.txt"));

        let f = FastqLz4File::new("/data", "reads");
        assert_eq!(f.as_ref(), Path::new("/data/reads.fastq.lz4"));
    }

    #[test]
    fn test_filetype_serializes_as_path() {
        let f = TxtFile::new("/a", "b");
        assert_eq!(serde_json::to_string(&f).unwrap(), "\"/a/b.txt\"");
        let back: TxtFile = serde_json::from_str("\"/x/y.txt\"").unwrap();
        assert_eq!(back.as_ref(), Path::new("/x/y.txt"));
    }

    #[test]
    fn test_void_accepts_any_map() {
        assert_eq!(serde_json::to_string(&MartianVoid).unwrap(), "{}");
        let v: MartianVoid = serde_json::from_str(r#"{"a": 1, "b": [1, 2]}"#).unwrap();
        assert_eq!(v, MartianVoid);
        let v: MartianVoid = serde_json::from_str("null").unwrap();
        assert_eq!(v, MartianVoid);
    }
}
