//! The metadata directory Martian hands to every stage phase.
//!
//! Martian runs an adapter as
//! `<adapter> martian <stage_key> <split|main|join> <metadata_dir> <files_dir> <run_file>`.
//! Arguments and outputs are JSON files named `_<name>` inside the metadata
//! directory. Every write is followed by a journal update: a
//! `<run_file>.<name>` marker file the Martian monitor watches for.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use chrono::Local;
use log::warn;
use nix::sys::stat::{fstat, SFlag};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::stage::{MartianRover, Resource};

pub type JsonDict = serde_json::Map<String, Value>;

/// Which phase of a stage Martian asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagePhase {
    Split,
    Main,
    Join,
}

impl FromStr for StagePhase {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "split" => Ok(StagePhase::Split),
            "main" => Ok(StagePhase::Main),
            "join" => Ok(StagePhase::Join),
            _ => bail!("Unrecognized stage type {s}"),
        }
    }
}

impl fmt::Display for StagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StagePhase::Split => "split",
            StagePhase::Main => "main",
            StagePhase::Join => "join",
        })
    }
}

/// Writes `<run_file>.<name>` marker files.
#[derive(Debug, Clone)]
pub struct Journal {
    run_file: PathBuf,
    phase: StagePhase,
}

impl Journal {
    pub fn new(run_file: impl Into<PathBuf>, phase: StagePhase) -> Self {
        Journal {
            run_file: run_file.into(),
            phase,
        }
    }

    /// Path of the marker for `name`. Split and join markers carry the
    /// phase as a prefix, main markers do not.
    pub fn path(&self, name: &str) -> PathBuf {
        let journal_name = match self.phase {
            StagePhase::Main => name.to_string(),
            phase => format!("{phase}_{name}"),
        };
        let mut path: OsString = self.run_file.clone().into_os_string();
        path.push(".");
        path.push(journal_name);
        PathBuf::from(path)
    }

    /// Atomically (write to `.tmp`, then rename) stamp the marker with the
    /// current time.
    pub fn update(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
            .with_context(|| format!("Failed to write journal file {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to rename journal file to {}", path.display()))?;
        Ok(())
    }
}

/// The metadata directory plus the journal that follows every write to it.
#[derive(Debug, Clone)]
pub struct MetadataDir {
    path: PathBuf,
    journal: Journal,
}

impl MetadataDir {
    pub fn new(path: impl Into<PathBuf>, journal: Journal) -> Self {
        MetadataDir {
            path: path.into(),
            journal,
        }
    }

    /// `<metadata_dir>/_<name>`
    pub fn make_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("_{name}"))
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn write_raw(&self, name: &str, text: &str) -> Result<()> {
        let path = self.make_path(name);
        fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        self.journal.update(name)
    }

    pub fn append_raw(&self, name: &str, text: &str) -> Result<()> {
        let path = self.make_path(name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(text.as_bytes())?;
        self.journal.update(name)
    }
}

/// Everything known about the running stage phase.
#[derive(Debug)]
pub struct Metadata {
    pub stage_name: String,
    pub stage_type: StagePhase,
    dir: MetadataDir,
    files_path: PathBuf,
    jobinfo: JsonDict,
}

impl Metadata {
    /// The metadata directory named by `args`, checked to exist. Nothing
    /// else in `args` is validated, so failures past this point can still be
    /// reported through `_errors`.
    pub fn metadata_path(args: &[String]) -> Result<PathBuf> {
        let [_, _, metadata_path, _, _] = args else {
            bail!(
                "Expected 5 arguments <stage> <split|main|join> <metadata> <files> <run_file>, got {}",
                args.len()
            );
        };
        let metadata_path = PathBuf::from(metadata_path);
        if !metadata_path.is_dir() {
            bail!(
                "Metadata path {} is not a directory",
                metadata_path.display()
            );
        }
        Ok(metadata_path)
    }

    /// Build from `<stage_key> <phase> <metadata_dir> <files_dir> <run_file>`.
    pub fn new(args: &[String]) -> Result<Self> {
        let metadata_path = Self::metadata_path(args)?;
        let (stage_name, files_path, run_file) = (&args[0], &args[3], &args[4]);
        let stage_type: StagePhase = args[1].parse()?;
        Ok(Metadata {
            stage_name: stage_name.clone(),
            stage_type,
            dir: MetadataDir::new(metadata_path, Journal::new(run_file, stage_type)),
            files_path: PathBuf::from(files_path),
            jobinfo: JsonDict::new(),
        })
    }

    pub fn make_path(&self, name: &str) -> PathBuf {
        self.dir.make_path(name)
    }

    pub fn files_path(&self) -> &Path {
        &self.files_path
    }

    pub fn journal(&self) -> Journal {
        self.dir.journal().clone()
    }

    pub fn update_journal(&self, name: &str) -> Result<()> {
        self.dir.journal().update(name)
    }

    pub fn jobinfo(&self) -> &JsonDict {
        &self.jobinfo
    }

    pub fn read_json(&self, name: &str) -> Result<Value> {
        let path = self.make_path(name);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
    }

    pub fn read_json_obj(&self, name: &str) -> Result<JsonDict> {
        match self.read_json(name)? {
            Value::Object(obj) => Ok(obj),
            other => bail!("Expected a JSON object in _{name}, found {other}"),
        }
    }

    /// Read `_<name>` straight into a typed value.
    pub fn decode<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.read_json(name)?;
        serde_json::from_value(value).with_context(|| format!("Failed to decode _{name}"))
    }

    pub fn write_raw(&self, name: &str, text: &str) -> Result<()> {
        self.dir.write_raw(name, text)
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize _{name}"))?;
        self.write_raw(name, &text)
    }

    /// Record where and as what this adapter runs in `_jobinfo`. Keeps the
    /// resource values Martian put there.
    pub fn update_jobinfo(&mut self) -> Result<()> {
        let mut jobinfo = if self.make_path("jobinfo").exists() {
            self.read_json_obj("jobinfo")?
        } else {
            warn!("No _jobinfo found, starting from an empty one");
            JsonDict::new()
        };

        let binpath = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        jobinfo.insert("cwd".into(), json!(self.files_path.display().to_string()));
        jobinfo.insert(
            "host".into(),
            json!(sysinfo::System::host_name().unwrap_or_default()),
        );
        jobinfo.insert("pid".into(), json!(std::process::id()));
        jobinfo.insert(
            "rust".into(),
            json!({
                "binpath": binpath,
                "version": env!("CARGO_PKG_VERSION"),
            }),
        );
        self.write_json("jobinfo", &jobinfo)?;
        self.jobinfo = jobinfo;
        Ok(())
    }

    /// Resources Martian allocated to this job, from `_jobinfo`.
    pub fn resource(&self) -> Resource {
        let get = |key: &str| -> Option<isize> {
            let value = self.jobinfo.get(key)?;
            value
                .as_i64()
                .or_else(|| value.as_f64().map(|v| v.ceil() as i64))
                .and_then(|v| isize::try_from(v).ok())
        };
        let mut resource = Resource::new();
        if let Some(threads) = get("threads") {
            resource = resource.with_threads(threads);
        }
        if let Some(mem_gb) = get("memGB") {
            resource = resource.with_mem_gb(mem_gb);
        }
        if let Some(vmem_gb) = get("vmemGB") {
            resource = resource.with_vmem_gb(vmem_gb);
        }
        resource
    }

    pub fn rover(&self) -> MartianRover {
        MartianRover::new(&self.files_path, self.resource()).with_metadata(self.dir.clone())
    }

    pub fn complete(&self) -> Result<()> {
        self.write_raw("complete", "")
    }
}

/// Take ownership of descriptor `fd` if it is an open regular file.
///
/// Martian's monitor opens `_log` and `_errors` itself and passes them as
/// descriptors 3 and 4. Anything else on those numbers (a jobserver pipe, a
/// closed slot) is left alone.
pub fn inherited_file(fd: RawFd) -> Option<File> {
    if fd < 0 {
        return None;
    }
    let stat = fstat(fd).ok()?;
    let file_type = SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT;
    if file_type != SFlag::S_IFREG {
        return None;
    }
    // SAFETY: fd is open and nothing else in this process owns it.
    Some(unsafe { File::from_raw_fd(fd) })
}

/// The log destination: the inherited descriptor, or `fallback` in append mode.
pub fn open_log_sink(fd: RawFd, fallback: &Path) -> Result<File> {
    match inherited_file(fd) {
        Some(file) => Ok(file),
        None => OpenOptions::new()
            .create(true)
            .append(true)
            .open(fallback)
            .with_context(|| format!("Failed to open log file {}", fallback.display())),
    }
}

/// Where stage failures are reported. Martian treats any content here as a
/// failed job, so the fallback file is only created on the first write.
#[derive(Debug)]
pub struct ErrorSink {
    inherited: Mutex<Option<File>>,
    fallback: PathBuf,
}

impl ErrorSink {
    pub fn open(fd: RawFd, fallback: impl Into<PathBuf>) -> Self {
        ErrorSink {
            inherited: Mutex::new(inherited_file(fd)),
            fallback: fallback.into(),
        }
    }

    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        ErrorSink {
            inherited: Mutex::new(None),
            fallback: path.into(),
        }
    }

    pub fn write_errors(&self, message: &str) -> Result<()> {
        let mut inherited = self.inherited.lock().unwrap_or_else(PoisonError::into_inner);
        match inherited.as_mut() {
            Some(file) => file.write_all(message.as_bytes())?,
            None => fs::write(&self.fallback, message).with_context(|| {
                format!("Failed to write errors to {}", self.fallback.display())
            })?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata(dir: &TempDir, phase: &str) -> Metadata {
        let md_path = dir.path().join("metadata");
        let files = dir.path().join("files");
        fs::create_dir_all(&md_path).unwrap();
        fs::create_dir_all(&files).unwrap();
        let args = vec![
            "sum_squares".to_string(),
            phase.to_string(),
            md_path.display().to_string(),
            files.display().to_string(),
            dir.path().join("run").display().to_string(),
        ];
        Metadata::new(&args).unwrap()
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("split".parse::<StagePhase>().unwrap(), StagePhase::Split);
        assert_eq!(StagePhase::Join.to_string(), "join");
        assert!("chunk".parse::<StagePhase>().is_err());
    }

    #[test]
    fn test_new_rejects_bad_args() {
        assert!(Metadata::new(&["a".to_string()]).is_err());
        let args: Vec<String> = ["s", "main", "/nonexistent/dir", "/tmp", "/tmp/run"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(Metadata::new(&args).is_err());
    }

    #[test]
    fn test_journal_names() {
        let main = Journal::new("/j/run", StagePhase::Main);
        assert_eq!(main.path("outs"), PathBuf::from("/j/run.outs"));
        let split = Journal::new("/j/run", StagePhase::Split);
        assert_eq!(split.path("complete"), PathBuf::from("/j/run.split_complete"));
    }

    #[test]
    fn test_write_json_updates_journal() {
        let dir = TempDir::new().unwrap();
        let md = metadata(&dir, "join");
        md.write_json("outs", &json!({"sum": 3})).unwrap();
        let outs: Value = md.read_json("outs").unwrap();
        assert_eq!(outs["sum"], 3);
        assert!(dir.path().join("run.join_outs").exists());
        assert!(!dir.path().join("run.join_outs.tmp").exists());

        md.update_journal("heartbeat").unwrap();
        assert!(dir.path().join("run.join_heartbeat").exists());
    }

    #[test]
    fn test_update_jobinfo_keeps_resources() {
        let dir = TempDir::new().unwrap();
        let mut md = metadata(&dir, "main");
        fs::write(
            md.make_path("jobinfo"),
            r#"{"threads": 4, "memGB": 2.5, "vmemGB": 8}"#,
        )
        .unwrap();
        md.update_jobinfo().unwrap();

        let jobinfo = md.read_json_obj("jobinfo").unwrap();
        assert_eq!(jobinfo["threads"], 4);
        assert_eq!(jobinfo["pid"], std::process::id());
        assert!(jobinfo["rust"]["version"].is_string());

        let resource = md.resource();
        assert_eq!(resource.threads(), Some(4));
        assert_eq!(resource.mem_gb(), Some(3));
        assert_eq!(resource.vmem_gb(), Some(8));
    }

    #[test]
    fn test_read_json_obj_rejects_arrays() {
        let dir = TempDir::new().unwrap();
        let md = metadata(&dir, "main");
        fs::write(md.make_path("args"), "[1, 2]").unwrap();
        assert!(md.read_json_obj("args").is_err());
        assert!(md.read_json("missing").is_err());
    }

    #[test]
    fn test_metadata_path_checked_before_phase() {
        let dir = TempDir::new().unwrap();
        let args = vec![
            "s".to_string(),
            "chunk".to_string(),
            dir.path().display().to_string(),
            "/tmp".to_string(),
            "/tmp/run".to_string(),
        ];
        assert_eq!(Metadata::metadata_path(&args).unwrap(), dir.path());
        assert!(Metadata::new(&args).is_err());
    }

    #[test]
    fn test_error_sink_is_lazy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("_errors");
        let sink = ErrorSink::to_file(&path);
        assert!(!path.exists());
        sink.write_errors("ASSERT: boom").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "ASSERT: boom");
    }

    #[test]
    fn test_inherited_file_ignores_invalid_fd() {
        assert!(inherited_file(-1).is_none());
        assert!(inherited_file(9999).is_none());
    }
}
