//! Runs the `sum_squares` demo adapter the way Martian would.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::TempDir;

const ADAPTER: &str = env!("CARGO_BIN_EXE_sum_squares");

struct Job {
    _dir: TempDir,
    metadata: PathBuf,
    files: PathBuf,
    run_file: PathBuf,
}

impl Job {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("metadata");
        let files = dir.path().join("files");
        fs::create_dir_all(&metadata).unwrap();
        fs::create_dir_all(&files).unwrap();
        let run_file = dir.path().join("run");
        let job = Job {
            _dir: dir,
            metadata,
            files,
            run_file,
        };
        job.write("jobinfo", &json!({"threads": 1, "memGB": 2, "vmemGB": 4}));
        job
    }

    fn path(&self, name: &str) -> PathBuf {
        self.metadata.join(format!("_{name}"))
    }

    fn write(&self, name: &str, value: &Value) {
        fs::write(self.path(name), serde_json::to_string(value).unwrap()).unwrap();
    }

    fn read(&self, name: &str) -> Value {
        serde_json::from_str(&fs::read_to_string(self.path(name)).unwrap()).unwrap()
    }

    fn run(&self, stage: &str, phase: &str) -> Output {
        Command::new(ADAPTER)
            .args(["--heartbeat-secs", "1", "--quiet", "martian", stage, phase])
            .arg(&self.metadata)
            .arg(&self.files)
            .arg(&self.run_file)
            .output()
            .unwrap()
    }

    fn journal(&self, name: &str) -> PathBuf {
        let mut path = self.run_file.clone().into_os_string();
        path.push(format!(".{name}"));
        PathBuf::from(path)
    }
}

fn mro(args: &[&str]) -> Output {
    Command::new(ADAPTER).arg("mro").args(args).output().unwrap()
}

#[test]
fn test_mro_output() {
    let output = mro(&[]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(stdout.starts_with("#\n# WARNING: This file is auto-generated.\n"));
    assert!(stdout.contains("filetype txt;\n\n"));
    assert!(stdout.contains(
        "\
stage REPORT(
    in  float[] values,
    in  float   sum,
    out txt     report,
    src comp    \"sum_squares martian report\",
) using (
    volatile = strict,
) retain (
    report,
)
"
    ));
    assert!(stdout.contains(
        "\
stage SUM_SQUARES(
    in  float[] values,
    out float   sum,
    src comp    \"sum_squares martian sum_squares\",
) split (
    in  float   value,
    out float   square,
) using (
    mem_gb  = 1,
    threads = 1,
)
"
    ));
    // Stages come out ordered by key.
    assert!(stdout.find("stage REPORT(").unwrap() < stdout.find("stage SUM_SQUARES(").unwrap());
}

#[test]
fn test_mro_single_stage() {
    let output = mro(&["--stage", "report"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("stage REPORT("));
    assert!(!stdout.contains("stage SUM_SQUARES("));

    let output = mro(&["--stage", "no_such_stage"]);
    assert!(!output.status.success());
}

#[test]
fn test_mro_file_needs_rewrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sum_squares.mro");
    let path_arg = path.to_str().unwrap();

    assert!(mro(&["--file", path_arg]).status.success());
    let first = fs::read_to_string(&path).unwrap();
    assert!(first.contains("stage SUM_SQUARES("));

    let refused = mro(&["--file", path_arg]);
    assert!(!refused.status.success());
    assert!(String::from_utf8_lossy(&refused.stderr).contains("rewrite"));

    assert!(mro(&["--file", path_arg, "--rewrite"]).status.success());
    assert_eq!(fs::read_to_string(&path).unwrap(), first);
}

#[test]
fn test_split_main_join() {
    let job = Job::new();
    let values = json!([1.0, 2.0, 3.0]);
    job.write("args", &json!({"values": values}));

    let split = job.run("sum_squares", "split");
    assert!(split.status.success(), "{split:?}");
    assert_eq!(
        job.read("stage_defs"),
        json!({
            "chunks": [
                {"value": 1.0, "__mem_gb": 1},
                {"value": 2.0, "__mem_gb": 1},
                {"value": 3.0, "__mem_gb": 1},
            ],
            "join": {"__mem_gb": 1},
        })
    );
    assert!(job.journal("split_complete").exists());
    assert!(job.path("complete").exists());
    assert!(!job.path("errors").exists());

    let jobinfo = job.read("jobinfo");
    assert!(jobinfo["pid"].as_u64().is_some());
    assert_eq!(jobinfo["memGB"], json!(2));
    assert!(jobinfo["rust"]["binpath"]
        .as_str()
        .unwrap()
        .contains("sum_squares"));

    // Martian gives every chunk and the join their own metadata directory.
    let mut chunk_defs = Vec::new();
    let mut chunk_outs = Vec::new();
    for value in [1.0, 2.0, 3.0] {
        let chunk = Job::new();
        chunk.write("args", &json!({"values": values, "value": value}));
        let main = chunk.run("sum_squares", "main");
        assert!(main.status.success(), "{main:?}");
        assert_eq!(chunk.read("outs"), json!({"square": value * value}));
        assert!(chunk.journal("complete").exists());
        chunk_defs.push(json!({"value": value}));
        chunk_outs.push(chunk.read("outs"));
    }

    let join = Job::new();
    join.write("args", &json!({"values": values}));
    join.write("chunk_defs", &Value::Array(chunk_defs));
    join.write("chunk_outs", &Value::Array(chunk_outs));
    let output = join.run("sum_squares", "join");
    assert!(output.status.success(), "{output:?}");
    assert_eq!(join.read("outs"), json!({"sum": 14.0}));
    assert!(join.journal("join_complete").exists());
    assert!(join.journal("join_outs").exists());
}

#[test]
fn test_empty_input_is_an_assert() {
    let job = Job::new();
    job.write("args", &json!({"values": []}));

    let output = job.run("sum_squares", "split");
    assert!(!output.status.success());
    assert_eq!(
        fs::read_to_string(job.path("errors")).unwrap(),
        "ASSERT: values must not be empty"
    );
    assert!(!job.path("complete").exists());
    assert!(!job.path("stage_defs").exists());
}

#[test]
fn test_unknown_stage() {
    let job = Job::new();
    job.write("args", &json!({}));

    let output = job.run("no_such_stage", "main");
    assert!(!output.status.success());
    let errors = fs::read_to_string(job.path("errors")).unwrap();
    assert!(errors.starts_with("stage error:couldn't find requested stage no_such_stage"));
    assert!(!job.path("complete").exists());
}

#[test]
fn test_bad_phase_is_reported() {
    let job = Job::new();
    job.write("args", &json!({"values": [1.0], "sum": 1.0}));

    let output = job.run("report", "chunk");
    assert!(!output.status.success());
    let errors = fs::read_to_string(job.path("errors")).unwrap();
    assert!(errors.starts_with("stage error:Unrecognized stage type chunk"));
    assert!(!job.path("complete").exists());
}

#[test]
fn test_main_only_stage_rejects_split() {
    let job = Job::new();
    job.write("args", &json!({"values": [1.0], "sum": 1.0}));

    let output = job.run("report", "split");
    assert!(!output.status.success());
    let errors = fs::read_to_string(job.path("errors")).unwrap();
    assert!(errors.starts_with("ASSERT: stage report has no split"));
}

#[test]
fn test_report_writes_file() {
    let job = Job::new();
    job.write("args", &json!({"values": [1.0, 2.0, 3.0], "sum": 14.0}));

    let output = job.run("report", "main");
    assert!(output.status.success(), "{output:?}");

    let outs = job.read("outs");
    let report = Path::new(outs["report"].as_str().unwrap());
    assert_eq!(report, job.files.join("report.txt"));
    let text = fs::read_to_string(report).unwrap();
    assert!(text.contains("2^2 = 4\n"));
    assert!(text.ends_with("sum = 14\n"));

    assert_eq!(
        fs::read_to_string(job.path("progress")).unwrap(),
        "report written"
    );
    assert!(job.journal("progress").exists());
    assert!(fs::read_to_string(job.path("log"))
        .unwrap()
        .contains("report main complete"));

    let jobinfo = job.read("jobinfo");
    assert_eq!(
        jobinfo["cwd"].as_str().unwrap(),
        job.files.display().to_string()
    );
}
