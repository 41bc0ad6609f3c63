//! Stage traits and the data that flows between stage phases.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::{Metadata, MetadataDir, StagePhase};
use crate::types::MartianFileType;

const DEFAULT_THREADS: usize = 1;
const DEFAULT_MEM_GB: usize = 1;
const DEFAULT_VMEM_GB: usize = 3;

/// Ways a stage can fail.
#[derive(Debug, Error)]
pub enum StageError {
    /// Controlled shutdown for known condition in data or config
    #[error("{message}")]
    MartianExit { message: String },

    /// Unexpected error
    #[error("{message}")]
    PipelineError { message: String },
}

impl StageError {
    pub fn exit(message: impl ToString) -> Self {
        StageError::MartianExit {
            message: message.to_string(),
        }
    }

    pub fn pipeline(message: impl ToString) -> Self {
        StageError::PipelineError {
            message: message.to_string(),
        }
    }
}

/// Resource request for one chunk or the join. Unset values fall back to the
/// `using` section of the stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "__mem_gb", default, skip_serializing_if = "Option::is_none")]
    mem_gb: Option<isize>,
    #[serde(rename = "__vmem_gb", default, skip_serializing_if = "Option::is_none")]
    vmem_gb: Option<isize>,
    #[serde(rename = "__threads", default, skip_serializing_if = "Option::is_none")]
    threads: Option<isize>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mem_gb(mut self, mem_gb: isize) -> Self {
        self.mem_gb = Some(mem_gb);
        self
    }

    pub fn with_vmem_gb(mut self, vmem_gb: isize) -> Self {
        self.vmem_gb = Some(vmem_gb);
        self
    }

    pub fn with_threads(mut self, threads: isize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn mem_gb(&self) -> Option<isize> {
        self.mem_gb
    }

    pub fn vmem_gb(&self) -> Option<isize> {
        self.vmem_gb
    }

    pub fn threads(&self) -> Option<isize> {
        self.threads
    }
}

/// One chunk of a split: the chunk inputs with the resource keys alongside,
/// which is exactly the `_args` Martian gives the chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDef<T> {
    #[serde(flatten)]
    pub inputs: T,
    #[serde(flatten)]
    pub resource: Resource,
}

/// What a split returns; written to `_stage_defs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDef<T> {
    chunks: Vec<ChunkDef<T>>,
    #[serde(rename = "join")]
    join_resource: Resource,
}

impl<T> Default for StageDef<T> {
    fn default() -> Self {
        StageDef {
            chunks: Vec::new(),
            join_resource: Resource::default(),
        }
    }
}

impl<T> StageDef<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_join_resource(join_resource: Resource) -> Self {
        StageDef {
            chunks: Vec::new(),
            join_resource,
        }
    }

    pub fn add_chunk(&mut self, inputs: T) {
        self.add_chunk_with_resource(inputs, Resource::default());
    }

    pub fn add_chunk_with_resource(&mut self, inputs: T, resource: Resource) {
        self.chunks.push(ChunkDef { inputs, resource });
    }

    pub fn set_join_resource(&mut self, join_resource: Resource) {
        self.join_resource = join_resource;
    }

    pub fn chunks(&self) -> &[ChunkDef<T>] {
        &self.chunks
    }

    pub fn join_resource(&self) -> Resource {
        self.join_resource
    }
}

/// Handed to every stage phase: where to put files and what resources the
/// job was given.
#[derive(Debug, Clone)]
pub struct MartianRover {
    files_path: PathBuf,
    threads: usize,
    mem_gb: usize,
    vmem_gb: usize,
    metadata: Option<MetadataDir>,
}

impl MartianRover {
    pub fn new(files_path: impl AsRef<Path>, resource: Resource) -> Self {
        let positive = |v: Option<isize>, default: usize| {
            v.and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        MartianRover {
            files_path: files_path.as_ref().to_path_buf(),
            threads: positive(resource.threads(), DEFAULT_THREADS),
            mem_gb: positive(resource.mem_gb(), DEFAULT_MEM_GB),
            vmem_gb: positive(resource.vmem_gb(), DEFAULT_VMEM_GB),
            metadata: None,
        }
    }

    pub(crate) fn with_metadata(mut self, metadata: MetadataDir) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn files_path(&self) -> &Path {
        &self.files_path
    }

    /// `<files_dir>/<filename>`
    pub fn make_path<T: From<PathBuf>>(&self, filename: impl AsRef<Path>) -> T {
        T::from(self.files_path.join(filename))
    }

    /// A file of type `F` named `<filename>.<ext>` in the files directory.
    pub fn make_file<F: MartianFileType>(&self, filename: impl AsRef<Path>) -> F {
        F::new(&self.files_path, filename)
    }

    pub fn get_threads(&self) -> usize {
        self.threads
    }

    pub fn get_mem_gb(&self) -> usize {
        self.mem_gb
    }

    pub fn get_vmem_gb(&self) -> usize {
        self.vmem_gb
    }

    /// Report progress to Martian (`_progress`).
    pub fn progress(&self, message: &str) -> Result<()> {
        info!("progress: {message}");
        match &self.metadata {
            Some(dir) => dir.write_raw("progress", message),
            None => Ok(()),
        }
    }

    /// Raise a non-fatal alarm shown to the pipeline user (`_alarm`).
    pub fn alarm(&self, message: &str) -> Result<()> {
        info!("alarm: {message}");
        match &self.metadata {
            Some(dir) => dir.append_raw("alarm", &format!("{message}\n")),
            None => Ok(()),
        }
    }
}

/// A stage without a split: a single main producing the stage outputs.
pub trait MartianMain {
    type StageInputs: Serialize + DeserializeOwned;
    type StageOutputs: Serialize + DeserializeOwned;

    fn main(&self, args: Self::StageInputs, rover: MartianRover) -> Result<Self::StageOutputs>;
}

/// A stage that splits into chunks, runs main once per chunk and joins the
/// chunk outputs.
pub trait MartianStage {
    type StageInputs: Serialize + DeserializeOwned;
    type StageOutputs: Serialize + DeserializeOwned;
    type ChunkInputs: Serialize + DeserializeOwned;
    type ChunkOutputs: Serialize + DeserializeOwned;

    fn split(
        &self,
        args: Self::StageInputs,
        rover: MartianRover,
    ) -> Result<StageDef<Self::ChunkInputs>>;

    fn main(
        &self,
        args: Self::StageInputs,
        chunk_args: Self::ChunkInputs,
        rover: MartianRover,
    ) -> Result<Self::ChunkOutputs>;

    fn join(
        &self,
        args: Self::StageInputs,
        chunk_defs: Vec<Self::ChunkInputs>,
        chunk_outs: Vec<Self::ChunkOutputs>,
        rover: MartianRover,
    ) -> Result<Self::StageOutputs>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    MainOnly,
    WithSplit,
}

/// A stage with its types erased: each phase reads its inputs from the
/// metadata directory and writes its outputs back.
pub trait RawMartianStage {
    fn split(&self, metadata: &Metadata) -> Result<()>;
    fn main(&self, metadata: &Metadata) -> Result<()>;
    fn join(&self, metadata: &Metadata) -> Result<()>;
    fn stage_kind(&self) -> StageKind;

    fn run(&self, metadata: &Metadata) -> Result<()> {
        match metadata.stage_type {
            StagePhase::Split => self.split(metadata),
            StagePhase::Main => self.main(metadata),
            StagePhase::Join => self.join(metadata),
        }
    }
}

/// Runs a [`MartianMain`].
pub struct MainStage<T>(pub T);

/// Runs a [`MartianStage`].
pub struct SplitStage<T>(pub T);

fn no_such_phase(metadata: &Metadata) -> anyhow::Error {
    StageError::pipeline(format!(
        "stage {} has no split, cannot run {}",
        metadata.stage_name, metadata.stage_type
    ))
    .into()
}

impl<T: MartianMain> RawMartianStage for MainStage<T> {
    fn split(&self, metadata: &Metadata) -> Result<()> {
        Err(no_such_phase(metadata))
    }

    fn main(&self, metadata: &Metadata) -> Result<()> {
        let args: T::StageInputs = metadata.decode("args")?;
        let outs = self.0.main(args, metadata.rover())?;
        metadata.write_json("outs", &outs)
    }

    fn join(&self, metadata: &Metadata) -> Result<()> {
        Err(no_such_phase(metadata))
    }

    fn stage_kind(&self) -> StageKind {
        StageKind::MainOnly
    }
}

impl<T: MartianStage> RawMartianStage for SplitStage<T> {
    fn split(&self, metadata: &Metadata) -> Result<()> {
        let args: T::StageInputs = metadata.decode("args")?;
        let stage_defs = self.0.split(args, metadata.rover())?;
        info!("split into {} chunks", stage_defs.chunks().len());
        metadata.write_json("stage_defs", &stage_defs)
    }

    fn main(&self, metadata: &Metadata) -> Result<()> {
        // Chunk `_args` hold the stage inputs and the chunk inputs together.
        let args: T::StageInputs = metadata.decode("args")?;
        let chunk_args: T::ChunkInputs = metadata.decode("args")?;
        let outs = self.0.main(args, chunk_args, metadata.rover())?;
        metadata.write_json("outs", &outs)
    }

    fn join(&self, metadata: &Metadata) -> Result<()> {
        let args: T::StageInputs = metadata.decode("args")?;
        let chunk_defs: Vec<T::ChunkInputs> = metadata.decode("chunk_defs")?;
        let chunk_outs: Vec<T::ChunkOutputs> = metadata.decode("chunk_outs")?;
        let outs = self.0.join(args, chunk_defs, chunk_outs, metadata.rover())?;
        metadata.write_json("outs", &outs)
    }

    fn stage_kind(&self) -> StageKind {
        StageKind::WithSplit
    }
}
