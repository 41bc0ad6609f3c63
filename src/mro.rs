//! Martian types and MRO stage definitions.
//!
//! An MRO `stage` block is described by
//! - a stage name,
//! - stage inputs/outputs and optional chunk inputs/outputs, each with a
//!   Martian type,
//! - the `src comp` line telling Martian how to run the adapter,
//! - `using` attributes (mem_gb, vmem_gb, threads, volatile) and `retain`ed
//!   outputs.
//!
//! Rust types describe their Martian type through [`AsMartianPrimaryType`] and
//! [`AsMartianBlanketType`]; stage input/output structs describe their fields
//! through [`MartianStruct`]; stages describe the whole block through
//! [`MroMaker`]. Everything renders column-aligned through [`MroDisplay`].

use crate::types::{MartianFileType, MartianVoid};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Words that the MRO grammar reserves; none of them may name a field.
const MARTIAN_TOKENS: &[&str] = &[
    "in", "out", "stage", "pipeline", "call", "return", "volatile", "strict", "true", "false",
    "null", "split", "using", "filetype", "src", "py", "comp", "exec", "retain", "self",
    "sweep", "struct", "map", "int", "float", "string", "bool", "path", "file", "local",
    "preflight", "disabled", "mem_gb", "vmem_gb", "threads", "special", "as", "default",
];

const INDENT_TAB_WIDTH_FOR_MRO: usize = 4;
const SRC_COMP: &str = "comp";

static FIELD_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static STAGE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());
static FILETYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)*$").unwrap());

/// Problems with a stage definition, found while building its MRO.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MroError {
    #[error("Martian token {0} cannot be used as field name")]
    ReservedName(String),
    #[error("invalid field name '{0}'")]
    InvalidName(String),
    #[error("field {field} appears more than once in the {section}")]
    DuplicateField { field: String, section: String },
    #[error("found identical field {0} in stage and chunk inputs")]
    ChunkInputShadowsStageInput(String),
    #[error(
        "identical field names in stage and chunk outputs need to have identical type. \
         Offending field -> {field} ({stage_type} vs {chunk_type})"
    )]
    OutputTypeMismatch {
        field: String,
        stage_type: String,
        chunk_type: String,
    },
    #[error("retained field {0} is not a stage output")]
    UnknownRetainedOutput(String),
    #[error("stage {0} is defined by more than one stage key")]
    DuplicateStage(String),
    #[error("stage name {0} must be UPPER_SNAKE_CASE")]
    InvalidStageName(String),
    #[error("cannot parse martian type '{0}'")]
    ParseType(String),
    #[error("expected strict for volatile, found {0}")]
    ParseVolatile(String),
}

/// Defines how an entity that denotes some part of the mro is displayed.
pub trait MroDisplay {
    /// Render unpadded (`None`) or padded to `field_width`.
    ///
    /// # Panics
    /// If `field_width` is smaller than [`min_width`](Self::min_width).
    fn mro_string(&self, field_width: Option<usize>) -> String {
        match field_width {
            Some(width) => {
                let min_width = self.min_width();
                assert!(
                    width >= min_width,
                    "Need a minimum width of {min_width}. Found {width}"
                );
                self.mro_string_with_width(width)
            }
            None => self.mro_string_no_width(),
        }
    }
    fn min_width(&self) -> usize;
    fn mro_string_no_width(&self) -> String;
    fn mro_string_with_width(&self, field_width: usize) -> String;
}

/// A blanket `Display` for every `MroDisplay` conflicts with other blanket
/// impls, so each type opts in here.
macro_rules! mro_display_to_display {
    ($type:ty) => {
        impl Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.mro_string_no_width())
            }
        }
    };
}

/// Width handling for single-token entities: left aligned, padded with spaces.
macro_rules! left_aligned_width {
    () => {
        fn min_width(&self) -> usize {
            self.mro_string_no_width().len()
        }
        fn mro_string_with_width(&self, field_width: usize) -> String {
            let value = self.mro_string_no_width();
            format!("{value:<field_width$}")
        }
    };
}

/// Primary data types in Martian world
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub enum MartianPrimaryType {
    Int,
    Float,
    Str,
    Bool,
    Map,
    Path,
    FileType(String),
}

impl MroDisplay for MartianPrimaryType {
    left_aligned_width! {}
    fn mro_string_no_width(&self) -> String {
        let value = match self {
            MartianPrimaryType::Int => "int",
            MartianPrimaryType::Float => "float",
            MartianPrimaryType::Str => "string",
            MartianPrimaryType::Bool => "bool",
            MartianPrimaryType::Map => "map",
            MartianPrimaryType::Path => "path",
            MartianPrimaryType::FileType(ext) => ext,
        };
        value.to_string()
    }
}

mro_display_to_display! {MartianPrimaryType}

impl FromStr for MartianPrimaryType {
    type Err = MroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "int" => MartianPrimaryType::Int,
            "float" => MartianPrimaryType::Float,
            "string" => MartianPrimaryType::Str,
            "bool" => MartianPrimaryType::Bool,
            "map" => MartianPrimaryType::Map,
            "path" => MartianPrimaryType::Path,
            ext if FILETYPE_RE.is_match(ext) => MartianPrimaryType::FileType(ext.to_string()),
            _ => return Err(MroError::ParseType(s.to_string())),
        })
    }
}

/// Primary types plus the containers Martian derives from them: arrays
/// (`int[]`, `int[][]`) and typed maps (`map<float>`).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub enum MartianBlanketType {
    Primary(MartianPrimaryType),
    Array(Box<MartianBlanketType>),
    TypedMap(Box<MartianBlanketType>),
}

impl MartianBlanketType {
    /// Extensions of every file type nested in this type.
    pub fn collect_file_types(&self, out: &mut BTreeSet<String>) {
        match self {
            MartianBlanketType::Primary(MartianPrimaryType::FileType(ext)) => {
                out.insert(ext.clone());
            }
            MartianBlanketType::Primary(_) => {}
            MartianBlanketType::Array(inner) | MartianBlanketType::TypedMap(inner) => {
                inner.collect_file_types(out);
            }
        }
    }
}

impl MroDisplay for MartianBlanketType {
    left_aligned_width! {}
    fn mro_string_no_width(&self) -> String {
        match self {
            MartianBlanketType::Primary(primary) => primary.to_string(),
            MartianBlanketType::Array(inner) => format!("{inner}[]"),
            MartianBlanketType::TypedMap(inner) => format!("map<{inner}>"),
        }
    }
}

mro_display_to_display! {MartianBlanketType}

impl FromStr for MartianBlanketType {
    type Err = MroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_suffix("[]") {
            return Ok(MartianBlanketType::Array(Box::new(inner.parse()?)));
        }
        if let Some(inner) = s.strip_prefix("map<").and_then(|rest| rest.strip_suffix('>')) {
            return Ok(MartianBlanketType::TypedMap(Box::new(inner.parse()?)));
        }
        Ok(MartianBlanketType::Primary(s.parse()?))
    }
}

/// How to convert a Rust data type to a basic Martian type.
pub trait AsMartianPrimaryType {
    fn as_martian_primary_type() -> MartianPrimaryType;
}

/// How to convert a Rust type into a [`MartianBlanketType`].
///
/// Not every Rust type has a Martian counterpart; unit and unit structs have
/// none. Any `AsMartianPrimaryType` is also an `AsMartianBlanketType`, so new
/// leaf types should implement `AsMartianPrimaryType` instead.
pub trait AsMartianBlanketType {
    fn as_martian_blanket_type() -> MartianBlanketType;
}

macro_rules! impl_primary_mro_type {
    ($mro_type:expr => $($rust_type:ty),+) => {
        $(
            impl AsMartianPrimaryType for $rust_type {
                fn as_martian_primary_type() -> MartianPrimaryType {
                    $mro_type
                }
            }
        )+
    };
}

impl_primary_mro_type!(MartianPrimaryType::Int => i8, i16, i32, i64, i128, isize);
impl_primary_mro_type!(MartianPrimaryType::Int => u8, u16, u32, u64, u128, usize);
impl_primary_mro_type!(MartianPrimaryType::Bool => bool);
impl_primary_mro_type!(MartianPrimaryType::Float => f32, f64);
impl_primary_mro_type!(MartianPrimaryType::Str => char, String, &'static str);
impl_primary_mro_type!(MartianPrimaryType::Path => Path, PathBuf);
impl_primary_mro_type!(MartianPrimaryType::Map => serde_json::Map<String, serde_json::Value>);

impl<T: MartianFileType> AsMartianPrimaryType for T {
    fn as_martian_primary_type() -> MartianPrimaryType {
        MartianPrimaryType::FileType(T::extension().to_string())
    }
}

impl<T: AsMartianPrimaryType> AsMartianBlanketType for T {
    fn as_martian_blanket_type() -> MartianBlanketType {
        MartianBlanketType::Primary(T::as_martian_primary_type())
    }
}

impl<T: AsMartianBlanketType> AsMartianBlanketType for Option<T> {
    fn as_martian_blanket_type() -> MartianBlanketType {
        // Any variable can be `null` in Martian
        T::as_martian_blanket_type()
    }
}

impl<T: AsMartianBlanketType> AsMartianBlanketType for Vec<T> {
    fn as_martian_blanket_type() -> MartianBlanketType {
        MartianBlanketType::Array(Box::new(T::as_martian_blanket_type()))
    }
}

impl<T: AsMartianBlanketType, H> AsMartianBlanketType for HashSet<T, H> {
    fn as_martian_blanket_type() -> MartianBlanketType {
        MartianBlanketType::Array(Box::new(T::as_martian_blanket_type()))
    }
}

impl<T: AsMartianBlanketType> AsMartianBlanketType for BTreeSet<T> {
    fn as_martian_blanket_type() -> MartianBlanketType {
        MartianBlanketType::Array(Box::new(T::as_martian_blanket_type()))
    }
}

impl<V: AsMartianBlanketType, H> AsMartianBlanketType for HashMap<String, V, H> {
    fn as_martian_blanket_type() -> MartianBlanketType {
        MartianBlanketType::TypedMap(Box::new(V::as_martian_blanket_type()))
    }
}

impl<V: AsMartianBlanketType> AsMartianBlanketType for BTreeMap<String, V> {
    fn as_martian_blanket_type() -> MartianBlanketType {
        MartianBlanketType::TypedMap(Box::new(V::as_martian_blanket_type()))
    }
}

/// A variable listed in the mro along with its type. The stage
/// ```mro
/// stage SORT_ITEMS(
///     in  int[] unsorted,
///     in  bool  reverse,
///     out int[] sorted,
///     src comp  "my_stage martian sort_items",
/// )
/// ```
/// has three: `unsorted: int[]`, `reverse: bool` and `sorted: int[]`.
#[derive(Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
pub struct MroField {
    name: String,
    ty: MartianBlanketType,
}

impl MroField {
    pub fn new(name: impl ToString, ty: MartianBlanketType) -> Self {
        MroField {
            name: name.to_string(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &MartianBlanketType {
        &self.ty
    }

    /// The name must be an identifier, not a Martian token and not start
    /// with `__` (reserved for resource keys).
    pub fn verify(&self) -> Result<(), MroError> {
        if MARTIAN_TOKENS.contains(&self.name.as_str()) {
            return Err(MroError::ReservedName(self.name.clone()));
        }
        if self.name.starts_with("__") || !FIELD_NAME_RE.is_match(&self.name) {
            return Err(MroError::InvalidName(self.name.clone()));
        }
        Ok(())
    }
}

impl MroDisplay for MroField {
    fn mro_string_no_width(&self) -> String {
        format!("{} {}", self.ty, self.name)
    }

    /// Width of the type column.
    fn min_width(&self) -> usize {
        self.ty.min_width()
    }

    fn mro_string_with_width(&self, field_width: usize) -> String {
        format!(
            "{} {}",
            self.ty.mro_string_with_width(field_width),
            self.name
        )
    }
}

mro_display_to_display! {MroField}

/// Expands a struct into the list of its [`MroField`]s.
///
/// The associated input/output types of [`MartianMain`](crate::MartianMain)
/// and [`MartianStage`](crate::MartianStage) implement this so the stage
/// definition can be generated. [`martian_struct!`](crate::martian_struct)
/// writes the impl.
pub trait MartianStruct {
    fn mro_fields() -> Vec<MroField>;
}

impl MartianStruct for MartianVoid {
    fn mro_fields() -> Vec<MroField> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Volatile {
    Strict,
}

impl FromStr for Volatile {
    type Err = MroError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Volatile::Strict),
            _ => Err(MroError::ParseVolatile(s.to_string())),
        }
    }
}

impl MroDisplay for Volatile {
    left_aligned_width! {}
    fn mro_string_no_width(&self) -> String {
        match self {
            Volatile::Strict => "strict".into(),
        }
    }
}

mro_display_to_display! {Volatile}

/// `key = value,` lines of a `using`/`retain` section body, followed by the
/// closing paren at `indent`.
fn section_body(indent: usize, lines: &[String]) -> String {
    let mut body = String::new();
    for line in lines {
        body.push_str(&format!(
            "{blank:width$}{line},\n",
            blank = "",
            width = indent + INDENT_TAB_WIDTH_FOR_MRO
        ));
    }
    body.push_str(&format!("{blank:indent$})\n", blank = ""));
    body
}

macro_rules! mro_using {
    ($($property:ident: $type:ty),*) => {
        /// Stuff that comes in the `using` section of a stage definition
        /// ```mro
        /// using (
        ///     mem_gb  = 4,
        ///     threads = 16,
        /// )
        /// ```
        #[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
        pub struct MroUsing {
            $(pub $property: Option<$type>,)*
        }

        impl MroUsing {
            /// False when every attribute is unset.
            pub fn need_using(&self) -> bool {
                $(self.$property.is_some())||*
            }

            fn entries(&self) -> Vec<(&'static str, String)> {
                let mut entries = Vec::new();
                $(
                    if let Some(value) = self.$property {
                        entries.push((stringify!($property), value.to_string()));
                    }
                )*
                entries
            }
        }
    };
}

mro_using! {mem_gb: i16, vmem_gb: i16, threads: i16, volatile: Volatile}

impl MroUsing {
    fn section_lines(&self) -> Vec<String> {
        let entries = self.entries();
        let key_width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        entries
            .into_iter()
            .map(|(key, value)| format!("{key:<key_width$} = {value}"))
            .collect()
    }
}

/// The using section starts with `using (` followed by lines with two
/// configurable widths
/// ```md
/// using (
///          mem_gb = 1,
///      )
/// <---><-->
///   w1  tab
/// ```
impl MroDisplay for MroUsing {
    fn min_width(&self) -> usize {
        0
    }

    fn mro_string_no_width(&self) -> String {
        self.mro_string_with_width(self.min_width())
    }

    fn mro_string_with_width(&self, w1: usize) -> String {
        if !self.need_using() {
            return String::new();
        }
        format!("using (\n{}", section_body(w1, &self.section_lines()))
    }
}

mro_display_to_display! {MroUsing}

/// Outputs Martian keeps around even when the stage is volatile.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MroRetain {
    pub fields: Vec<String>,
}

impl MroDisplay for MroRetain {
    fn min_width(&self) -> usize {
        0
    }

    fn mro_string_no_width(&self) -> String {
        self.mro_string_with_width(0)
    }

    fn mro_string_with_width(&self, indent: usize) -> String {
        if self.fields.is_empty() {
            return String::new();
        }
        format!("retain (\n{}", section_body(indent, &self.fields))
    }
}

mro_display_to_display! {MroRetain}

/// Inputs and outputs of a stage or of its chunks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InAndOut {
    pub inputs: Vec<MroField>,
    pub outputs: Vec<MroField>,
}

impl InAndOut {
    pub fn from_structs<I: MartianStruct, O: MartianStruct>() -> Self {
        InAndOut {
            inputs: I::mro_fields(),
            outputs: O::mro_fields(),
        }
    }

    fn fields(&self) -> impl Iterator<Item = &MroField> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}

fn check_unique(fields: &[MroField], section: &str) -> Result<(), MroError> {
    let mut seen = HashSet::new();
    for field in fields {
        field.verify()?;
        if !seen.insert(field.name()) {
            return Err(MroError::DuplicateField {
                field: field.name.clone(),
                section: section.to_string(),
            });
        }
    }
    Ok(())
}

/// All the data needed to write the `stage` block of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMro {
    /// e.g. CORRECT_BARCODES in `stage CORRECT_BARCODES(..)`
    stage_name: String,
    /// e.g. `cr_slfe` in `src comp "cr_slfe martian correct_barcodes"`
    adapter_name: String,
    /// e.g. `correct_barcodes` in `src comp "cr_slfe martian correct_barcodes"`
    stage_key: String,
    stage_in_out: InAndOut,
    /// None for a stage with only a main
    chunk_in_out: Option<InAndOut>,
    using_attrs: MroUsing,
    retain: MroRetain,
}

impl StageMro {
    /// Validate the definition and drop chunk outputs that repeat a stage
    /// output of the same type.
    pub fn new(
        stage_name: impl ToString,
        adapter_name: impl ToString,
        stage_key: impl ToString,
        stage_in_out: InAndOut,
        chunk_in_out: Option<InAndOut>,
        using_attrs: MroUsing,
        retain: MroRetain,
    ) -> Result<Self, MroError> {
        let mut stage = StageMro {
            stage_name: stage_name.to_string(),
            adapter_name: adapter_name.to_string(),
            stage_key: stage_key.to_string(),
            stage_in_out,
            chunk_in_out,
            using_attrs,
            retain,
        };
        stage.verify_and_minify()?;
        Ok(stage)
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    pub fn stage_key(&self) -> &str {
        &self.stage_key
    }

    pub fn chunk_in_out(&self) -> Option<&InAndOut> {
        self.chunk_in_out.as_ref()
    }

    fn verify_and_minify(&mut self) -> Result<(), MroError> {
        if !STAGE_NAME_RE.is_match(&self.stage_name) {
            return Err(MroError::InvalidStageName(self.stage_name.clone()));
        }
        check_unique(&self.stage_in_out.inputs, "stage inputs")?;
        check_unique(&self.stage_in_out.outputs, "stage outputs")?;

        for name in &self.retain.fields {
            if !self.stage_in_out.outputs.iter().any(|f| &f.name == name) {
                return Err(MroError::UnknownRetainedOutput(name.clone()));
            }
        }

        let Some(chunk) = self.chunk_in_out.as_mut() else {
            return Ok(());
        };
        check_unique(&chunk.inputs, "chunk inputs")?;
        check_unique(&chunk.outputs, "chunk outputs")?;

        for chunk_field in &chunk.inputs {
            if self
                .stage_in_out
                .inputs
                .iter()
                .any(|f| f.name == chunk_field.name)
            {
                return Err(MroError::ChunkInputShadowsStageInput(
                    chunk_field.name.clone(),
                ));
            }
        }

        let mut min_chunk_outputs = Vec::with_capacity(chunk.outputs.len());
        for chunk_field in chunk.outputs.drain(..) {
            match self
                .stage_in_out
                .outputs
                .iter()
                .find(|f| f.name == chunk_field.name)
            {
                Some(stage_field) if stage_field.ty != chunk_field.ty => {
                    return Err(MroError::OutputTypeMismatch {
                        field: chunk_field.name.clone(),
                        stage_type: stage_field.ty.to_string(),
                        chunk_type: chunk_field.ty.to_string(),
                    });
                }
                Some(_) => {}
                None => min_chunk_outputs.push(chunk_field),
            }
        }
        chunk.outputs = min_chunk_outputs;
        Ok(())
    }

    fn all_fields(&self) -> impl Iterator<Item = &MroField> {
        self.stage_in_out
            .fields()
            .chain(self.chunk_in_out.iter().flat_map(|chunk| chunk.fields()))
    }

    /// Extensions of every file type used by this stage.
    pub fn file_types(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for field in self.all_fields() {
            field.ty.collect_file_types(&mut out);
        }
        out
    }

    /// Width of the type column shared by every line of the block.
    fn type_width(&self) -> usize {
        self.all_fields()
            .map(|f| f.min_width())
            .fold(SRC_COMP.len(), usize::max)
    }
}

fn write_in_and_out(out: &mut String, in_out: &InAndOut, width: usize) {
    let keyed = in_out
        .inputs
        .iter()
        .map(|f| ("in", f))
        .chain(in_out.outputs.iter().map(|f| ("out", f)));
    for (key, field) in keyed {
        out.push_str(&format!(
            "{blank:indent$}{key:<3} {field},\n",
            blank = "",
            indent = INDENT_TAB_WIDTH_FOR_MRO,
            field = field.mro_string_with_width(width),
        ));
    }
}

impl Display for StageMro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.type_width();
        let mut out = format!("stage {}(\n", self.stage_name);
        write_in_and_out(&mut out, &self.stage_in_out, width);
        out.push_str(&format!(
            "{blank:indent$}{key:<3} {comp:<width$} \"{adapter} martian {stage_key}\",\n",
            blank = "",
            indent = INDENT_TAB_WIDTH_FOR_MRO,
            key = "src",
            comp = SRC_COMP,
            adapter = self.adapter_name,
            stage_key = self.stage_key,
        ));
        if let Some(chunk) = &self.chunk_in_out {
            out.push_str(") split (\n");
            write_in_and_out(&mut out, chunk, width);
        }
        // Each section closes itself; the next one reuses that paren.
        let sections = [self.using_attrs.to_string(), self.retain.to_string()];
        for section in sections.iter().filter(|s| !s.is_empty()) {
            out.push_str(") ");
            out.push_str(section.strip_suffix(")\n").unwrap_or(section));
        }
        out.push_str(")\n");
        f.write_str(&out)
    }
}

/// `filetype` declarations for every file type used by a set of stages.
#[derive(Debug, Default)]
pub struct FiletypeHeader(BTreeSet<String>);

impl FiletypeHeader {
    pub fn add_stage(&mut self, stage: &StageMro) {
        self.0.extend(stage.file_types());
    }
}

impl Display for FiletypeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ext in &self.0 {
            writeln!(f, "filetype {ext};")?;
        }
        if !self.0.is_empty() {
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Describes the MRO of a stage type. Only the stage inputs/outputs are
/// required; everything else defaults to a main-only stage with no `using`
/// section, named after the type in UPPER_SNAKE_CASE.
pub trait MroMaker {
    fn stage_name() -> String {
        crate::utils::type_stage_name::<Self>()
    }

    fn stage_in_and_out() -> InAndOut;

    fn chunk_in_and_out() -> Option<InAndOut> {
        None
    }

    fn using_attributes() -> MroUsing {
        MroUsing::default()
    }

    fn retained_outputs() -> Vec<String> {
        Vec::new()
    }

    fn stage_mro(adapter_name: &str, stage_key: &str) -> Result<StageMro, MroError> {
        StageMro::new(
            Self::stage_name(),
            adapter_name,
            stage_key,
            Self::stage_in_and_out(),
            Self::chunk_in_and_out(),
            Self::using_attributes(),
            MroRetain {
                fields: Self::retained_outputs(),
            },
        )
    }

    fn mro(adapter_name: &str, stage_key: &str) -> Result<String, MroError> {
        Ok(Self::stage_mro(adapter_name, stage_key)?.to_string())
    }
}
