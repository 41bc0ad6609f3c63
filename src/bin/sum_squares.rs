//! Demo adapter: squares numbers in parallel chunks, sums them in the join,
//! then writes a short text report.
//!
//! ```text
//! sum_squares mro                      # print the stage definitions
//! sum_squares martian sum_squares split <metadata> <files> <run_file>
//! ```

use std::fs;
use std::process::ExitCode;

use martian::prelude::*;

martian_filetype!(pub TxtFile, "txt");

martian_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SumSquaresStageInputs {
        pub values: Vec<f64>,
    }
}

martian_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SumSquaresStageOutputs {
        pub sum: f64,
    }
}

martian_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SumSquaresChunkInputs {
        pub value: f64,
    }
}

martian_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SumSquaresChunkOutputs {
        pub square: f64,
    }
}

pub struct SumSquares;

impl MartianStage for SumSquares {
    type StageInputs = SumSquaresStageInputs;
    type StageOutputs = SumSquaresStageOutputs;
    type ChunkInputs = SumSquaresChunkInputs;
    type ChunkOutputs = SumSquaresChunkOutputs;

    fn split(
        &self,
        args: SumSquaresStageInputs,
        _rover: MartianRover,
    ) -> Result<StageDef<SumSquaresChunkInputs>> {
        if args.values.is_empty() {
            return Err(StageError::exit("values must not be empty").into());
        }
        let mut stage_def = StageDef::with_join_resource(Resource::new().with_mem_gb(1));
        for value in args.values {
            stage_def.add_chunk_with_resource(
                SumSquaresChunkInputs { value },
                Resource::new().with_mem_gb(1),
            );
        }
        Ok(stage_def)
    }

    fn main(
        &self,
        _args: SumSquaresStageInputs,
        chunk_args: SumSquaresChunkInputs,
        _rover: MartianRover,
    ) -> Result<SumSquaresChunkOutputs> {
        Ok(SumSquaresChunkOutputs {
            square: chunk_args.value * chunk_args.value,
        })
    }

    fn join(
        &self,
        _args: SumSquaresStageInputs,
        _chunk_defs: Vec<SumSquaresChunkInputs>,
        chunk_outs: Vec<SumSquaresChunkOutputs>,
        _rover: MartianRover,
    ) -> Result<SumSquaresStageOutputs> {
        Ok(SumSquaresStageOutputs {
            sum: chunk_outs.iter().map(|out| out.square).sum(),
        })
    }
}

impl MroMaker for SumSquares {
    fn stage_in_and_out() -> InAndOut {
        InAndOut::from_structs::<SumSquaresStageInputs, SumSquaresStageOutputs>()
    }

    fn chunk_in_and_out() -> Option<InAndOut> {
        Some(InAndOut::from_structs::<
            SumSquaresChunkInputs,
            SumSquaresChunkOutputs,
        >())
    }

    fn using_attributes() -> MroUsing {
        MroUsing {
            mem_gb: Some(1),
            threads: Some(1),
            ..Default::default()
        }
    }
}

martian_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ReportStageInputs {
        pub values: Vec<f64>,
        pub sum: f64,
    }
}

martian_struct! {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ReportStageOutputs {
        pub report: TxtFile,
    }
}

pub struct Report;

impl MartianMain for Report {
    type StageInputs = ReportStageInputs;
    type StageOutputs = ReportStageOutputs;

    fn main(&self, args: ReportStageInputs, rover: MartianRover) -> Result<ReportStageOutputs> {
        let report: TxtFile = rover.make_file("report");
        let mut text = String::new();
        for value in &args.values {
            text.push_str(&format!("{value}^2 = {}\n", value * value));
        }
        text.push_str(&format!("sum = {}\n", args.sum));
        fs::write(&report, text)
            .with_context(|| format!("writing {}", report.as_ref().display()))?;
        rover.progress("report written")?;
        Ok(ReportStageOutputs { report })
    }
}

impl MroMaker for Report {
    fn stage_in_and_out() -> InAndOut {
        InAndOut::from_structs::<ReportStageInputs, ReportStageOutputs>()
    }

    fn using_attributes() -> MroUsing {
        MroUsing {
            volatile: Some(Volatile::Strict),
            ..Default::default()
        }
    }

    fn retained_outputs() -> Vec<String> {
        vec!["report".into()]
    }
}

fn main() -> ExitCode {
    let registry = martian_stages![split: SumSquares, main: Report];
    martian::cli::run_adapter("sum_squares", &registry)
}
