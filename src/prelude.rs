//! Everything a stage author usually needs: `use martian::prelude::*;`

pub use anyhow::{bail, Context, Result};
pub use serde::{Deserialize, Serialize};

pub use crate::mro::{
    AsMartianBlanketType, InAndOut, MartianStruct, MroField, MroMaker, MroUsing, Volatile,
};
pub use crate::registry::StageRegistry;
pub use crate::stage::{
    MartianMain, MartianRover, MartianStage, Resource, StageDef, StageError,
};
pub use crate::types::{MartianFileType, MartianVoid};
pub use crate::{martian_filetype, martian_stages, martian_struct};
