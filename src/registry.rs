//! Stage lookup for the runtime and for MRO generation.

use std::collections::{BTreeMap, HashSet};

use log::warn;

use crate::mro::{MroError, MroMaker, StageMro};
use crate::stage::{MainStage, MartianMain, MartianStage, RawMartianStage, SplitStage};
use crate::utils::type_stage_key;

type MroFn = fn(&str, &str) -> Result<StageMro, MroError>;

struct RegisteredStage {
    stage: Box<dyn RawMartianStage>,
    mro: MroFn,
}

/// Every stage an adapter binary can run, keyed by stage key.
#[derive(Default)]
pub struct StageRegistry {
    stages: BTreeMap<String, RegisteredStage>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a main-only stage under the snake_case form of its type name.
    pub fn register_main<T>(self, stage: T) -> Self
    where
        T: MartianMain + MroMaker + 'static,
    {
        self.register_main_with_key(type_stage_key::<T>(), stage)
    }

    pub fn register_main_with_key<T>(self, key: impl ToString, stage: T) -> Self
    where
        T: MartianMain + MroMaker + 'static,
    {
        self.insert(key.to_string(), Box::new(MainStage(stage)), T::stage_mro)
    }

    /// Register a split/main/join stage under the snake_case form of its
    /// type name.
    pub fn register_split<T>(self, stage: T) -> Self
    where
        T: MartianStage + MroMaker + 'static,
    {
        self.register_split_with_key(type_stage_key::<T>(), stage)
    }

    pub fn register_split_with_key<T>(self, key: impl ToString, stage: T) -> Self
    where
        T: MartianStage + MroMaker + 'static,
    {
        self.insert(key.to_string(), Box::new(SplitStage(stage)), T::stage_mro)
    }

    fn insert(mut self, key: String, stage: Box<dyn RawMartianStage>, mro: MroFn) -> Self {
        if self.stages.contains_key(&key) {
            warn!("Stage {key} registered twice, keeping the last one");
        }
        self.stages.insert(key, RegisteredStage { stage, mro });
        self
    }

    pub fn get(&self, key: &str) -> Option<&dyn RawMartianStage> {
        self.stages.get(key).map(|s| s.stage.as_ref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_mro(&self, adapter_name: &str, key: &str) -> Option<Result<StageMro, MroError>> {
        self.stages.get(key).map(|s| (s.mro)(adapter_name, key))
    }

    /// MRO definitions of every stage, ordered by stage key. Fails when two
    /// keys render the same `stage NAME(` block.
    pub fn stage_mros(&self, adapter_name: &str) -> Result<Vec<StageMro>, MroError> {
        let mut names = HashSet::new();
        let mut mros = Vec::with_capacity(self.stages.len());
        for (key, s) in &self.stages {
            let mro = (s.mro)(adapter_name, key)?;
            if !names.insert(mro.stage_name().to_string()) {
                return Err(MroError::DuplicateStage(mro.stage_name().to_string()));
            }
            mros.push(mro);
        }
        Ok(mros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mro::InAndOut;
    use crate::stage::{MartianRover, StageDef, StageKind};
    use crate::types::MartianVoid;
    use anyhow::Result;

    struct Hello;

    impl MartianMain for Hello {
        type StageInputs = MartianVoid;
        type StageOutputs = MartianVoid;

        fn main(&self, _args: MartianVoid, _rover: MartianRover) -> Result<MartianVoid> {
            Ok(MartianVoid)
        }
    }

    impl MroMaker for Hello {
        fn stage_in_and_out() -> InAndOut {
            InAndOut::from_structs::<MartianVoid, MartianVoid>()
        }
    }

    struct Fanout;

    impl MartianStage for Fanout {
        type StageInputs = MartianVoid;
        type StageOutputs = MartianVoid;
        type ChunkInputs = MartianVoid;
        type ChunkOutputs = MartianVoid;

        fn split(&self, _args: MartianVoid, _rover: MartianRover) -> Result<StageDef<MartianVoid>> {
            Ok(StageDef::new())
        }

        fn main(&self, _: MartianVoid, _: MartianVoid, _: MartianRover) -> Result<MartianVoid> {
            Ok(MartianVoid)
        }

        fn join(
            &self,
            _: MartianVoid,
            _: Vec<MartianVoid>,
            _: Vec<MartianVoid>,
            _: MartianRover,
        ) -> Result<MartianVoid> {
            Ok(MartianVoid)
        }
    }

    impl MroMaker for Fanout {
        fn stage_in_and_out() -> InAndOut {
            InAndOut::default()
        }

        fn chunk_in_and_out() -> Option<InAndOut> {
            Some(InAndOut::default())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = crate::martian_stages![main: Hello, split: Fanout];
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys().collect::<Vec<_>>(), ["fanout", "hello"]);
        assert_eq!(
            registry.get("hello").map(|s| s.stage_kind()),
            Some(StageKind::MainOnly)
        );
        assert_eq!(
            registry.get("fanout").map(|s| s.stage_kind()),
            Some(StageKind::WithSplit)
        );
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_stage_mros_are_sorted_by_key() {
        let registry = StageRegistry::new()
            .register_main_with_key("zeta", Hello)
            .register_split(Fanout);
        let mros = registry.stage_mros("adapter").unwrap();
        let keys: Vec<_> = mros.iter().map(|m| m.stage_key()).collect();
        assert_eq!(keys, ["fanout", "zeta"]);
        assert_eq!(mros[1].stage_name(), "HELLO");
        assert!(mros[0].to_string().contains(") split (\n"));
        assert!(registry.stage_mro("adapter", "nope").is_none());
    }

    #[test]
    fn test_stage_name_defined_once() {
        let registry = StageRegistry::new()
            .register_main_with_key("a", Hello)
            .register_main_with_key("b", Hello);
        assert_eq!(
            registry.stage_mros("adapter"),
            Err(MroError::DuplicateStage("HELLO".into()))
        );
        assert!(registry.stage_mro("adapter", "b").unwrap().is_ok());
    }
}
