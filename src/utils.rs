//! Naming helpers shared by the registry and MRO generation.

use convert_case::{Case, Casing};

/// Last path segment of a type name without generics:
/// `my_crate::stages::SumSquares<T>` -> `SumSquares`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

/// Key used in `src comp "<adapter> martian <key>"`, e.g. `sum_squares`.
pub fn to_stage_key(name: &str) -> String {
    name.to_case(Case::Snake)
}

/// Name used in `stage NAME(`, e.g. `SUM_SQUARES`.
pub fn to_stage_name(name: &str) -> String {
    name.to_case(Case::UpperSnake)
}

pub fn type_stage_key<T: ?Sized>() -> String {
    to_stage_key(short_type_name::<T>())
}

pub fn type_stage_name<T: ?Sized>() -> String {
    to_stage_name(short_type_name::<T>())
}
