//! Declarative helpers for stage authors.

/// Declare a Martian file type: a newtype over `PathBuf` that serializes as
/// the bare path and renders as `<ext>` in the MRO.
///
/// ```
/// martian::martian_filetype!(pub BamFile, "bam");
/// ```
#[macro_export]
macro_rules! martian_filetype {
    ($(#[$meta:meta])* $vis:vis $name:ident, $ext:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        $vis struct $name(::std::path::PathBuf);

        impl ::std::convert::AsRef<::std::path::Path> for $name {
            fn as_ref(&self) -> &::std::path::Path {
                &self.0
            }
        }

        impl $crate::MartianFileType for $name {
            fn extension() -> &'static str {
                $ext
            }

            fn from_path(path: ::std::path::PathBuf) -> Self {
                $name(path)
            }
        }

        impl $crate::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::serde::Serializer,
            {
                $crate::serde::Serialize::serialize(&self.0, serializer)
            }
        }

        impl<'de> $crate::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::serde::Deserializer<'de>,
            {
                <::std::path::PathBuf as $crate::serde::Deserialize>::deserialize(deserializer)
                    .map($name)
            }
        }
    };
}

/// Declare a struct and implement [`MartianStruct`](crate::MartianStruct) for
/// it, one MRO field per struct field in declaration order. Attributes pass
/// through unchanged, so derives (serde included) are written as usual.
///
/// Field-level serde attributes are not reflected in the MRO: a
/// `#[serde(rename)]` field keeps its Rust name and a `#[serde(skip)]` field
/// is still listed.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// martian::martian_struct! {
///     #[derive(Debug, Serialize, Deserialize)]
///     pub struct SortInputs {
///         pub unsorted: Vec<i64>,
///         pub reverse: bool,
///     }
/// }
/// ```
#[macro_export]
macro_rules! martian_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::MartianStruct for $name {
            fn mro_fields() -> ::std::vec::Vec<$crate::MroField> {
                ::std::vec![
                    $(
                        $crate::MroField::new(
                            ::std::stringify!($field),
                            <$ty as $crate::AsMartianBlanketType>::as_martian_blanket_type(),
                        ),
                    )*
                ]
            }
        }
    };
}

/// Build a [`StageRegistry`](crate::StageRegistry) from `main: Stage` and
/// `split: Stage` entries.
///
/// ```ignore
/// let registry = martian_stages![split: SumSquares, main: Report];
/// ```
#[macro_export]
macro_rules! martian_stages {
    (@register $registry:expr, main, $stage:expr) => {
        $registry.register_main($stage)
    };
    (@register $registry:expr, split, $stage:expr) => {
        $registry.register_split($stage)
    };
    ($($kind:ident : $stage:expr),* $(,)?) => {{
        let registry = $crate::StageRegistry::new();
        $(
            let registry = $crate::martian_stages!(@register registry, $kind, $stage);
        )*
        registry
    }};
}
