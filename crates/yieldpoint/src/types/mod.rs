mod cell;
mod class;
mod dict;
mod string;

use std::fmt;

pub use cell::ClosureCell;
pub use class::{Class, CtorHook, EqHook, HashHook, Instance};
pub use dict::Dict;
pub use string::Str;

use crate::exception_private::ExcType;

/// The runtime type of a value, used for type names in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Tuple,
    Cell,
    Type,
    Object,
    Exception(ExcType),
    Traceback,
    Generator,
    Frame,
    Code,
    Dict,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoneType => f.write_str("NoneType"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("str"),
            Self::Tuple => f.write_str("tuple"),
            Self::Cell => f.write_str("cell"),
            Self::Type => f.write_str("type"),
            Self::Object => f.write_str("object"),
            Self::Exception(exc_type) => write!(f, "{exc_type}"),
            Self::Traceback => f.write_str("traceback"),
            Self::Generator => f.write_str("generator"),
            Self::Frame => f.write_str("frame"),
            Self::Code => f.write_str("code"),
            Self::Dict => f.write_str("dict"),
        }
    }
}
