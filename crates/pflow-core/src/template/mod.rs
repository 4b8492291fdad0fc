//! Template substitution: runtime resolution and compile-time validation
//! both live here since they share the same path grammar.

pub mod grammar;
pub mod resolver;
pub mod validator;

pub use grammar::{Path, Segment};
pub use resolver::{
    find_unresolved, resolve_nested, resolve_path, resolve_template, variable_exists,
    TemplateContext,
};
pub use validator::{validate_params, validate_path, Diagnostic, Shape, StructureContext};
