//! Compilation units and the directive processor that discovers them.

pub mod magic;
pub mod processor;
pub mod requires;
pub mod resolver;
pub mod unit;

pub use processor::{DirectiveError, DirectiveProcessor};
pub use requires::{PackageQuery, RequirementError};
pub use resolver::{IncludePath, SourceResolver};
pub use unit::{CompilationUnit, UnitError, UnitKind};
