//! Inserting parameter null checks into compiled classes
//!
//! Rewriting is a two pass affair: [`PackageRegistry::scan_package_descriptor`] is fed every
//! artifact once to find packages whose `package-info` opts in, then [`add_null_enforcement`]
//! rewrites each class against that registry.

mod errors;
mod inject;
mod policy;
mod rewrite;

pub use errors::Error;
pub use inject::{
    null_check_prologue, Instruction, NULL_CHECK_DESCRIPTOR, NULL_CHECK_NAME, NULL_CHECK_OWNER,
    PROLOGUE_STACK,
};
pub use policy::{
    package_name, AnnotationConfig, InstrumentationPlan, MethodNullability, PackageRegistry,
};
pub use rewrite::{add_null_enforcement, Rewrite};
