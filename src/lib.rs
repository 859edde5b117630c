//! Bytecode rewriting that turns nullability annotations into runtime checks
//!
//! Compiled JVM classes carry nullability intent in two places: a `package-info` annotated
//! with an opt-in marker, and per-parameter not-null/nullable annotations. This crate reads
//! class files, decides per the annotations which reference parameters must not be null, and
//! splices `java.util.Objects.requireNonNull` calls onto the front of the affected method
//! bodies, keeping every bytecode-position-sensitive table in the class consistent.
//!
//! ```no_run
//! use nullweaver::{add_null_enforcement, AnnotationConfig, PackageRegistry};
//!
//! # fn main() -> Result<(), nullweaver::Error> {
//! let config = AnnotationConfig::default();
//! let artifacts: Vec<Vec<u8>> = vec![/* class files out of an archive */];
//!
//! let mut registry = PackageRegistry::new();
//! for artifact in &artifacts {
//!     registry.scan_package_descriptor(artifact, &config)?;
//! }
//!
//! let mut total = 0;
//! for artifact in &artifacts {
//!     let rewrite = add_null_enforcement(artifact, &registry, &config)?;
//!     total += rewrite.checks_added;
//! }
//! # Ok(())
//! # }
//! ```

pub mod instrument;
pub mod jvm;
mod util;

pub use instrument::{add_null_enforcement, AnnotationConfig, Error, PackageRegistry, Rewrite};
