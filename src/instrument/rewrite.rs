use super::errors::Error;
use super::inject::{
    null_check_prologue, NULL_CHECK_DESCRIPTOR, NULL_CHECK_NAME, NULL_CHECK_OWNER,
    PROLOGUE_STACK,
};
use super::policy::{package_name, AnnotationConfig, InstrumentationPlan, MethodNullability, PackageRegistry};
use crate::jvm::{
    structural_events, ClassEvent, ClassFile, MethodDescriptor, ParseDescriptor, Serialize,
};
use std::io;

/// Outcome of rewriting one class artifact
#[derive(Debug)]
pub struct Rewrite {
    /// Serialized class, identical to the input when nothing needed checking
    pub bytes: Vec<u8>,

    /// Number of null checks inserted
    pub checks_added: u32,
}

struct PendingMethod {
    method: usize,
    name: String,
    signature: MethodDescriptor,
    is_static: bool,
    nullability: MethodNullability,
}

struct Splice {
    method: usize,
    method_name: String,
    plan: InstrumentationPlan,
    signature: MethodDescriptor,
    is_static: bool,
}

/// Rewrite one class so the parameters the configured annotations select are null checked on
/// entry
///
/// Classes compiled from Kotlin sources are returned untouched: the Kotlin compiler emits its
/// own parameter null checks and doubling them up helps nobody.
pub fn add_null_enforcement(
    class_bytes: &[u8],
    registry: &PackageRegistry,
    config: &AnnotationConfig,
) -> Result<Rewrite, Error> {
    let mut class = ClassFile::parse(class_bytes)?;

    let mut class_name = String::new();
    let mut in_marked_package = false;
    let mut pending: Vec<PendingMethod> = vec![];
    let mut splices: Vec<Splice> = vec![];

    for event in structural_events(&class)? {
        match event {
            ClassEvent::ClassDeclared { name, source_file } => {
                if source_file.map_or(false, |file| file.ends_with(".kt")) {
                    log::debug!("skipping Kotlin class {}", name);
                    return Ok(Rewrite {
                        bytes: class_bytes.to_vec(),
                        checks_added: 0,
                    });
                }
                class_name = name.replace('/', ".");
                in_marked_package = registry.contains(&package_name(name));
            }

            ClassEvent::MethodDeclared {
                method,
                name,
                descriptor,
                is_static,
            } => {
                let signature =
                    MethodDescriptor::parse(descriptor).map_err(|source| Error::BadDescriptor {
                        class: class_name.clone(),
                        method: name.to_owned(),
                        descriptor: descriptor.to_owned(),
                        source,
                    })?;
                pending.push(PendingMethod {
                    method,
                    name: name.to_owned(),
                    signature,
                    is_static,
                    nullability: MethodNullability::default(),
                });
            }

            ClassEvent::ParameterAnnotation {
                method,
                parameter,
                annotation,
                ..
            } => {
                if let Some(entry) = pending.iter_mut().find(|entry| entry.method == method) {
                    let redundant =
                        entry
                            .nullability
                            .record(parameter, annotation, config, in_marked_package);
                    if redundant {
                        log::warn!(
                            "{}.{} parameter {} carries a not-null annotation, but its \
                             package already opts in",
                            class_name,
                            entry.name,
                            parameter,
                        );
                    }
                }
            }

            ClassEvent::BodyStart { method } => {
                let position = match pending.iter().position(|entry| entry.method == method) {
                    Some(position) => position,
                    None => continue,
                };
                let entry = pending.swap_remove(position);
                let plan = entry.nullability.plan(&entry.signature, in_marked_package);
                if plan.is_empty() {
                    continue;
                }
                log::debug!(
                    "null checking {} parameter(s) of {}.{}",
                    plan.len(),
                    class_name,
                    entry.name,
                );
                splices.push(Splice {
                    method: entry.method,
                    method_name: entry.name,
                    plan,
                    signature: entry.signature,
                    is_static: entry.is_static,
                });
            }
        }
    }

    let mut checks_added = 0u32;
    if !splices.is_empty() {
        let require_non_null = class
            .constants
            .get_method_ref(NULL_CHECK_OWNER, NULL_CHECK_NAME, NULL_CHECK_DESCRIPTOR)
            .map_err(|_| Error::ConstantPoolOverflow {
                class: class_name.clone(),
            })?;

        for splice in splices {
            let prologue = null_check_prologue(
                &splice.plan,
                &splice.signature,
                splice.is_static,
                require_non_null,
            )
            .map_err(|source| Error::Serialization {
                class: class_name.clone(),
                source,
            })?;
            let code = class.methods[splice.method].code_mut().ok_or_else(|| {
                Error::Serialization {
                    class: class_name.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidData, "missing Code attribute"),
                }
            })?;
            code.splice_prologue(&prologue, PROLOGUE_STACK)
                .map_err(|_| Error::CodeOffsetOverflow {
                    class: class_name.clone(),
                    method: splice.method_name,
                })?;
            checks_added += splice.plan.len() as u32;
        }
    }

    let mut bytes = vec![];
    class
        .serialize(&mut bytes)
        .map_err(|source| Error::Serialization {
            class: class_name,
            source,
        })?;
    Ok(Rewrite {
        bytes,
        checks_added,
    })
}
