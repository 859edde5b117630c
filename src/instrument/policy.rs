use super::errors::Error;
use crate::jvm::{scan_header, FieldType, MethodDescriptor};
use std::collections::HashSet;

/// The three annotation types that drive null check placement, stored as field descriptors so
/// they compare directly against what annotation tables contain
#[derive(Debug, Clone)]
pub struct AnnotationConfig {
    package_marker: String,
    not_null: String,
    nullable: String,
}

impl AnnotationConfig {
    /// Build a configuration from dotted annotation class names (eg.
    /// `org.jetbrains.annotations.NotNull`)
    pub fn new(package_marker: &str, not_null: &str, nullable: &str) -> AnnotationConfig {
        AnnotationConfig {
            package_marker: descriptor_of(package_marker),
            not_null: descriptor_of(not_null),
            nullable: descriptor_of(nullable),
        }
    }

    /// Package-level marker opting a whole package into null checking
    pub fn is_package_marker(&self, annotation: &str) -> bool {
        self.package_marker == annotation
    }

    /// Parameter-level annotation requesting a check
    pub fn is_not_null(&self, annotation: &str) -> bool {
        self.not_null == annotation
    }

    /// Parameter-level annotation suppressing a check inside a marked package
    pub fn is_nullable(&self, annotation: &str) -> bool {
        self.nullable == annotation
    }
}

impl Default for AnnotationConfig {
    fn default() -> AnnotationConfig {
        AnnotationConfig::new(
            "reactor.util.annotation.NonNullApi",
            "org.jetbrains.annotations.NotNull",
            "reactor.util.annotation.Nullable",
        )
    }
}

fn descriptor_of(dotted: &str) -> String {
    format!("L{};", dotted.replace('.', "/"))
}

/// Dotted package name of an internal class name (empty for the default package)
pub fn package_name(internal: &str) -> String {
    match internal.rfind('/') {
        Some(split) => internal[..split].replace('/', "."),
        None => String::new(),
    }
}

/// Packages whose `package-info` carries the opt-in marker
///
/// Built up by scanning every artifact once, then consulted while rewriting each class.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    packages: HashSet<String>,
}

impl PackageRegistry {
    pub fn new() -> PackageRegistry {
        PackageRegistry::default()
    }

    /// Record the package if these bytes are a `package-info` class carrying the marker
    ///
    /// Any other class is ignored, so it is safe to feed every artifact in an archive through
    /// here.
    pub fn scan_package_descriptor(
        &mut self,
        class_bytes: &[u8],
        config: &AnnotationConfig,
    ) -> Result<(), Error> {
        let header = scan_header(class_bytes)?;
        let is_package_descriptor =
            header.name == "package-info" || header.name.ends_with("/package-info");
        if !is_package_descriptor {
            return Ok(());
        }
        if header
            .annotations
            .iter()
            .any(|annotation| config.is_package_marker(annotation))
        {
            let package = package_name(&header.name);
            log::debug!("package {} opts into null checking", package);
            self.mark(package);
        }
        Ok(())
    }

    /// Mark a dotted package directly
    pub fn mark(&mut self, package: String) {
        self.packages.insert(package);
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Per-method tally of parameter nullability annotations
#[derive(Debug, Default)]
pub struct MethodNullability {
    must_check: Vec<u16>,
    must_not_check: Vec<u16>,
}

impl MethodNullability {
    /// Record one parameter annotation
    ///
    /// Returns `true` when the annotation is a redundant not-null marker: inside a marked
    /// package every reference parameter is checked already, so per-parameter markers add
    /// nothing there.
    pub fn record(
        &mut self,
        parameter: u16,
        annotation: &str,
        config: &AnnotationConfig,
        in_marked_package: bool,
    ) -> bool {
        if config.is_not_null(annotation) {
            self.must_check.push(parameter);
            return in_marked_package;
        }
        if config.is_nullable(annotation) {
            self.must_not_check.push(parameter);
        }
        false
    }

    /// Decide which declared parameters get a null check
    ///
    /// In a marked package, every reference-typed parameter is checked unless annotated
    /// nullable (nullable wins over an explicit not-null on the same parameter). Outside,
    /// only parameters annotated not-null are checked, and nullable annotations are inert.
    /// Primitive parameters are never checked since they cannot hold null.
    pub fn plan(
        &self,
        signature: &MethodDescriptor,
        in_marked_package: bool,
    ) -> InstrumentationPlan {
        let is_reference = |parameter: &u16| {
            signature
                .parameters
                .get(*parameter as usize)
                .map_or(false, FieldType::is_reference)
        };
        let parameters = if in_marked_package {
            (0..signature.parameter_count() as u16)
                .filter(|parameter| !self.must_not_check.contains(parameter))
                .filter(is_reference)
                .collect()
        } else {
            let mut checked: Vec<u16> = self
                .must_check
                .iter()
                .copied()
                .filter(is_reference)
                .collect();
            checked.sort_unstable();
            checked.dedup();
            checked
        };
        InstrumentationPlan { parameters }
    }
}

/// Declared parameter positions that get a null check, in declaration order
#[derive(Debug, PartialEq, Eq)]
pub struct InstrumentationPlan {
    pub parameters: Vec<u16>,
}

impl InstrumentationPlan {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }
}

#[cfg(test)]
mod policy_tests {
    use super::*;
    use crate::jvm::ParseDescriptor;

    fn signature(descriptor: &str) -> MethodDescriptor {
        MethodDescriptor::parse(descriptor).unwrap()
    }

    #[test]
    fn package_names() {
        assert_eq!(package_name("a/b/C"), "a.b");
        assert_eq!(package_name("a/b/package-info"), "a.b");
        assert_eq!(package_name("TopLevel"), "");
    }

    #[test]
    fn marked_package_checks_unannotated_references() {
        let nullability = MethodNullability::default();
        let plan = nullability.plan(&signature("(Ljava/lang/String;ILjava/util/List;)V"), true);
        assert_eq!(plan.parameters, vec![0, 2]);
    }

    #[test]
    fn nullable_wins_in_marked_package() {
        let config = AnnotationConfig::default();
        let mut nullability = MethodNullability::default();
        nullability.record(0, "Lreactor/util/annotation/Nullable;", &config, true);
        nullability.record(0, "Lorg/jetbrains/annotations/NotNull;", &config, true);
        let plan = nullability.plan(
            &signature("(Ljava/lang/String;Ljava/lang/String;)V"),
            true,
        );
        assert_eq!(plan.parameters, vec![1]);
    }

    #[test]
    fn not_null_marker_is_redundant_in_marked_package() {
        let config = AnnotationConfig::default();
        let mut nullability = MethodNullability::default();
        assert!(nullability.record(0, "Lorg/jetbrains/annotations/NotNull;", &config, true));
        assert!(!nullability.record(0, "Lorg/jetbrains/annotations/NotNull;", &config, false));
    }

    #[test]
    fn unmarked_package_checks_only_annotated() {
        let config = AnnotationConfig::default();
        let mut nullability = MethodNullability::default();
        nullability.record(1, "Lorg/jetbrains/annotations/NotNull;", &config, false);
        nullability.record(0, "Lreactor/util/annotation/Nullable;", &config, false);
        let plan = nullability.plan(
            &signature("(Ljava/lang/String;Ljava/lang/String;)V"),
            false,
        );
        assert_eq!(plan.parameters, vec![1]);
    }

    #[test]
    fn primitives_are_never_checked() {
        let config = AnnotationConfig::default();
        let mut nullability = MethodNullability::default();
        nullability.record(0, "Lorg/jetbrains/annotations/NotNull;", &config, false);
        let plan = nullability.plan(&signature("(IJ)V"), false);
        assert!(plan.is_empty());

        let nullability = MethodNullability::default();
        let plan = nullability.plan(&signature("(ILjava/lang/String;)V"), true);
        assert_eq!(plan.parameters, vec![1]);
    }

    #[test]
    fn unknown_annotations_are_ignored() {
        let config = AnnotationConfig::default();
        let mut nullability = MethodNullability::default();
        nullability.record(0, "Ljavax/annotation/Nonnull;", &config, false);
        let plan = nullability.plan(&signature("(Ljava/lang/String;)V"), false);
        assert!(plan.is_empty());
    }

    #[test]
    fn custom_annotation_names() {
        let config = AnnotationConfig::new(
            "com.acme.NullChecked",
            "com.acme.Required",
            "com.acme.Optional",
        );
        assert!(config.is_package_marker("Lcom/acme/NullChecked;"));
        assert!(config.is_not_null("Lcom/acme/Required;"));
        assert!(config.is_nullable("Lcom/acme/Optional;"));
        assert!(!config.is_not_null("Lorg/jetbrains/annotations/NotNull;"));
    }
}
