//! End to end checks: build small classes in memory, run them through the rewriter, and verify
//! the emitted bytecode and bookkeeping.

use nullweaver::jvm::{
    Attribute, AttributeInfo, ClassAccessFlags, ClassFile, CodeAttribute, Constant, ConstantPool,
    Method, MethodAccessFlags, MethodDescriptor, ParseDescriptor, Serialize, Version,
};
use nullweaver::{add_null_enforcement, AnnotationConfig, PackageRegistry};

const NOT_NULL: &str = "Lorg/jetbrains/annotations/NotNull;";
const NULLABLE: &str = "Lreactor/util/annotation/Nullable;";
const PACKAGE_MARKER: &str = "Lreactor/util/annotation/NonNullApi;";

struct MethodFixture<'a> {
    name: &'a str,
    descriptor: &'a str,
    is_static: bool,
    /// `(parameter position, annotation type descriptor)`
    annotations: &'a [(u16, &'a str)],
    bytecode: &'a [u8],
}

/// `return`
const RETURN: &[u8] = &[0xB1];

fn class_bytes(
    internal_name: &str,
    source_file: Option<&str>,
    methods: &[MethodFixture],
) -> Vec<u8> {
    let mut constants = ConstantPool::new();
    let this_class = constants.get_class(internal_name).unwrap();
    let super_class = constants.get_class("java/lang/Object").unwrap();
    let code_name = constants.get_utf8("Code").unwrap();

    let mut class_attributes = vec![];
    if let Some(file) = source_file {
        let attribute_name = constants.get_utf8("SourceFile").unwrap();
        let file_index = constants.get_utf8(file).unwrap();
        let mut info = vec![];
        file_index.serialize(&mut info).unwrap();
        class_attributes.push(Attribute {
            name_index: attribute_name,
            info: AttributeInfo::Raw(info),
        });
    }

    let mut method_entries = vec![];
    for fixture in methods {
        let signature = MethodDescriptor::parse(fixture.descriptor).unwrap();
        let mut slots = signature.parameter_count() as u16 * 2; // generous
        if !fixture.is_static {
            slots += 1;
        }

        let mut attributes = vec![Attribute {
            name_index: code_name,
            info: AttributeInfo::Code(CodeAttribute {
                max_stack: 0,
                max_locals: slots,
                bytecode: fixture.bytecode.to_vec(),
                exception_table: vec![],
                attributes: vec![],
            }),
        }];

        if !fixture.annotations.is_empty() {
            let attribute_name = constants
                .get_utf8("RuntimeInvisibleParameterAnnotations")
                .unwrap();
            let mut info = vec![];
            (signature.parameter_count() as u8).serialize(&mut info).unwrap();
            for parameter in 0..signature.parameter_count() as u16 {
                let on_parameter: Vec<&str> = fixture
                    .annotations
                    .iter()
                    .filter(|(position, _)| *position == parameter)
                    .map(|(_, annotation)| *annotation)
                    .collect();
                (on_parameter.len() as u16).serialize(&mut info).unwrap();
                for annotation in on_parameter {
                    let type_index = constants.get_utf8(annotation).unwrap();
                    type_index.serialize(&mut info).unwrap();
                    0u16.serialize(&mut info).unwrap(); // no element-value pairs
                }
            }
            attributes.push(Attribute {
                name_index: attribute_name,
                info: AttributeInfo::Raw(info),
            });
        }

        let access_flags = if fixture.is_static {
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC
        } else {
            MethodAccessFlags::PUBLIC
        };
        method_entries.push(Method {
            access_flags,
            name_index: constants.get_utf8(fixture.name).unwrap(),
            descriptor_index: constants.get_utf8(fixture.descriptor).unwrap(),
            attributes,
        });
    }

    let class = ClassFile {
        version: Version::JAVA8,
        constants,
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: method_entries,
        attributes: class_attributes,
    };
    let mut bytes = vec![];
    class.serialize(&mut bytes).unwrap();
    bytes
}

fn package_info_bytes(package: &str, marker: &str) -> Vec<u8> {
    let mut constants = ConstantPool::new();
    let this_class = constants
        .get_class(&format!("{}/package-info", package.replace('.', "/")))
        .unwrap();
    let super_class = constants.get_class("java/lang/Object").unwrap();
    let attribute_name = constants.get_utf8("RuntimeVisibleAnnotations").unwrap();
    let marker_index = constants.get_utf8(marker).unwrap();

    let mut info = vec![];
    1u16.serialize(&mut info).unwrap();
    marker_index.serialize(&mut info).unwrap();
    0u16.serialize(&mut info).unwrap();

    let class = ClassFile {
        version: Version::JAVA8,
        constants,
        access_flags: ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: vec![],
        attributes: vec![Attribute {
            name_index: attribute_name,
            info: AttributeInfo::Raw(info),
        }],
    };
    let mut bytes = vec![];
    class.serialize(&mut bytes).unwrap();
    bytes
}

/// Assert the method body starts with `aload <slot>; invokestatic Objects.requireNonNull; pop`
/// and resolve the invoked method through the rewritten constant pool
fn assert_prologue(rewritten: &[u8], method: usize, expected_loads: &[u8]) {
    let class = ClassFile::parse(rewritten).unwrap();
    let code = class.methods[method].code().unwrap();

    let mut at = 0;
    for &load in expected_loads {
        assert_eq!(code.bytecode[at], load, "aload");
        at += 1;
        assert_eq!(code.bytecode[at], 0xB8, "invokestatic");
        let method_ref = nullweaver::jvm::ConstantIndex(u16::from_be_bytes([
            code.bytecode[at + 1],
            code.bytecode[at + 2],
        ]));
        match class.constants.get(method_ref) {
            Some(Constant::MethodRef { class: owner, .. }) => {
                assert_eq!(class.constants.class_name(*owner).unwrap(), "java/util/Objects");
            }
            other => panic!("Expected method reference, found {:?}", other),
        }
        at += 3;
        assert_eq!(code.bytecode[at], 0x57, "pop");
        at += 1;
    }
    while code.bytecode[at] == 0x00 {
        at += 1;
    }
    assert_eq!(at % 4, 0, "prologue pads to a four-byte multiple");
    assert_eq!(code.bytecode[at], 0xB1, "original body follows the prologue");
    assert_eq!(code.bytecode.len(), at + 1);
    assert!(code.max_stack >= 1);
}

#[test]
fn registry_scan_finds_marked_packages() {
    let config = AnnotationConfig::default();
    let mut registry = PackageRegistry::new();
    registry
        .scan_package_descriptor(&package_info_bytes("a.b", PACKAGE_MARKER), &config)
        .unwrap();
    registry
        .scan_package_descriptor(&package_info_bytes("c.d", NULLABLE), &config)
        .unwrap();
    registry
        .scan_package_descriptor(&class_bytes("a/b/C", None, &[]), &config)
        .unwrap();

    assert!(registry.contains("a.b"));
    assert!(!registry.contains("c.d"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn marked_package_checks_unannotated_reference_parameters() {
    let config = AnnotationConfig::default();
    let mut registry = PackageRegistry::new();
    registry.mark("a.b".to_owned());

    let bytes = class_bytes(
        "a/b/C",
        Some("C.java"),
        &[MethodFixture {
            name: "m",
            descriptor: "(Ljava/lang/String;Ljava/lang/String;)V",
            is_static: false,
            annotations: &[(1, NULLABLE)],
            bytecode: RETURN,
        }],
    );
    let rewrite = add_null_enforcement(&bytes, &registry, &config).unwrap();

    assert_eq!(rewrite.checks_added, 1);
    // Parameter 0 lives in slot 1 (slot 0 holds the receiver)
    assert_prologue(&rewrite.bytes, 0, &[0x2B]);
}

#[test]
fn unmarked_package_checks_only_annotated_parameters() {
    let config = AnnotationConfig::default();
    let registry = PackageRegistry::new();

    let bytes = class_bytes(
        "c/d/E",
        None,
        &[MethodFixture {
            name: "n",
            descriptor: "(Ljava/lang/String;Ljava/lang/String;)V",
            is_static: true,
            annotations: &[(0, NOT_NULL)],
            bytecode: RETURN,
        }],
    );
    let rewrite = add_null_enforcement(&bytes, &registry, &config).unwrap();

    assert_eq!(rewrite.checks_added, 1);
    assert_prologue(&rewrite.bytes, 0, &[0x2A]);
}

#[test]
fn wide_parameters_shift_later_slots() {
    let config = AnnotationConfig::default();
    let mut registry = PackageRegistry::new();
    registry.mark("a.b".to_owned());

    let bytes = class_bytes(
        "a/b/Wide",
        None,
        &[MethodFixture {
            name: "m",
            descriptor: "(JLjava/lang/String;)V",
            is_static: false,
            annotations: &[],
            bytecode: RETURN,
        }],
    );
    let rewrite = add_null_enforcement(&bytes, &registry, &config).unwrap();

    // The long is primitive (no check) and spans slots 1-2, so the string sits in slot 3
    assert_eq!(rewrite.checks_added, 1);
    assert_prologue(&rewrite.bytes, 0, &[0x2D]);
}

#[test]
fn checks_sum_across_methods() {
    let config = AnnotationConfig::default();
    let mut registry = PackageRegistry::new();
    registry.mark("a.b".to_owned());

    let bytes = class_bytes(
        "a/b/Two",
        None,
        &[
            MethodFixture {
                name: "first",
                descriptor: "(Ljava/lang/String;Ljava/lang/Object;)V",
                is_static: true,
                annotations: &[],
                bytecode: RETURN,
            },
            MethodFixture {
                name: "second",
                descriptor: "(Ljava/lang/String;)V",
                is_static: true,
                annotations: &[],
                bytecode: RETURN,
            },
        ],
    );
    let rewrite = add_null_enforcement(&bytes, &registry, &config).unwrap();

    assert_eq!(rewrite.checks_added, 3);
    assert_prologue(&rewrite.bytes, 0, &[0x2A, 0x2B]);
    assert_prologue(&rewrite.bytes, 1, &[0x2A]);
}

#[test]
fn kotlin_classes_pass_through_untouched() {
    let config = AnnotationConfig::default();
    let mut registry = PackageRegistry::new();
    registry.mark("a.b".to_owned());

    let bytes = class_bytes(
        "a/b/KotlinThing",
        Some("KotlinThing.kt"),
        &[MethodFixture {
            name: "m",
            descriptor: "(Ljava/lang/String;)V",
            is_static: false,
            annotations: &[],
            bytecode: RETURN,
        }],
    );
    let rewrite = add_null_enforcement(&bytes, &registry, &config).unwrap();

    assert_eq!(rewrite.checks_added, 0);
    assert_eq!(rewrite.bytes, bytes);
}

#[test]
fn untouched_classes_round_trip_byte_identical() {
    let config = AnnotationConfig::default();
    let registry = PackageRegistry::new();

    let bytes = class_bytes(
        "c/d/Quiet",
        Some("Quiet.java"),
        &[MethodFixture {
            name: "m",
            descriptor: "(Ljava/lang/String;)V",
            is_static: false,
            annotations: &[(0, NULLABLE)],
            bytecode: RETURN,
        }],
    );
    let rewrite = add_null_enforcement(&bytes, &registry, &config).unwrap();

    assert_eq!(rewrite.checks_added, 0);
    assert_eq!(rewrite.bytes, bytes);
}

#[test]
fn switch_operand_alignment_survives_rewriting() {
    let config = AnnotationConfig::default();
    let mut registry = PackageRegistry::new();
    registry.mark("a.b".to_owned());

    // iload_2, then a tableswitch at pc 1 (so two pad bytes before its operands), with low =
    // high = 0 and both targets on the trailing return at pc 20
    let mut body = vec![0x1C, 0xAA, 0x00, 0x00];
    body.extend_from_slice(&19i32.to_be_bytes()); // default
    body.extend_from_slice(&0i32.to_be_bytes()); // low
    body.extend_from_slice(&0i32.to_be_bytes()); // high
    body.extend_from_slice(&19i32.to_be_bytes()); // case 0
    body.push(0xB1);

    let bytes = class_bytes(
        "a/b/Switchy",
        None,
        &[MethodFixture {
            name: "m",
            descriptor: "(Ljava/lang/String;I)V",
            is_static: false,
            annotations: &[],
            bytecode: &body,
        }],
    );
    let rewrite = add_null_enforcement(&bytes, &registry, &config).unwrap();
    assert_eq!(rewrite.checks_added, 1);

    let class = ClassFile::parse(&rewrite.bytes).unwrap();
    let code = class.methods[0].code().unwrap();
    let prologue_length = code.bytecode.len() - body.len();
    assert_eq!(prologue_length % 4, 0);
    assert_eq!(&code.bytecode[prologue_length..], &body[..]);

    // At the shifted pc, the two pad bytes the switch carried are still the required count
    let switch_pc = prologue_length + 1;
    assert_eq!(code.bytecode[switch_pc], 0xAA);
    let required_pad = (4 - (switch_pc + 1) % 4) % 4;
    assert_eq!(required_pad, 2);
}

#[test]
fn registry_scan_reads_past_annotation_elements() {
    let mut constants = ConstantPool::new();
    let this_class = constants.get_class("a/b/package-info").unwrap();
    let super_class = constants.get_class("java/lang/Object").unwrap();
    let attribute_name = constants.get_utf8("RuntimeVisibleAnnotations").unwrap();
    let generated = constants
        .get_utf8("Ljavax/annotation/processing/Generated;")
        .unwrap();
    let element_name = constants.get_utf8("value").unwrap();
    let element_value = constants.get_utf8("some-tool").unwrap();
    let marker = constants.get_utf8(PACKAGE_MARKER).unwrap();

    // An element-carrying annotation precedes the package marker
    let mut info = vec![];
    2u16.serialize(&mut info).unwrap();
    generated.serialize(&mut info).unwrap();
    1u16.serialize(&mut info).unwrap();
    element_name.serialize(&mut info).unwrap();
    b's'.serialize(&mut info).unwrap();
    element_value.serialize(&mut info).unwrap();
    marker.serialize(&mut info).unwrap();
    0u16.serialize(&mut info).unwrap();

    let class = ClassFile {
        version: Version::JAVA8,
        constants,
        access_flags: ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: vec![],
        attributes: vec![Attribute {
            name_index: attribute_name,
            info: AttributeInfo::Raw(info),
        }],
    };
    let mut bytes = vec![];
    class.serialize(&mut bytes).unwrap();

    let config = AnnotationConfig::default();
    let mut registry = PackageRegistry::new();
    registry.scan_package_descriptor(&bytes, &config).unwrap();
    assert!(registry.contains("a.b"));
}

#[test]
fn malformed_bytes_surface_as_errors() {
    let config = AnnotationConfig::default();
    let registry = PackageRegistry::new();
    assert!(add_null_enforcement(&[0xCA, 0xFE], &registry, &config).is_err());
}
