/// Everything that can go wrong while rewriting a class artifact
///
/// Every variant carries the class name (dotted, as reported to operators) so a failure inside
/// a large archive points at the artifact that caused it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("class artifact does not parse: {0}")]
    MalformedClass(#[from] std::io::Error),

    #[error("invalid descriptor '{descriptor}' on {class}.{method}: {source}")]
    BadDescriptor {
        class: String,
        method: String,
        descriptor: String,
        source: std::io::Error,
    },

    #[error("constant pool of {class} has no room for the null check method reference")]
    ConstantPoolOverflow { class: String },

    #[error("a 16-bit code offset in {class}.{method} overflowed while inserting null checks")]
    CodeOffsetOverflow { class: String, method: String },

    #[error("failed to re-serialize {class}: {source}")]
    Serialization {
        class: String,
        source: std::io::Error,
    },
}
