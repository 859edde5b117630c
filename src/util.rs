/// Types whose values occupy a variable number of slots
///
/// Long and double constants take two slots in the constant pool, and `long`
/// and `double` values take two slots in a method's local variable table.
pub trait Width {
    /// How many slots does this take up?
    fn width(&self) -> usize;
}
