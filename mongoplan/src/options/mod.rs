/// Knobs for the compilation entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileOptions {
    pub shape_promotion: ShapePromotion,
}

/// Whether `finalize` pins a statically known output shape with a final
/// inclusion projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapePromotion {
    #[default]
    Promote,
    Preserve,
}
