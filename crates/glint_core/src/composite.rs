//! Composite (blend) modes

/// Porter-Duff composite mode applied at draw submission
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    /// Destination is cleared in the covered area
    Clear,
    /// Source replaces destination
    Src,
    /// Source over destination (the common case)
    #[default]
    SrcOver,
    /// Destination kept only outside the source coverage
    DstOut,
    /// Source added to destination
    Add,
}
