//! Handle configuration parameters.

/// Options fixed at wrap time for one handle.
///
/// Immutable after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandleConfig {
    /// Enforce the borrow discipline at the end of the handle's life.
    ///
    /// When set, [`invalidate`](crate::RawArrayHandle::invalidate) is refused
    /// while borrows are outstanding and dropping a borrowed handle emits a
    /// `warn` event. When clear, invalidation always succeeds and leaked
    /// borrows are only reported.
    ///
    /// Default: `true`.
    pub check_lifetime: bool,

    /// Ceiling on simultaneous borrows.
    ///
    /// `acquire` fails with `BorrowLimitExceeded` at this count instead of
    /// wrapping the counter. Default: [`HandleConfig::DEFAULT_MAX_BORROWS`].
    pub max_borrows: u32,
}

impl HandleConfig {
    /// Default borrow ceiling.
    pub const DEFAULT_MAX_BORROWS: u32 = 1 << 30;

    /// Config with lifetime checking switched off.
    pub fn unchecked() -> Self {
        Self {
            check_lifetime: false,
            ..Self::default()
        }
    }
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            check_lifetime: true,
            max_borrows: Self::DEFAULT_MAX_BORROWS,
        }
    }
}
