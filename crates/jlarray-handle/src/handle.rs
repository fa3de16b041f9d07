//! Borrow-counted handles over foreign array pointers.
//!
//! A [`RawArrayHandle`] holds an address it does not own, the descriptor
//! decoded from it, and a single atomic state word:
//!
//! ```text
//! bit 63       invalid flag (one-way: set, never cleared)
//! bits 32..63  borrows held by live `Borrow` guards
//! bits 0..32   borrows taken with raw `acquire`
//! ```
//!
//! Packing everything into one word makes "check valid, then count" a single
//! compare-exchange, so `acquire` can never succeed on a handle that another
//! thread has already invalidated. Guard borrows are counted apart from raw
//! ones because a guard reads element storage: `invalidate` is refused while
//! any guard is alive, whatever the config. Nothing here frees foreign
//! memory: deallocation belongs to the runtime.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use jlarray_core::{ArrayError, Element};

use crate::config::HandleConfig;
use crate::descriptor::ArrayDescriptor;
use crate::layout::{self, Shape};
use crate::raw;

const INVALID: u64 = 1 << 63;
const RAW_MASK: u64 = u32::MAX as u64;
const GUARD_SHIFT: u32 = 32;
const GUARD_MASK: u64 = (1 << 31) - 1;
const GUARD_ONE: u64 = 1 << GUARD_SHIFT;

/// Which half of the state word a borrow is counted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BorrowKind {
    Raw,
    Guard,
}

impl BorrowKind {
    fn unit(self) -> u64 {
        match self {
            BorrowKind::Raw => 1,
            BorrowKind::Guard => GUARD_ONE,
        }
    }

    fn count(self, word: u64) -> u32 {
        match self {
            BorrowKind::Raw => (word & RAW_MASK) as u32,
            BorrowKind::Guard => ((word >> GUARD_SHIFT) & GUARD_MASK) as u32,
        }
    }
}

/// Validity flag and both borrow counters in one atomic word.
#[derive(Debug)]
struct BorrowState(AtomicU64);

impl BorrowState {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Raw plus guard borrows.
    fn total(word: u64) -> u32 {
        BorrowKind::Raw
            .count(word)
            .saturating_add(BorrowKind::Guard.count(word))
    }

    fn load(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Count one borrow of `kind` unless invalid or the total is at `limit`.
    /// Returns the new total.
    fn acquire(&self, kind: BorrowKind, limit: u32) -> Result<u32, ArrayError> {
        let limit = match kind {
            BorrowKind::Raw => limit,
            BorrowKind::Guard => limit.min(GUARD_MASK as u32),
        };
        let mut current = self.load();
        loop {
            if current & INVALID != 0 {
                return Err(ArrayError::InvalidHandle);
            }
            let total = Self::total(current);
            if total >= limit {
                return Err(ArrayError::BorrowLimitExceeded { limit });
            }
            match self.0.compare_exchange_weak(
                current,
                current + kind.unit(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(total + 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Return one borrow of `kind`. Returns the new total.
    ///
    /// A raw release on an invalid handle is a no-op (`Ok(None)`): raw
    /// borrows may have been abandoned. Guards cannot be abandoned, so a
    /// guard release always counts down.
    fn release(&self, kind: BorrowKind) -> Result<Option<u32>, ArrayError> {
        let mut current = self.load();
        loop {
            if kind == BorrowKind::Raw && current & INVALID != 0 {
                return Ok(None);
            }
            if kind.count(current) == 0 {
                return Err(ArrayError::UnbalancedRelease);
            }
            match self.0.compare_exchange_weak(
                current,
                current - kind.unit(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Some(Self::total(current) - 1)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Set the invalid bit. Returns the raw borrows abandoned at that moment.
    ///
    /// Always refused while a guard is alive; refused for raw borrows too
    /// when `refuse_if_borrowed`.
    fn invalidate(&self, refuse_if_borrowed: bool) -> Result<u32, ArrayError> {
        let mut current = self.load();
        loop {
            let raw = BorrowKind::Raw.count(current);
            if current & INVALID != 0 {
                return Ok(raw);
            }
            let guards = BorrowKind::Guard.count(current);
            if guards > 0 || (refuse_if_borrowed && raw > 0) {
                return Err(ArrayError::BorrowsOutstanding {
                    count: Self::total(current),
                });
            }
            match self.0.compare_exchange_weak(
                current,
                current | INVALID,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(raw),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Untyped, borrow-counted view of one foreign array.
///
/// Several handles may wrap the same address; each counts its own borrows
/// and [`release`](Self::release) matches by address, not by identity.
#[derive(Debug)]
pub struct RawArrayHandle {
    address: NonNull<c_void>,
    descriptor: ArrayDescriptor,
    state: BorrowState,
    config: HandleConfig,
}

// SAFETY: the handle never dereferences `address` after construction and
// only reads element storage through `Borrow`, whose element types are plain
// data. All mutable state is the atomic `BorrowState`.
#[allow(unsafe_code)]
unsafe impl Send for RawArrayHandle {}
// SAFETY: see `Send`; every `&self` method is either a read of immutable
// fields or an atomic operation.
#[allow(unsafe_code)]
unsafe impl Sync for RawArrayHandle {}

impl RawArrayHandle {
    /// Wrap a foreign array header.
    ///
    /// Decodes the descriptor once; the borrow count starts at zero. A null
    /// `address` fails with [`ArrayError::InvalidHandle`] without reading.
    ///
    /// # Safety
    ///
    /// A non-null `address` must point at a live header of the layout in
    /// [`ABI_VERSION`](crate::ABI_VERSION), and the header and its element
    /// storage must stay live and unresized for the lifetime of the handle.
    /// A stale or reallocated array is undefined behaviour that the handle
    /// cannot detect.
    #[allow(unsafe_code)]
    pub unsafe fn wrap(address: *mut c_void, config: HandleConfig) -> Result<Self, ArrayError> {
        let Some(address) = NonNull::new(address) else {
            tracing::debug!("refusing to wrap null array address");
            return Err(ArrayError::InvalidHandle);
        };
        // SAFETY: non-null, header validity is the caller's contract.
        let descriptor = unsafe { ArrayDescriptor::decode(address.as_ptr()) }?;
        tracing::debug!(
            address = ?address,
            length = descriptor.length,
            ndims = descriptor.ndims(),
            element_size = descriptor.element_size,
            "wrapped foreign array"
        );
        Ok(Self {
            address,
            descriptor,
            state: BorrowState::new(),
            config,
        })
    }

    /// The descriptor decoded at wrap time.
    pub fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    /// The config this handle was wrapped with.
    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    /// Whether [`invalidate`](Self::invalidate) has not yet succeeded.
    pub fn is_valid(&self) -> bool {
        self.state.load() & INVALID == 0
    }

    /// Outstanding borrows, raw and guarded.
    pub fn borrow_count(&self) -> u32 {
        BorrowState::total(self.state.load())
    }

    /// Take one borrow and return the raw address.
    ///
    /// Fails with [`ArrayError::InvalidHandle`] once invalidated. Every
    /// success must be paired with exactly one [`release`](Self::release).
    pub fn acquire(&self) -> Result<*mut c_void, ArrayError> {
        let count = self.state.acquire(BorrowKind::Raw, self.config.max_borrows)?;
        tracing::trace!(address = ?self.address, count, "acquired");
        Ok(self.address.as_ptr())
    }

    /// Return a borrow taken by [`acquire`](Self::acquire).
    ///
    /// A different `address`, or an invalidated handle, is a no-op and
    /// returns `Ok(false)`. Releasing with no borrows outstanding returns
    /// [`ArrayError::UnbalancedRelease`] and leaves the count at zero.
    pub fn release(&self, address: *mut c_void) -> Result<bool, ArrayError> {
        if address != self.address.as_ptr() {
            return Ok(false);
        }
        self.release_kind(BorrowKind::Raw)
    }

    fn release_kind(&self, kind: BorrowKind) -> Result<bool, ArrayError> {
        match self.state.release(kind) {
            Ok(Some(count)) => {
                tracing::trace!(address = ?self.address, count, "released");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                tracing::warn!(address = ?self.address, "release without matching acquire");
                Err(e)
            }
        }
    }

    /// Mark the handle invalid. One-way; repeating it is a no-op.
    ///
    /// Refused with [`ArrayError::BorrowsOutstanding`] while any [`Borrow`]
    /// guard is alive. With [`HandleConfig::check_lifetime`] set it is also
    /// refused while raw [`acquire`](Self::acquire) borrows are outstanding;
    /// without it those are abandoned and their releases become no-ops.
    pub fn invalidate(&self) -> Result<(), ArrayError> {
        let outstanding = self.state.invalidate(self.config.check_lifetime)?;
        if outstanding > 0 {
            tracing::warn!(address = ?self.address, outstanding, "invalidated with borrows outstanding");
        } else {
            tracing::debug!(address = ?self.address, "invalidated");
        }
        Ok(())
    }

    /// Number of dimensions.
    pub fn ndims(&self) -> u16 {
        self.descriptor.ndims()
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.descriptor.length
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.descriptor.length == 0
    }

    /// Rows of the row/column view (`length` for 1-D).
    pub fn row_count(&self) -> Result<usize, ArrayError> {
        self.descriptor.row_count()
    }

    /// Columns of the row/column view (1 for 1-D).
    pub fn col_count(&self) -> Result<usize, ArrayError> {
        self.descriptor.col_count()
    }

    /// `[rows]` or `[rows, cols]`.
    pub fn shape(&self) -> Result<Shape, ArrayError> {
        self.descriptor.shape()
    }
}

impl Drop for RawArrayHandle {
    fn drop(&mut self) {
        let outstanding = self.borrow_count();
        if self.config.check_lifetime && outstanding > 0 {
            tracing::warn!(
                address = ?self.address,
                outstanding,
                "foreign array handle dropped with borrows outstanding"
            );
        }
    }
}

/// A [`RawArrayHandle`] whose elements are viewed as `T`.
///
/// `T` is asserted by the caller; [`wrap`](Self::wrap) only checks that the
/// header's element size equals `size_of::<T>()`.
#[derive(Debug)]
pub struct ForeignArrayHandle<T: Element> {
    raw: RawArrayHandle,
    _element: PhantomData<T>,
}

impl<T: Element> ForeignArrayHandle<T> {
    /// Wrap a foreign array header as an array of `T`.
    ///
    /// Fails with [`ArrayError::InvalidHandle`] for a null address and
    /// [`ArrayError::ElementSizeMismatch`] when the header disagrees with `T`.
    ///
    /// # Safety
    ///
    /// As [`RawArrayHandle::wrap`], plus the elements must be values of `T`.
    #[allow(unsafe_code)]
    pub unsafe fn wrap(address: *mut c_void, config: HandleConfig) -> Result<Self, ArrayError> {
        // SAFETY: forwarded from the caller.
        let raw = unsafe { RawArrayHandle::wrap(address, config) }?;
        let actual = raw.descriptor.element_size as usize;
        if actual != mem::size_of::<T>() {
            return Err(ArrayError::ElementSizeMismatch {
                expected: mem::size_of::<T>(),
                actual,
            });
        }
        Ok(Self {
            raw,
            _element: PhantomData,
        })
    }

    /// The untyped handle.
    pub fn raw(&self) -> &RawArrayHandle {
        &self.raw
    }

    /// Drop the element type.
    pub fn into_raw(self) -> RawArrayHandle {
        self.raw
    }

    /// The descriptor decoded at wrap time.
    pub fn descriptor(&self) -> &ArrayDescriptor {
        self.raw.descriptor()
    }

    /// See [`RawArrayHandle::is_valid`].
    pub fn is_valid(&self) -> bool {
        self.raw.is_valid()
    }

    /// See [`RawArrayHandle::borrow_count`].
    pub fn borrow_count(&self) -> u32 {
        self.raw.borrow_count()
    }

    /// See [`RawArrayHandle::acquire`].
    pub fn acquire(&self) -> Result<*mut c_void, ArrayError> {
        self.raw.acquire()
    }

    /// See [`RawArrayHandle::release`].
    pub fn release(&self, address: *mut c_void) -> Result<bool, ArrayError> {
        self.raw.release(address)
    }

    /// See [`RawArrayHandle::invalidate`].
    pub fn invalidate(&self) -> Result<(), ArrayError> {
        self.raw.invalidate()
    }

    /// Number of dimensions.
    pub fn ndims(&self) -> u16 {
        self.raw.ndims()
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Rows of the row/column view (`length` for 1-D).
    pub fn row_count(&self) -> Result<usize, ArrayError> {
        self.raw.row_count()
    }

    /// Columns of the row/column view (1 for 1-D).
    pub fn col_count(&self) -> Result<usize, ArrayError> {
        self.raw.col_count()
    }

    /// `[rows]` or `[rows, cols]`.
    pub fn shape(&self) -> Result<Shape, ArrayError> {
        self.raw.shape()
    }

    /// Take a borrow that exposes the elements.
    ///
    /// The borrow is released when the guard drops. Fails with
    /// [`ArrayError::InvalidHandle`] once invalidated (or if the header
    /// claims elements behind a null `data`), and with
    /// [`ArrayError::Misaligned`] if `data` is not aligned for `T`.
    pub fn borrow(&self) -> Result<Borrow<'_, T>, ArrayError> {
        let desc = self.raw.descriptor();
        if desc.length > 0 {
            if desc.data.is_null() {
                return Err(ArrayError::InvalidHandle);
            }
            let address = desc.data as usize;
            let align = mem::align_of::<T>();
            if address % align != 0 {
                return Err(ArrayError::Misaligned { address, align });
            }
        }
        let count = self
            .raw
            .state
            .acquire(BorrowKind::Guard, self.raw.config.max_borrows)?;
        tracing::trace!(address = ?self.raw.address, count, "borrowed");
        Ok(Borrow { handle: self })
    }

    /// Copy the elements out.
    pub fn to_vec(&self) -> Result<Vec<T>, ArrayError> {
        Ok(self.borrow()?.view().to_vec())
    }
}

/// One outstanding borrow of a [`ForeignArrayHandle`].
///
/// Slices obtained from the guard cannot outlive it, and the guard cannot
/// outlive the handle. While it is alive the handle cannot be invalidated,
/// so every read through it sees a valid handle.
#[derive(Debug)]
pub struct Borrow<'a, T: Element> {
    handle: &'a ForeignArrayHandle<T>,
}

impl<'a, T: Element> Borrow<'a, T> {
    /// The wrapped header address.
    pub fn address(&self) -> *mut c_void {
        self.handle.raw.address.as_ptr()
    }

    /// All `length` elements, aliasing foreign memory.
    #[allow(unsafe_code)]
    pub fn view(&self) -> &[T] {
        let desc = self.handle.descriptor();
        if desc.length == 0 {
            return &[];
        }
        // SAFETY: `borrow` checked non-null and alignment; the wrap contract
        // keeps `length` values of `T` live while the handle lives, and the
        // returned slice is bounded by `&self`.
        unsafe { raw::slice(desc.data.cast::<T>(), desc.length) }
    }

    /// All `length` elements, mutably.
    ///
    /// # Safety
    ///
    /// Other handles may wrap the same foreign array. No other reference to
    /// these elements, through any handle or the runtime, may be used while
    /// the returned slice is live.
    #[allow(unsafe_code)]
    pub unsafe fn as_mut_slice(&mut self) -> &mut [T] {
        let desc = self.handle.descriptor();
        if desc.length == 0 {
            return &mut [];
        }
        // SAFETY: as `view`, plus exclusivity from the caller.
        unsafe { raw::slice_mut(desc.data.cast::<T>(), desc.length) }
    }

    /// Element `(row, col)`, addressed row-major at `row * ncols + col`.
    ///
    /// Row-major regardless of the runtime's own (column-major) storage
    /// order; see [`layout`](crate::layout). Fails with
    /// [`ArrayError::DimensionalityUnsupported`] unless `ndims` is 1 or 2.
    pub fn get(&self, row: usize, col: usize) -> Result<T, ArrayError> {
        let desc = self.handle.descriptor();
        let nrows = desc.row_count()?;
        let ncols = desc.col_count()?;
        let view = self.view();
        let index = layout::row_major_index(row, col, nrows, ncols).ok_or(
            ArrayError::IndexOutOfBounds {
                index: row.saturating_mul(ncols).saturating_add(col),
                len: view.len(),
            },
        )?;
        view.get(index)
            .copied()
            .ok_or(ArrayError::IndexOutOfBounds {
                index,
                len: view.len(),
            })
    }

    /// Row `row` as a contiguous slice (row-major, see [`get`](Self::get)).
    pub fn row(&self, row: usize) -> Result<&[T], ArrayError> {
        let desc = self.handle.descriptor();
        let nrows = desc.row_count()?;
        let ncols = desc.col_count()?;
        let view = self.view();
        layout::row_range(row, nrows, ncols)
            .and_then(|range| view.get(range))
            .ok_or(ArrayError::IndexOutOfBounds {
                index: row,
                len: nrows,
            })
    }

    /// Every row in order (row-major, see [`get`](Self::get)).
    pub fn rows(&self) -> Result<impl Iterator<Item = &[T]> + '_, ArrayError> {
        let nrows = self.handle.row_count()?;
        self.handle.col_count()?;
        Ok((0..nrows).filter_map(move |i| self.row(i).ok()))
    }
}

impl<T: Element> Drop for Borrow<'_, T> {
    fn drop(&mut self) {
        // Cannot fail: this guard's own borrow is still counted.
        let _ = self.handle.raw.release_kind(BorrowKind::Guard);
    }
}
