//! Borrow counting, invalidation and address-matched release.

use std::ptr;
use std::thread;

use jlarray::prelude::*;
use jlarray_test_utils::MockRuntime;

#[test]
fn wrap_null_is_invalid_handle() {
    // SAFETY: null is rejected before any read.
    let raw = unsafe { RawArrayHandle::wrap(ptr::null_mut(), HandleConfig::default()) };
    assert_eq!(raw.unwrap_err(), ArrayError::InvalidHandle);
    // SAFETY: as above.
    let typed = unsafe { ForeignArrayHandle::<f64>::wrap(ptr::null_mut(), HandleConfig::unchecked()) };
    assert_eq!(typed.unwrap_err(), ArrayError::InvalidHandle);
}

#[test]
fn acquire_release_round_trip() {
    let rt = MockRuntime::new();
    let address = rt.alloc(ElementKind::Float64, &[4]);
    // SAFETY: the runtime keeps the array live for the test.
    let h = unsafe { RawArrayHandle::wrap(address, HandleConfig::default()) }.unwrap();
    assert!(h.is_valid());
    assert_eq!(h.borrow_count(), 0);

    let got = h.acquire().unwrap();
    assert_eq!(got, address);
    assert_eq!(h.release(got), Ok(true));
    assert_eq!(h.borrow_count(), 0);
}

#[test]
fn n_acquires_need_n_releases() {
    let rt = MockRuntime::new();
    let h = ForeignArrayHandle::<i32>::create_1d(&rt, 3).unwrap();
    let addresses: Vec<_> = (0..5).map(|_| h.acquire().unwrap()).collect();
    assert_eq!(h.borrow_count(), 5);
    for (i, address) in addresses.iter().enumerate() {
        assert_eq!(h.release(*address), Ok(true));
        assert_eq!(h.borrow_count(), 4 - i as u32);
    }
    assert_eq!(
        h.release(addresses[0]),
        Err(ArrayError::UnbalancedRelease)
    );
    assert_eq!(h.borrow_count(), 0);
}

#[test]
fn release_of_different_address_is_noop() {
    let rt = MockRuntime::new();
    let a = ForeignArrayHandle::<f64>::create_1d(&rt, 2).unwrap();
    let b = ForeignArrayHandle::<f64>::create_1d(&rt, 2).unwrap();
    let a_addr = a.acquire().unwrap();
    let b_addr = b.acquire().unwrap();
    assert_ne!(a_addr, b_addr);

    assert_eq!(a.release(b_addr), Ok(false));
    assert_eq!(a.release(ptr::null_mut()), Ok(false));
    assert_eq!(a.borrow_count(), 1);

    a.release(a_addr).unwrap();
    b.release(b_addr).unwrap();
}

#[test]
fn handles_sharing_an_address_count_independently() {
    let rt = MockRuntime::new();
    let address = rt.alloc(ElementKind::UInt8, &[16]);
    // SAFETY: the runtime keeps the array live for the test.
    let first = unsafe { RawArrayHandle::wrap(address, HandleConfig::default()) }.unwrap();
    // SAFETY: as above.
    let second = unsafe { RawArrayHandle::wrap(address, HandleConfig::default()) }.unwrap();

    let borrowed = first.acquire().unwrap();
    assert_eq!(second.borrow_count(), 0);
    assert_eq!(
        second.release(borrowed),
        Err(ArrayError::UnbalancedRelease)
    );
    assert_eq!(first.release(borrowed), Ok(true));
}

#[test]
fn invalidate_is_one_way() {
    let rt = MockRuntime::new();
    let h = ForeignArrayHandle::<u32>::create_2d(&rt, 2, 2).unwrap();
    {
        let _guard = h.borrow().unwrap();
        assert_eq!(
            h.invalidate(),
            Err(ArrayError::BorrowsOutstanding { count: 1 })
        );
    }
    h.invalidate().unwrap();
    assert!(!h.is_valid());
    assert_eq!(h.acquire(), Err(ArrayError::InvalidHandle));
    assert!(matches!(h.borrow(), Err(ArrayError::InvalidHandle)));
    // Descriptor accessors need no foreign call and keep answering.
    assert_eq!(h.len(), 4);
    assert_eq!(h.ndims(), 2);
}

#[test]
fn unchecked_invalidate_abandons_outstanding_borrows() {
    let rt = MockRuntime::new();
    let address = rt.alloc(ElementKind::Int8, &[8]);
    // SAFETY: the runtime keeps the array live for the test.
    let h = unsafe { RawArrayHandle::wrap(address, HandleConfig::unchecked()) }.unwrap();
    let borrowed = h.acquire().unwrap();
    h.invalidate().unwrap();
    assert_eq!(h.release(borrowed), Ok(false));
    assert_eq!(h.acquire(), Err(ArrayError::InvalidHandle));
}

#[test]
fn concurrent_borrows_balance() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 2_000;

    let rt = MockRuntime::new();
    let h = ForeignArrayHandle::<f64>::create_1d(&rt, 64).unwrap();
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    let address = h.acquire().unwrap();
                    assert_eq!(h.release(address), Ok(true));
                    let guard = h.borrow().unwrap();
                    assert_eq!(guard.view().len(), 64);
                }
            });
        }
    });
    assert_eq!(h.borrow_count(), 0);
    h.invalidate().unwrap();
}

#[test]
fn concurrent_invalidate_never_strands_a_borrow() {
    let rt = MockRuntime::new();
    let address = rt.alloc(ElementKind::Float64, &[1]);
    // SAFETY: the runtime keeps the array live for the test.
    let h = unsafe { RawArrayHandle::wrap(address, HandleConfig::unchecked()) }.unwrap();
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while let Ok(address) = h.acquire() {
                    h.release(address).unwrap();
                }
            });
        }
        s.spawn(|| h.invalidate().unwrap());
    });
    assert!(!h.is_valid());
    assert_eq!(h.acquire(), Err(ArrayError::InvalidHandle));
}
