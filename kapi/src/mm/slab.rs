//! `kmalloc` family backed by the global allocator.
//!
//! References: <https://elixir.bootlin.com/linux/v6.6/source/mm/slab_common.c>

use core::{
    alloc::Layout,
    ffi::c_void,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloc::alloc::{alloc, alloc_zeroed, dealloc};
use kbindings::{__GFP_ZERO, KMALLOC_MAX_SIZE, ZERO_SIZE_PTR, gfp_t};
use kmacro::capi_fn;

use crate::fault::{self, FaultPoint};

/// Every object carries its size in a header so `kfree` can rebuild the layout.
const SLAB_HEADER: usize = 16;
const SLAB_ALIGN: usize = 16;

static OUTSTANDING: AtomicUsize = AtomicUsize::new(0);

fn object_layout(size: usize) -> Option<Layout> {
    let total = size.checked_add(SLAB_HEADER)?;
    Layout::from_size_align(total, SLAB_ALIGN).ok()
}

/// kmalloc - allocate kernel memory
///
/// # Arguments
/// - size: how many bytes of memory are required
/// - flags: the type of memory to allocate, `__GFP_ZERO` zeroes it
///
/// # Returns
/// `ZERO_SIZE_PTR` for a zero-sized request, NULL when the request exceeds
/// `KMALLOC_MAX_SIZE` or the allocator fails.
#[capi_fn]
pub unsafe extern "C" fn __kmalloc(size: usize, flags: gfp_t) -> *mut c_void {
    if size == 0 {
        return ZERO_SIZE_PTR;
    }
    if size > KMALLOC_MAX_SIZE {
        log::warn!(
            "kmalloc: request of {} bytes exceeds KMALLOC_MAX_SIZE ({})",
            size,
            KMALLOC_MAX_SIZE
        );
        return core::ptr::null_mut();
    }
    if fault::should_fail(FaultPoint::Slab) {
        return core::ptr::null_mut();
    }
    let Some(layout) = object_layout(size) else {
        return core::ptr::null_mut();
    };
    let base = if flags & __GFP_ZERO != 0 {
        alloc_zeroed(layout)
    } else {
        alloc(layout)
    };
    if base.is_null() {
        return core::ptr::null_mut();
    }
    (base as *mut usize).write(size);
    OUTSTANDING.fetch_add(1, Ordering::Relaxed);
    base.add(SLAB_HEADER) as *mut c_void
}

/// kzalloc - allocate memory. The memory is set to zero.
#[capi_fn]
pub unsafe extern "C" fn kzalloc(size: usize, flags: gfp_t) -> *mut c_void {
    __kmalloc(size, flags | __GFP_ZERO)
}

/// kfree - free previously allocated memory
///
/// NULL and `ZERO_SIZE_PTR` are ignored.
#[capi_fn]
pub unsafe extern "C" fn kfree(ptr: *const c_void) {
    if ptr.is_null() || ptr == ZERO_SIZE_PTR as *const c_void {
        return;
    }
    let base = (ptr as *mut u8).sub(SLAB_HEADER);
    let size = (base as *const usize).read();
    // The header was written by `__kmalloc` with a layout that was valid then.
    let layout = Layout::from_size_align_unchecked(size + SLAB_HEADER, SLAB_ALIGN);
    dealloc(base, layout);
    OUTSTANDING.fetch_sub(1, Ordering::Relaxed);
}

/// Number of slab objects currently allocated.
pub fn outstanding() -> usize {
    OUTSTANDING.load(Ordering::Relaxed)
}
