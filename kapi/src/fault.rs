//! Fault injection for kernel API failure paths.
//!
//! A reduced form of the kernel's fault-injection attributes
//! (`failslab`, `fail_page_alloc`): each [`FaultPoint`] carries `space`
//! (successful calls to let through first) and `times` (failures to force).
//!
//! References: <https://www.kernel.org/doc/html/v6.6/fault-injection/fault-injection.html>

use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// `__kmalloc` / `kzalloc` return NULL.
    Slab,
    /// `__register_chrdev` fails with `-ENOMEM`.
    ChrdevRegion,
    /// `class_create` fails with `-ENOMEM`.
    ClassCreate,
    /// `device_create` fails with `-ENOMEM`.
    DeviceCreate,
}

const FAULT_POINTS: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
struct FaultAttr {
    space: usize,
    times: usize,
}

static FAULT_ATTRS: Mutex<[FaultAttr; FAULT_POINTS]> =
    Mutex::new([FaultAttr { space: 0, times: 0 }; FAULT_POINTS]);

/// Forces the next `times` calls through `point` to fail.
pub fn inject(point: FaultPoint, times: usize) {
    inject_after(point, 0, times);
}

/// Lets `space` calls through `point` succeed, then forces `times` failures.
pub fn inject_after(point: FaultPoint, space: usize, times: usize) {
    FAULT_ATTRS.lock()[point as usize] = FaultAttr { space, times };
}

pub fn clear(point: FaultPoint) {
    FAULT_ATTRS.lock()[point as usize] = FaultAttr::default();
}

pub fn clear_all() {
    *FAULT_ATTRS.lock() = [FaultAttr::default(); FAULT_POINTS];
}

/// Consulted by the kernel API at each fault point.
pub(crate) fn should_fail(point: FaultPoint) -> bool {
    let mut attrs = FAULT_ATTRS.lock();
    let attr = &mut attrs[point as usize];
    if attr.times == 0 {
        return false;
    }
    if attr.space > 0 {
        attr.space -= 1;
        return false;
    }
    attr.times -= 1;
    log::warn!("FAULT_INJECTION: forcing a failure at {:?}", point);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_then_times() {
        let _guard = crate::testing::serial();
        inject_after(FaultPoint::DeviceCreate, 1, 2);
        assert!(!should_fail(FaultPoint::DeviceCreate));
        assert!(should_fail(FaultPoint::DeviceCreate));
        assert!(should_fail(FaultPoint::DeviceCreate));
        assert!(!should_fail(FaultPoint::DeviceCreate));
        assert!(!should_fail(FaultPoint::ClassCreate));
    }

    #[test]
    fn test_clear() {
        let _guard = crate::testing::serial();
        inject(FaultPoint::ClassCreate, 3);
        clear(FaultPoint::ClassCreate);
        assert!(!should_fail(FaultPoint::ClassCreate));
    }
}
