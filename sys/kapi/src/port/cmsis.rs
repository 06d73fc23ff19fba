// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Target port: `extern "C"` bindings to a CMSIS-RTOS2 flavoured kernel.
//!
//! The platform glue is expected to link in the kernel and to run it with a
//! 1 kHz tick, so a tick equals a millisecond. Handles coming back from the
//! kernel are opaque pointers; a null handle at creation time is a fatal
//! configuration error and asserts.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ffi::c_void;
use core::marker::PhantomData;
use core::mem::{size_of, MaybeUninit};
use core::ptr;

use num_traits::FromPrimitive;

use crate::{KernelError, Priority, Timeout, WaitOpts};

#[allow(non_camel_case_types)]
type osStatus_t = i32;

const OS_OK: osStatus_t = 0;
const OS_WAIT_FOREVER: u32 = 0xFFFF_FFFF;
const OS_FLAGS_ERROR: u32 = 0x8000_0000;

#[repr(C)]
struct osThreadAttr_t {
    name: *const u8,
    attr_bits: u32,
    cb_mem: *mut c_void,
    cb_size: u32,
    stack_mem: *mut c_void,
    stack_size: u32,
    priority: i32,
    tz_module: u32,
    reserved: u32,
}

extern "C" {
    fn osEventFlagsNew(attr: *const c_void) -> *mut c_void;
    fn osEventFlagsSet(ef_id: *mut c_void, flags: u32) -> u32;
    fn osEventFlagsClear(ef_id: *mut c_void, flags: u32) -> u32;
    fn osEventFlagsGet(ef_id: *mut c_void) -> u32;
    fn osEventFlagsWait(
        ef_id: *mut c_void,
        flags: u32,
        options: u32,
        timeout: u32,
    ) -> u32;

    fn osMutexNew(attr: *const c_void) -> *mut c_void;
    fn osMutexAcquire(mutex_id: *mut c_void, timeout: u32) -> osStatus_t;
    fn osMutexRelease(mutex_id: *mut c_void) -> osStatus_t;

    fn osMessageQueueNew(
        msg_count: u32,
        msg_size: u32,
        attr: *const c_void,
    ) -> *mut c_void;
    fn osMessageQueuePut(
        mq_id: *mut c_void,
        msg_ptr: *const c_void,
        msg_prio: u8,
        timeout: u32,
    ) -> osStatus_t;
    fn osMessageQueueGet(
        mq_id: *mut c_void,
        msg_ptr: *mut c_void,
        msg_prio: *mut u8,
        timeout: u32,
    ) -> osStatus_t;
    fn osMessageQueueGetCount(mq_id: *mut c_void) -> u32;

    fn osThreadNew(
        func: extern "C" fn(*mut c_void),
        argument: *mut c_void,
        attr: *const osThreadAttr_t,
    ) -> *mut c_void;
    fn osThreadYield() -> osStatus_t;
    fn osThreadExit() -> !;
    fn osDelay(ticks: u32) -> osStatus_t;

    fn osKernelLock() -> i32;
    fn osKernelRestoreLock(lock: i32) -> i32;

    // FreeRTOS-side probe; returns remaining headroom in stack words.
    fn uxTaskGetStackHighWaterMark(task: *mut c_void) -> u32;
}

fn ticks_of(timeout: Timeout) -> u32 {
    match timeout {
        Timeout::Forever => OS_WAIT_FOREVER,
        Timeout::Ticks(t) => t,
    }
}

fn error_of(status: osStatus_t) -> KernelError {
    KernelError::from_i32(status).unwrap_or(KernelError::Unknown)
}

fn priority_of(p: Priority) -> i32 {
    match p {
        Priority::Idle => 1,
        Priority::Low => 8,
        Priority::BelowNormal => 16,
        Priority::Normal => 24,
        Priority::AboveNormal => 32,
        Priority::High => 40,
        Priority::Realtime => 48,
    }
}

pub struct EventGroup {
    id: *mut c_void,
}

// Safety: kernel object handles are freely shareable between tasks and ISRs.
unsafe impl Send for EventGroup {}
unsafe impl Sync for EventGroup {}

impl EventGroup {
    pub fn new() -> Self {
        let id = unsafe { osEventFlagsNew(ptr::null()) };
        assert!(!id.is_null());
        Self { id }
    }

    pub fn set(&self, bits: u32) {
        let rc = unsafe { osEventFlagsSet(self.id, bits) };
        assert!(rc & OS_FLAGS_ERROR == 0);
    }

    pub fn clear(&self, bits: u32) {
        let rc = unsafe { osEventFlagsClear(self.id, bits) };
        assert!(rc & OS_FLAGS_ERROR == 0);
    }

    pub fn get(&self) -> u32 {
        unsafe { osEventFlagsGet(self.id) }
    }

    pub fn wait(
        &self,
        mask: u32,
        opts: WaitOpts,
        timeout: Timeout,
    ) -> Result<u32, KernelError> {
        let rc = unsafe {
            osEventFlagsWait(self.id, mask, opts.bits(), ticks_of(timeout))
        };
        if rc & OS_FLAGS_ERROR != 0 {
            Err(error_of(rc as i32))
        } else {
            Ok(rc)
        }
    }
}

pub struct Mutex {
    id: *mut c_void,
}

unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    pub fn new() -> Self {
        let id = unsafe { osMutexNew(ptr::null()) };
        assert!(!id.is_null());
        Self { id }
    }

    pub fn acquire(&self, timeout: Timeout) -> Result<(), KernelError> {
        let rc = unsafe { osMutexAcquire(self.id, ticks_of(timeout)) };
        if rc == OS_OK {
            Ok(())
        } else {
            Err(error_of(rc))
        }
    }

    pub fn release(&self) {
        let rc = unsafe { osMutexRelease(self.id) };
        assert!(rc == OS_OK);
    }
}

pub struct Queue<T> {
    id: *mut c_void,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T: Copy + Send + 'static> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        let id = unsafe {
            osMessageQueueNew(
                capacity as u32,
                size_of::<T>() as u32,
                ptr::null(),
            )
        };
        assert!(!id.is_null());
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn put(&self, value: T, timeout: Timeout) -> Result<(), KernelError> {
        let rc = unsafe {
            osMessageQueuePut(
                self.id,
                &value as *const T as *const c_void,
                0,
                ticks_of(timeout),
            )
        };
        if rc == OS_OK {
            Ok(())
        } else {
            Err(error_of(rc))
        }
    }

    pub fn get(&self, timeout: Timeout) -> Result<T, KernelError> {
        let mut out = MaybeUninit::<T>::uninit();
        let rc = unsafe {
            osMessageQueueGet(
                self.id,
                out.as_mut_ptr() as *mut c_void,
                ptr::null_mut(),
                ticks_of(timeout),
            )
        };
        if rc == OS_OK {
            // Safety: the kernel copied a full message on success.
            Ok(unsafe { out.assume_init() })
        } else {
            Err(error_of(rc))
        }
    }

    pub fn len(&self) -> usize {
        unsafe { osMessageQueueGetCount(self.id) as usize }
    }

    pub fn count_probe(&self) -> CountProbe {
        CountProbe { id: self.id }
    }
}

#[derive(Copy, Clone)]
pub struct CountProbe {
    id: *mut c_void,
}

unsafe impl Send for CountProbe {}
unsafe impl Sync for CountProbe {}

impl CountProbe {
    pub fn count(&self) -> usize {
        unsafe { osMessageQueueGetCount(self.id) as usize }
    }
}

pub struct TaskHandle {
    #[allow(dead_code)]
    id: *mut c_void,
}

unsafe impl Send for TaskHandle {}

extern "C" fn thread_trampoline(argument: *mut c_void) {
    // Safety: the argument is the box we leaked in `spawn`, exactly once.
    let main =
        unsafe { Box::from_raw(argument as *mut Box<dyn FnOnce() + Send>) };
    main();
    unsafe { osThreadExit() }
}

pub fn spawn(
    name: &'static str,
    priority: Priority,
    stack_bytes: usize,
    main: Box<dyn FnOnce() + Send + 'static>,
) -> TaskHandle {
    // The kernel wants a NUL-terminated name; build one once and leak it,
    // tasks live forever anyway.
    let mut cname = Vec::with_capacity(name.len() + 1);
    cname.extend_from_slice(name.as_bytes());
    cname.push(0);
    let cname: &'static [u8] = Vec::leak(cname);

    let attr = osThreadAttr_t {
        name: cname.as_ptr(),
        attr_bits: 0,
        cb_mem: ptr::null_mut(),
        cb_size: 0,
        stack_mem: ptr::null_mut(),
        stack_size: stack_bytes as u32,
        priority: priority_of(priority),
        tz_module: 0,
        reserved: 0,
    };
    let arg = Box::into_raw(Box::new(main)) as *mut c_void;
    let id = unsafe { osThreadNew(thread_trampoline, arg, &attr) };
    assert!(!id.is_null());
    TaskHandle { id }
}

pub fn sleep_ms(ms: u32) {
    let rc = unsafe { osDelay(ms) };
    assert!(rc == OS_OK);
}

pub fn yield_now() {
    unsafe {
        osThreadYield();
    }
}

pub fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    let prev = unsafe { osKernelLock() };
    let r = f();
    unsafe {
        osKernelRestoreLock(prev);
    }
    r
}

pub fn stack_high_watermark_bytes() -> Option<u32> {
    // The probe reports words of headroom on a 32-bit kernel.
    let words = unsafe { uxTaskGetStackHighWaterMark(ptr::null_mut()) };
    Some(words * 4)
}
