//! The native driver surface.
//!
//! [`Driver`] mirrors the snap7 entry points one-to-one, with Rust slices and
//! out-parameters in place of raw pointers. Every method returns the raw
//! result code; classification happens in [`crate::translator`].
//!
//! Implementations:
//! - [`native::NativeDriver`]: the shared library, loaded once per process by
//!   [`loader::load_library`].
//! - [`mock::MockDriver`]: an in-process simulation for tests and for
//!   running without the library installed.

use std::ffi::{c_int, c_void, CStr};

use crate::params::ParamValue;
use crate::translator::Role;

pub mod loader;
pub mod mock;
pub mod native;

/// Pointer-sized native object reference (`S7Object`). Zero is null.
pub type RawObject = usize;

/// Largest data block a partner transfers.
pub const MAX_BLOCK_SIZE: usize = 0x10000;

/// Called by the driver when an asynchronous send finishes.
pub type SendCompletionFn = unsafe extern "system" fn(usr_ptr: *mut c_void, op_result: c_int);

/// Called by the driver when a data block has been received.
pub type RecvCompletionFn = unsafe extern "system" fn(
    usr_ptr: *mut c_void,
    op_result: c_int,
    r_id: u32,
    data: *mut c_void,
    size: c_int,
);

/// Callable surface of the snap7 driver, partner and error-text entry points.
pub trait Driver: Send + Sync {
    /// Allocate a partner object. Returns 0 on failure.
    fn par_create(&self, active: bool) -> RawObject;
    fn par_destroy(&self, object: RawObject) -> i32;

    fn par_start(&self, object: RawObject) -> i32;
    fn par_start_to(
        &self,
        object: RawObject,
        local_address: &CStr,
        remote_address: &CStr,
        local_tsap: u16,
        remote_tsap: u16,
    ) -> i32;
    fn par_stop(&self, object: RawObject) -> i32;

    fn par_b_send(&self, object: RawObject, r_id: u32, data: &[u8]) -> i32;
    /// The driver may keep reading `data` until the job completes; callers keep
    /// the buffer alive for that long.
    fn par_as_b_send(&self, object: RawObject, r_id: u32, data: &[u8]) -> i32;
    /// Returns [`crate::codes::JOB_COMPLETE`] with `op_result` filled in, or
    /// [`crate::codes::JOB_PENDING`].
    fn par_check_as_b_send_completion(&self, object: RawObject, op_result: &mut i32) -> i32;
    fn par_wait_as_b_send_completion(&self, object: RawObject, timeout_ms: u32) -> i32;

    fn par_b_recv(
        &self,
        object: RawObject,
        r_id: &mut u32,
        buf: &mut [u8],
        size: &mut i32,
        timeout_ms: u32,
    ) -> i32;
    fn par_check_as_b_recv_completion(
        &self,
        object: RawObject,
        op_result: &mut i32,
        r_id: &mut u32,
        buf: &mut [u8],
        size: &mut i32,
    ) -> i32;

    /// Register (or clear, with `None`) the send-completion callback.
    ///
    /// # Safety
    ///
    /// `usr_ptr` is handed back to `callback` from a driver thread and must
    /// stay valid until the callback is replaced or the object destroyed.
    unsafe fn par_set_send_callback(
        &self,
        object: RawObject,
        callback: Option<SendCompletionFn>,
        usr_ptr: *mut c_void,
    ) -> i32;

    /// Register (or clear, with `None`) the receive callback.
    ///
    /// # Safety
    ///
    /// Same contract as [`Driver::par_set_send_callback`].
    unsafe fn par_set_recv_callback(
        &self,
        object: RawObject,
        callback: Option<RecvCompletionFn>,
        usr_ptr: *mut c_void,
    ) -> i32;

    fn par_get_param(&self, object: RawObject, number: i32, value: &mut ParamValue) -> i32;
    fn par_set_param(&self, object: RawObject, number: i32, value: &ParamValue) -> i32;

    fn par_get_status(&self, object: RawObject, status: &mut i32) -> i32;
    fn par_get_stats(
        &self,
        object: RawObject,
        bytes_sent: &mut u32,
        bytes_recv: &mut u32,
        send_errors: &mut u32,
        recv_errors: &mut u32,
    ) -> i32;
    fn par_get_times(&self, object: RawObject, send_time: &mut u32, recv_time: &mut u32) -> i32;
    fn par_get_last_error(&self, object: RawObject, last_error: &mut i32) -> i32;

    /// Write the text for `code` into `buf`, NUL-terminated, using the
    /// role's error-text entry point.
    fn error_text(&self, role: Role, code: i32, buf: &mut [u8]) -> i32;
}
