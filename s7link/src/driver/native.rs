//! The snap7 shared library behind the [`Driver`] trait.

use std::ffi::{c_char, c_int, c_void, CStr, OsStr};
use std::fmt;
use std::path::{Path, PathBuf};

use libloading::Library;

use super::{Driver, RawObject, RecvCompletionFn, SendCompletionFn};
use crate::error::{Error, Result};
use crate::params::ParamValue;
use crate::translator::Role;

type ObjFn = unsafe extern "system" fn(RawObject) -> c_int;
type ErrorTextFn = unsafe extern "system" fn(c_int, *mut c_char, c_int) -> c_int;
type SendFn = unsafe extern "system" fn(RawObject, u32, *mut c_void, c_int) -> c_int;
type ParamFn = unsafe extern "system" fn(RawObject, c_int, *mut c_void) -> c_int;

/// Declares the resolved entry-point table. Each field is copied out of the
/// library once at load time; the `Library` is kept alive next to it.
macro_rules! entry_points {
    ($($field:ident: $ty:ty = $symbol:literal;)*) => {
        struct EntryPoints {
            $($field: $ty,)*
        }

        impl EntryPoints {
            /// # Safety
            ///
            /// `lib` must be a snap7 build whose exports match the declared
            /// signatures.
            unsafe fn resolve(lib: &Library) -> Result<Self> {
                Ok(Self {
                    $($field: unsafe {
                        *lib.get::<$ty>(concat!($symbol, "\0").as_bytes())
                            .map_err(|_| Error::MissingSymbol { name: $symbol })?
                    },)*
                })
            }
        }
    };
}

entry_points! {
    create: unsafe extern "system" fn(c_int) -> RawObject = "Par_Create";
    destroy: unsafe extern "system" fn(*mut RawObject) -> c_int = "Par_Destroy";
    start: ObjFn = "Par_Start";
    start_to: unsafe extern "system" fn(RawObject, *const c_char, *const c_char, u16, u16) -> c_int = "Par_StartTo";
    stop: ObjFn = "Par_Stop";
    b_send: SendFn = "Par_BSend";
    as_b_send: SendFn = "Par_AsBSend";
    check_as_b_send_completion: unsafe extern "system" fn(RawObject, *mut c_int) -> c_int = "Par_CheckAsBSendCompletion";
    wait_as_b_send_completion: unsafe extern "system" fn(RawObject, u32) -> c_int = "Par_WaitAsBSendCompletion";
    b_recv: unsafe extern "system" fn(RawObject, *mut u32, *mut c_void, *mut c_int, u32) -> c_int = "Par_BRecv";
    check_as_b_recv_completion: unsafe extern "system" fn(RawObject, *mut c_int, *mut u32, *mut c_void, *mut c_int) -> c_int = "Par_CheckAsBRecvCompletion";
    set_send_callback: unsafe extern "system" fn(RawObject, Option<SendCompletionFn>, *mut c_void) -> c_int = "Par_SetSendCallback";
    set_recv_callback: unsafe extern "system" fn(RawObject, Option<RecvCompletionFn>, *mut c_void) -> c_int = "Par_SetRecvCallback";
    get_param: ParamFn = "Par_GetParam";
    set_param: ParamFn = "Par_SetParam";
    get_status: unsafe extern "system" fn(RawObject, *mut c_int) -> c_int = "Par_GetStatus";
    get_stats: unsafe extern "system" fn(RawObject, *mut u32, *mut u32, *mut u32, *mut u32) -> c_int = "Par_GetStats";
    get_times: unsafe extern "system" fn(RawObject, *mut u32, *mut u32) -> c_int = "Par_GetTimes";
    get_last_error: unsafe extern "system" fn(RawObject, *mut c_int) -> c_int = "Par_GetLastError";
    par_error_text: ErrorTextFn = "Par_ErrorText";
    cli_error_text: ErrorTextFn = "Cli_ErrorText";
    srv_error_text: ErrorTextFn = "Srv_ErrorText";
}

/// A loaded snap7 library.
pub struct NativeDriver {
    path: PathBuf,
    api: EntryPoints,
    // Must outlive every pointer in `api`.
    _lib: Library,
}

impl fmt::Debug for NativeDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeDriver")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl NativeDriver {
    /// Open the library at `path` (or resolve a bare file name through the
    /// system loader) and resolve every entry point.
    pub fn open(path: impl AsRef<OsStr>) -> Result<Self> {
        let path = PathBuf::from(path.as_ref());
        let lib = unsafe { Library::new(&path) }.map_err(|source| Error::DriverLoad {
            path: path.clone(),
            source,
        })?;
        let api = unsafe { EntryPoints::resolve(&lib) }?;
        Ok(Self {
            path,
            api,
            _lib: lib,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn len_c_int(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

impl Driver for NativeDriver {
    fn par_create(&self, active: bool) -> RawObject {
        unsafe { (self.api.create)(c_int::from(active)) }
    }

    fn par_destroy(&self, object: RawObject) -> i32 {
        let mut object = object;
        unsafe { (self.api.destroy)(&mut object) }
    }

    fn par_start(&self, object: RawObject) -> i32 {
        unsafe { (self.api.start)(object) }
    }

    fn par_start_to(
        &self,
        object: RawObject,
        local_address: &CStr,
        remote_address: &CStr,
        local_tsap: u16,
        remote_tsap: u16,
    ) -> i32 {
        unsafe {
            (self.api.start_to)(
                object,
                local_address.as_ptr(),
                remote_address.as_ptr(),
                local_tsap,
                remote_tsap,
            )
        }
    }

    fn par_stop(&self, object: RawObject) -> i32 {
        unsafe { (self.api.stop)(object) }
    }

    fn par_b_send(&self, object: RawObject, r_id: u32, data: &[u8]) -> i32 {
        // The driver only reads through this pointer.
        let ptr = data.as_ptr().cast_mut().cast::<c_void>();
        unsafe { (self.api.b_send)(object, r_id, ptr, len_c_int(data.len())) }
    }

    fn par_as_b_send(&self, object: RawObject, r_id: u32, data: &[u8]) -> i32 {
        let ptr = data.as_ptr().cast_mut().cast::<c_void>();
        unsafe { (self.api.as_b_send)(object, r_id, ptr, len_c_int(data.len())) }
    }

    fn par_check_as_b_send_completion(&self, object: RawObject, op_result: &mut i32) -> i32 {
        unsafe { (self.api.check_as_b_send_completion)(object, op_result) }
    }

    fn par_wait_as_b_send_completion(&self, object: RawObject, timeout_ms: u32) -> i32 {
        unsafe { (self.api.wait_as_b_send_completion)(object, timeout_ms) }
    }

    fn par_b_recv(
        &self,
        object: RawObject,
        r_id: &mut u32,
        buf: &mut [u8],
        size: &mut i32,
        timeout_ms: u32,
    ) -> i32 {
        *size = len_c_int(buf.len());
        unsafe {
            (self.api.b_recv)(
                object,
                r_id,
                buf.as_mut_ptr().cast::<c_void>(),
                size,
                timeout_ms,
            )
        }
    }

    fn par_check_as_b_recv_completion(
        &self,
        object: RawObject,
        op_result: &mut i32,
        r_id: &mut u32,
        buf: &mut [u8],
        size: &mut i32,
    ) -> i32 {
        *size = len_c_int(buf.len());
        unsafe {
            (self.api.check_as_b_recv_completion)(
                object,
                op_result,
                r_id,
                buf.as_mut_ptr().cast::<c_void>(),
                size,
            )
        }
    }

    unsafe fn par_set_send_callback(
        &self,
        object: RawObject,
        callback: Option<SendCompletionFn>,
        usr_ptr: *mut c_void,
    ) -> i32 {
        unsafe { (self.api.set_send_callback)(object, callback, usr_ptr) }
    }

    unsafe fn par_set_recv_callback(
        &self,
        object: RawObject,
        callback: Option<RecvCompletionFn>,
        usr_ptr: *mut c_void,
    ) -> i32 {
        unsafe { (self.api.set_recv_callback)(object, callback, usr_ptr) }
    }

    fn par_get_param(&self, object: RawObject, number: i32, value: &mut ParamValue) -> i32 {
        let ptr: *mut c_void = match value {
            ParamValue::U16(v) => (v as *mut u16).cast(),
            ParamValue::I32(v) => (v as *mut i32).cast(),
            ParamValue::U32(v) => (v as *mut u32).cast(),
        };
        unsafe { (self.api.get_param)(object, number, ptr) }
    }

    fn par_set_param(&self, object: RawObject, number: i32, value: &ParamValue) -> i32 {
        // The driver copies the value out; a local keeps the pointer mutable.
        let mut value = *value;
        let ptr: *mut c_void = match &mut value {
            ParamValue::U16(v) => (v as *mut u16).cast(),
            ParamValue::I32(v) => (v as *mut i32).cast(),
            ParamValue::U32(v) => (v as *mut u32).cast(),
        };
        unsafe { (self.api.set_param)(object, number, ptr) }
    }

    fn par_get_status(&self, object: RawObject, status: &mut i32) -> i32 {
        unsafe { (self.api.get_status)(object, status) }
    }

    fn par_get_stats(
        &self,
        object: RawObject,
        bytes_sent: &mut u32,
        bytes_recv: &mut u32,
        send_errors: &mut u32,
        recv_errors: &mut u32,
    ) -> i32 {
        unsafe { (self.api.get_stats)(object, bytes_sent, bytes_recv, send_errors, recv_errors) }
    }

    fn par_get_times(&self, object: RawObject, send_time: &mut u32, recv_time: &mut u32) -> i32 {
        unsafe { (self.api.get_times)(object, send_time, recv_time) }
    }

    fn par_get_last_error(&self, object: RawObject, last_error: &mut i32) -> i32 {
        unsafe { (self.api.get_last_error)(object, last_error) }
    }

    fn error_text(&self, role: Role, code: i32, buf: &mut [u8]) -> i32 {
        let entry = match role {
            Role::Client => self.api.cli_error_text,
            Role::Server => self.api.srv_error_text,
            Role::Partner => self.api.par_error_text,
        };
        unsafe { entry(code, buf.as_mut_ptr().cast::<c_char>(), len_c_int(buf.len())) }
    }
}
