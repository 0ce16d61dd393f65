//! In-process stand-in for the snap7 driver (tests, demos, machines without
//! the library).
//!
//! Behaviour:
//! - objects live in a handle table keyed by a monotonically increasing id
//! - parameters start at the library defaults
//! - an active and a passive object link when their `start_to` addresses
//!   mirror each other; anything else stays connecting/waiting
//! - asynchronous sends complete on a background thread after
//!   `completion_delay`
//! - callbacks run on background threads, never on the caller's thread

use std::collections::VecDeque;
use std::ffi::{c_int, c_void, CStr};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};

use super::{Driver, RawObject, RecvCompletionFn, SendCompletionFn};
use crate::codes::*;
use crate::params::{ParamValue, Parameter};
use crate::partner::PartnerStatus;
use crate::translator::Role;

const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_millis(10);

fn default_params() -> [u32; 16] {
    let mut params = [0u32; 16];
    for (param, value) in [
        (Parameter::LocalPort, 0),
        (Parameter::RemotePort, 102),
        (Parameter::PingTimeout, 750),
        (Parameter::SendTimeout, 10),
        (Parameter::RecvTimeout, 3000),
        (Parameter::WorkInterval, 100),
        (Parameter::SrcRef, 256),
        (Parameter::DstRef, 0),
        (Parameter::SrcTSap, 0),
        (Parameter::PDURequest, 480),
        (Parameter::MaxClients, 0),
        (Parameter::BSendTimeout, 3000),
        (Parameter::BRecvTimeout, 3000),
        (Parameter::RecoveryTime, 500),
        (Parameter::KeepAliveTime, 5000),
    ] {
        params[param.number() as usize] = value;
    }
    params
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Idle,
    Running,
    Done(i32),
}

#[derive(Default, Clone, Copy)]
struct Callbacks {
    send: Option<(SendCompletionFn, usize)>,
    recv: Option<(RecvCompletionFn, usize)>,
}

struct SimState {
    running: bool,
    status: PartnerStatus,
    local: String,
    remote: String,
    peer: Option<Weak<SimObject>>,
    params: [u32; 16],
    job: Job,
    inbox: VecDeque<(u32, Vec<u8>)>,
    last_error: i32,
    bytes_sent: u32,
    bytes_recv: u32,
    send_errors: u32,
    recv_errors: u32,
    send_time: u32,
    recv_time: u32,
}

impl SimState {
    fn new() -> Self {
        Self {
            running: false,
            status: PartnerStatus::Stopped,
            local: String::new(),
            remote: String::new(),
            peer: None,
            params: default_params(),
            job: Job::Idle,
            inbox: VecDeque::new(),
            last_error: OK,
            bytes_sent: 0,
            bytes_recv: 0,
            send_errors: 0,
            recv_errors: 0,
            send_time: 0,
            recv_time: 0,
        }
    }

    fn peer(&self) -> Option<Arc<SimObject>> {
        if !self.status.is_linked() {
            return None;
        }
        self.peer.as_ref().and_then(Weak::upgrade)
    }

    fn fail(&mut self, code: i32) -> i32 {
        self.last_error = code;
        code
    }
}

struct SimObject {
    id: RawObject,
    active: bool,
    state: Mutex<SimState>,
    changed: Condvar,
    // Held for reading while a callback runs, so clearing them waits for
    // in-flight invocations.
    callbacks: RwLock<Callbacks>,
}

impl SimObject {
    fn idle_status(&self) -> PartnerStatus {
        if self.active {
            PartnerStatus::Connecting
        } else {
            PartnerStatus::Waiting
        }
    }
}

/// Simulated snap7 driver.
pub struct MockDriver {
    objects: DashMap<RawObject, Arc<SimObject>>,
    next_object: AtomicUsize,
    fail_alloc: AtomicBool,
    fail_stop: AtomicBool,
    destroy_calls: AtomicUsize,
    completion_delay: Duration,
    callback_lag: Duration,
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDriver")
            .field("live_objects", &self.objects.len())
            .field("completion_delay", &self.completion_delay)
            .field("callback_lag", &self.callback_lag)
            .finish_non_exhaustive()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_completion_delay(DEFAULT_COMPLETION_DELAY)
    }

    /// Asynchronous sends finish `delay` after they are accepted.
    pub fn with_completion_delay(delay: Duration) -> Self {
        Self {
            objects: DashMap::new(),
            next_object: AtomicUsize::new(1),
            fail_alloc: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            destroy_calls: AtomicUsize::new(0),
            completion_delay: delay,
            callback_lag: Duration::ZERO,
        }
    }

    /// Fire the send-completion callback `lag` after the job already
    /// reports done to polls and waits.
    pub fn with_callback_lag(mut self, lag: Duration) -> Self {
        self.callback_lag = lag;
        self
    }

    /// Make `par_create` return a null object while set.
    pub fn set_fail_alloc(&self, fail: bool) {
        self.fail_alloc.store(fail, Ordering::SeqCst);
    }

    /// Make `par_stop` report `ERR_ISO_DISCONNECT` and leave the object
    /// running while set.
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Number of `par_destroy` calls, including ones for unknown objects.
    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    fn object(&self, id: RawObject) -> Option<Arc<SimObject>> {
        self.objects.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn start_object(&self, obj: &Arc<SimObject>) {
        {
            let mut st = obj.state.lock();
            st.running = true;
            if st.peer().is_none() {
                st.status = obj.idle_status();
            }
        }
        self.try_link(obj);
    }

    fn try_link(&self, obj: &Arc<SimObject>) {
        let (local, remote) = {
            let st = obj.state.lock();
            if st.peer().is_some() || (st.local.is_empty() && st.remote.is_empty()) {
                return;
            }
            (st.local.clone(), st.remote.clone())
        };
        let others: Vec<Arc<SimObject>> = self
            .objects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .filter(|o| o.id != obj.id && o.active != obj.active)
            .collect();
        for other in others {
            let mut theirs = other.state.lock();
            if theirs.running
                && theirs.peer().is_none()
                && theirs.local == remote
                && theirs.remote == local
            {
                theirs.peer = Some(Arc::downgrade(obj));
                theirs.status = PartnerStatus::Linked;
                drop(theirs);
                let mut mine = obj.state.lock();
                mine.peer = Some(Arc::downgrade(&other));
                mine.status = PartnerStatus::Linked;
                tracing::debug!("mock partner {} linked to {}", obj.id, other.id);
                return;
            }
        }
    }

    /// Stop `obj`, fail its running job and unlink its peer.
    fn halt(&self, obj: &Arc<SimObject>) {
        let peer = {
            let mut st = obj.state.lock();
            st.running = false;
            st.status = PartnerStatus::Stopped;
            if st.job == Job::Running {
                st.job = Job::Done(ERR_PAR_NOT_LINKED);
            }
            st.peer.take().and_then(|w| w.upgrade())
        };
        obj.changed.notify_all();
        if let Some(peer) = peer {
            let mut st = peer.state.lock();
            st.peer = None;
            if st.running {
                st.status = peer.idle_status();
            }
            if st.job == Job::Running {
                st.job = Job::Done(ERR_PAR_NOT_LINKED);
            }
            drop(st);
            peer.changed.notify_all();
        }
    }
}

/// Hand a block to `peer`: through its receive callback on a background
/// thread if one is registered, otherwise into its inbox.
fn deliver(peer: &Arc<SimObject>, r_id: u32, data: Vec<u8>) -> i32 {
    let has_callback = peer.callbacks.read().recv.is_some();
    {
        let mut st = peer.state.lock();
        if !st.running {
            return ERR_PAR_NOT_LINKED;
        }
        st.bytes_recv = st.bytes_recv.wrapping_add(data.len() as u32);
        st.recv_time = 0;
        if !has_callback {
            st.inbox.push_back((r_id, data));
            drop(st);
            peer.changed.notify_all();
            return OK;
        }
    }
    let peer = Arc::clone(peer);
    std::thread::spawn(move || {
        let mut data = data;
        let callbacks = peer.callbacks.read();
        match callbacks.recv {
            Some((cb, usr_ptr)) => unsafe {
                cb(
                    usr_ptr as *mut c_void,
                    OK,
                    r_id,
                    data.as_mut_ptr().cast::<c_void>(),
                    data.len() as c_int,
                );
            },
            None => {
                drop(callbacks);
                peer.state.lock().inbox.push_back((r_id, data));
                peer.changed.notify_all();
            }
        }
    });
    OK
}

fn account_send(st: &mut SimState, code: i32, len: usize, started: Instant) {
    if code == OK {
        st.bytes_sent = st.bytes_sent.wrapping_add(len as u32);
        st.send_time = started.elapsed().as_millis().min(u128::from(u32::MAX)) as u32;
    } else {
        st.send_errors += 1;
        st.last_error = code;
    }
}

fn copy_block(block: (u32, Vec<u8>), r_id: &mut u32, buf: &mut [u8], size: &mut i32) -> i32 {
    let (id, data) = block;
    if data.len() > buf.len() {
        return ERR_PAR_BUFFER_TOO_SMALL;
    }
    buf[..data.len()].copy_from_slice(&data);
    *r_id = id;
    *size = data.len() as i32;
    OK
}

macro_rules! object_or_invalid {
    ($driver:expr, $object:expr) => {
        match $driver.object($object) {
            Some(obj) => obj,
            None => return INVALID_OBJECT,
        }
    };
}

impl Driver for MockDriver {
    fn par_create(&self, active: bool) -> RawObject {
        if self.fail_alloc.load(Ordering::SeqCst) {
            return 0;
        }
        let id = self.next_object.fetch_add(1, Ordering::Relaxed);
        let obj = Arc::new(SimObject {
            id,
            active,
            state: Mutex::new(SimState::new()),
            changed: Condvar::new(),
            callbacks: RwLock::new(Callbacks::default()),
        });
        self.objects.insert(id, obj);
        tracing::debug!("mock partner {id} created (active: {active})");
        id
    }

    fn par_destroy(&self, object: RawObject) -> i32 {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, obj)) = self.objects.remove(&object) {
            self.halt(&obj);
            *obj.callbacks.write() = Callbacks::default();
            tracing::debug!("mock partner {object} destroyed");
        }
        OK
    }

    fn par_start(&self, object: RawObject) -> i32 {
        let obj = object_or_invalid!(self, object);
        self.start_object(&obj);
        OK
    }

    fn par_start_to(
        &self,
        object: RawObject,
        local_address: &CStr,
        remote_address: &CStr,
        _local_tsap: u16,
        _remote_tsap: u16,
    ) -> i32 {
        let obj = object_or_invalid!(self, object);
        if obj.state.lock().running {
            self.halt(&obj);
        }
        {
            let mut st = obj.state.lock();
            st.local = local_address.to_string_lossy().into_owned();
            st.remote = remote_address.to_string_lossy().into_owned();
        }
        self.start_object(&obj);
        OK
    }

    fn par_stop(&self, object: RawObject) -> i32 {
        let obj = object_or_invalid!(self, object);
        if self.fail_stop.load(Ordering::SeqCst) {
            return obj.state.lock().fail(ERR_ISO_DISCONNECT);
        }
        self.halt(&obj);
        OK
    }

    fn par_b_send(&self, object: RawObject, r_id: u32, data: &[u8]) -> i32 {
        let obj = object_or_invalid!(self, object);
        let started = Instant::now();
        let peer = obj.state.lock().peer();
        let code = match peer {
            Some(peer) => deliver(&peer, r_id, data.to_vec()),
            None => ERR_PAR_NOT_LINKED,
        };
        account_send(&mut obj.state.lock(), code, data.len(), started);
        code
    }

    fn par_as_b_send(&self, object: RawObject, r_id: u32, data: &[u8]) -> i32 {
        let obj = object_or_invalid!(self, object);
        let peer = {
            let mut st = obj.state.lock();
            if st.job == Job::Running {
                return st.fail(ERR_PAR_BUSY);
            }
            let Some(peer) = st.peer() else {
                st.send_errors += 1;
                return st.fail(ERR_PAR_NOT_LINKED);
            };
            st.job = Job::Running;
            peer
        };
        let data = data.to_vec();
        let delay = self.completion_delay;
        let lag = self.callback_lag;
        std::thread::spawn(move || {
            let started = Instant::now();
            std::thread::sleep(delay);
            let len = data.len();
            let code = deliver(&peer, r_id, data);
            let finished = {
                let mut st = obj.state.lock();
                if st.job == Job::Running {
                    st.job = Job::Done(code);
                    account_send(&mut st, code, len, started);
                    true
                } else {
                    false
                }
            };
            obj.changed.notify_all();
            if finished {
                if !lag.is_zero() {
                    std::thread::sleep(lag);
                }
                let callbacks = obj.callbacks.read();
                if let Some((cb, usr_ptr)) = callbacks.send {
                    unsafe { cb(usr_ptr as *mut c_void, code) };
                }
            }
        });
        OK
    }

    fn par_check_as_b_send_completion(&self, object: RawObject, op_result: &mut i32) -> i32 {
        let obj = object_or_invalid!(self, object);
        match obj.state.lock().job {
            Job::Running => JOB_PENDING,
            Job::Done(code) => {
                *op_result = code;
                JOB_COMPLETE
            }
            Job::Idle => {
                *op_result = OK;
                JOB_COMPLETE
            }
        }
    }

    fn par_wait_as_b_send_completion(&self, object: RawObject, timeout_ms: u32) -> i32 {
        let obj = object_or_invalid!(self, object);
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let mut st = obj.state.lock();
        while st.job == Job::Running {
            if obj.changed.wait_until(&mut st, deadline).timed_out() && st.job == Job::Running {
                return st.fail(ERR_PAR_SEND_TIMEOUT);
            }
        }
        let job = st.job;
        match job {
            Job::Done(code) => code,
            _ => st.fail(ERR_PAR_INVALID_PARAMS),
        }
    }

    fn par_b_recv(
        &self,
        object: RawObject,
        r_id: &mut u32,
        buf: &mut [u8],
        size: &mut i32,
        timeout_ms: u32,
    ) -> i32 {
        let obj = object_or_invalid!(self, object);
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let mut st = obj.state.lock();
        loop {
            if let Some(block) = st.inbox.pop_front() {
                let code = copy_block(block, r_id, buf, size);
                if code != OK {
                    st.recv_errors += 1;
                    return st.fail(code);
                }
                return code;
            }
            if !st.running {
                return st.fail(ERR_PAR_NOT_LINKED);
            }
            if obj.changed.wait_until(&mut st, deadline).timed_out() && st.inbox.is_empty() {
                st.recv_errors += 1;
                return st.fail(ERR_PAR_RECV_TIMEOUT);
            }
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
        let obj = object_or_invalid!(self, object);
        let mut st = obj.state.lock();
        match st.inbox.pop_front() {
            Some(block) => {
                *op_result = copy_block(block, r_id, buf, size);
                JOB_COMPLETE
            }
            None => JOB_PENDING,
        }
    }

    unsafe fn par_set_send_callback(
        &self,
        object: RawObject,
        callback: Option<SendCompletionFn>,
        usr_ptr: *mut c_void,
    ) -> i32 {
        let obj = object_or_invalid!(self, object);
        obj.callbacks.write().send = callback.map(|cb| (cb, usr_ptr as usize));
        OK
    }

    unsafe fn par_set_recv_callback(
        &self,
        object: RawObject,
        callback: Option<RecvCompletionFn>,
        usr_ptr: *mut c_void,
    ) -> i32 {
        let obj = object_or_invalid!(self, object);
        obj.callbacks.write().recv = callback.map(|cb| (cb, usr_ptr as usize));
        OK
    }

    fn par_get_param(&self, object: RawObject, number: i32, value: &mut ParamValue) -> i32 {
        let obj = object_or_invalid!(self, object);
        let mut st = obj.state.lock();
        match Parameter::from_number(number) {
            None | Some(Parameter::MaxClients) => st.fail(ERR_PAR_INVALID_PARAM_NUMBER),
            Some(param) => {
                let stored = st.params[param.number() as usize];
                match value {
                    ParamValue::U16(v) => *v = stored as u16,
                    ParamValue::I32(v) => *v = stored as i32,
                    ParamValue::U32(v) => *v = stored,
                }
                OK
            }
        }
    }

    fn par_set_param(&self, object: RawObject, number: i32, value: &ParamValue) -> i32 {
        let obj = object_or_invalid!(self, object);
        let mut st = obj.state.lock();
        match Parameter::from_number(number) {
            None | Some(Parameter::MaxClients) => st.fail(ERR_PAR_INVALID_PARAM_NUMBER),
            Some(Parameter::RemotePort) => st.fail(ERR_PAR_CANNOT_CHANGE_PARAM),
            Some(param) => match value.to_u32() {
                Some(v) => {
                    st.params[param.number() as usize] = v;
                    OK
                }
                None => st.fail(ERR_PAR_INVALID_PARAMS),
            },
        }
    }

    fn par_get_status(&self, object: RawObject, status: &mut i32) -> i32 {
        let obj = object_or_invalid!(self, object);
        *status = obj.state.lock().status as i32;
        OK
    }

    fn par_get_stats(
        &self,
        object: RawObject,
        bytes_sent: &mut u32,
        bytes_recv: &mut u32,
        send_errors: &mut u32,
        recv_errors: &mut u32,
    ) -> i32 {
        let obj = object_or_invalid!(self, object);
        let st = obj.state.lock();
        *bytes_sent = st.bytes_sent;
        *bytes_recv = st.bytes_recv;
        *send_errors = st.send_errors;
        *recv_errors = st.recv_errors;
        OK
    }

    fn par_get_times(&self, object: RawObject, send_time: &mut u32, recv_time: &mut u32) -> i32 {
        let obj = object_or_invalid!(self, object);
        let st = obj.state.lock();
        *send_time = st.send_time;
        *recv_time = st.recv_time;
        OK
    }

    fn par_get_last_error(&self, object: RawObject, last_error: &mut i32) -> i32 {
        let obj = object_or_invalid!(self, object);
        *last_error = obj.state.lock().last_error;
        OK
    }

    fn error_text(&self, role: Role, code: i32, buf: &mut [u8]) -> i32 {
        let Some(room) = buf.len().checked_sub(1) else {
            return ERR_PAR_BUFFER_TOO_SMALL;
        };
        let text = describe(role, code);
        let len = text.len().min(room);
        buf[..len].copy_from_slice(&text.as_bytes()[..len]);
        buf[len] = 0;
        OK
    }
}

fn tcp_text(code: i32) -> Option<String> {
    let text = match code {
        0 => return None,
        ERR_TCP_SOCKET_CREATION => "TCP : Error creating the Socket",
        ERR_TCP_CONNECTION_TIMEOUT => "TCP : Connection Timeout",
        ERR_TCP_CONNECTION_FAILED => "TCP : Connection Error",
        ERR_TCP_RECEIVE_TIMEOUT => "TCP : Data receive Timeout",
        ERR_TCP_DATA_RECEIVE => "TCP : Error receiving Data",
        ERR_TCP_SEND_TIMEOUT => "TCP : Data send Timeout",
        ERR_TCP_DATA_SEND => "TCP : Error sending Data",
        ERR_TCP_CONNECTION_RESET => "TCP : Connection reset by the Peer",
        ERR_TCP_NOT_CONNECTED => "TCP : Socket not connected",
        ERR_TCP_UNREACHABLE_HOST => "TCP : Unreachable host",
        other => return Some(format!("TCP : Other Socket error ({other})")),
    };
    Some(text.to_string())
}

fn iso_text(code: i32) -> Option<&'static str> {
    Some(match code {
        ERR_ISO_CONNECT => "ISO : Connection error",
        ERR_ISO_DISCONNECT => "ISO : Disconnect error",
        ERR_ISO_INVALID_PDU => "ISO : Bad PDU format",
        ERR_ISO_INVALID_DATA_SIZE => "ISO : Data size passed to send/recv buffer is invalid",
        ERR_ISO_NULL_POINTER => "ISO : Null passed as pointer",
        ERR_ISO_SHORT_PACKET => "ISO : A short packet received",
        ERR_ISO_TOO_MANY_FRAGMENTS => "ISO : Too many packets without EoT flag",
        ERR_ISO_PDU_OVERFLOW => "ISO : The sum of fragments data exceded maximum packet size",
        ERR_ISO_SEND_PACKET => "ISO : An error occurred during send",
        ERR_ISO_RECV_PACKET => "ISO : An error occurred during recv",
        ERR_ISO_INVALID_PARAMS => "ISO : Invalid connection params (wrong TSAPs)",
        0 => return None,
        _ => "ISO : Unknown error",
    })
}

fn partner_text(code: i32) -> Option<&'static str> {
    Some(match code {
        ERR_PAR_ADDRESS_IN_USE => "PAR : Address already in use",
        ERR_PAR_NO_ROOM => "PAR : No more partners available",
        ERR_PAR_INVALID_PARAMS => "PAR : Invalid parameter supplied",
        ERR_PAR_NOT_LINKED => "PAR : Cannot perform, Partner not linked",
        ERR_PAR_BUSY => "PAR : Cannot perform, Partner Busy",
        ERR_PAR_FRAME_TIMEOUT => "PAR : Frame timeout",
        ERR_PAR_INVALID_PDU => "PAR : Invalid PDU received",
        ERR_PAR_SEND_TIMEOUT => "PAR : Send timeout",
        ERR_PAR_RECV_TIMEOUT => "PAR : Recv timeout",
        ERR_PAR_SEND_REFUSED => "PAR : Send refused by peer",
        ERR_PAR_NEGOTIATING_PDU => "PAR : Error negotiating PDU",
        ERR_PAR_SENDING_BLOCK => "PAR : Error Sending Block",
        ERR_PAR_RECVING_BLOCK => "PAR : Error Receiving Block",
        ERR_PAR_BIND_ERROR => "PAR : Error Binding",
        ERR_PAR_DESTROYING => "PAR : Error Destroying",
        ERR_PAR_INVALID_PARAM_NUMBER => "PAR : Invalid Param Number",
        ERR_PAR_CANNOT_CHANGE_PARAM => "PAR : Cannot change this param now",
        ERR_PAR_BUFFER_TOO_SMALL => "PAR : Buffer too small",
        0 => return None,
        _ => "PAR : Unknown error",
    })
}

fn client_text(code: i32) -> Option<&'static str> {
    Some(match code {
        ERR_CLI_NEGOTIATING_PDU => "CPU : Error in PDU negotiation",
        ERR_CLI_INVALID_PARAMS => "CLI : invalid param(s) supplied",
        ERR_CLI_JOB_PENDING => "CLI : Job pending",
        ERR_CLI_TOO_MANY_ITEMS => "CLI : too may items (>20) in multi read/write",
        ERR_CLI_INVALID_WORD_LEN => "CLI : invalid WordLength",
        ERR_CLI_PARTIAL_DATA_WRITTEN => "CLI : Partial data written",
        ERR_CLI_SIZE_OVER_PDU => "CPU : total data exceeds the PDU size",
        ERR_CLI_INVALID_PLC_ANSWER => "CLI : invalid CPU answer",
        ERR_CLI_ADDRESS_OUT_OF_RANGE => "CPU : Address out of range",
        ERR_CLI_INVALID_PARAM_NUMBER => "CLI : Invalid Param Number",
        ERR_CLI_CANNOT_CHANGE_PARAM => "CLI : Cannot change this param now",
        0 => return None,
        _ => "CLI : Unknown error",
    })
}

fn server_text(code: i32) -> Option<&'static str> {
    Some(match code {
        ERR_SRV_CANNOT_START => "SRV : Server cannot start",
        ERR_SRV_DB_NULL_POINTER => "SRV : Null passed as area pointer",
        ERR_SRV_AREA_ALREADY_EXISTS => "SRV : Cannot register area since already exists",
        ERR_SRV_UNKNOWN_AREA => "SRV : Unknown Area code",
        ERR_SRV_INVALID_PARAMS => "SRV : Invalid param(s) supplied",
        ERR_SRV_TOO_MANY_DB => "SRV : Cannot register DB: too many",
        ERR_SRV_INVALID_PARAM_NUMBER => "SRV : Invalid param number",
        ERR_SRV_CANNOT_CHANGE_PARAM => "SRV : Cannot change this param now",
        0 => return None,
        _ => "SRV : Unknown error",
    })
}

/// Text for `code` in the style of the library: one part per layer.
fn describe(role: Role, code: i32) -> String {
    match code {
        OK => return "OK".to_string(),
        INVALID_OBJECT => return "Invalid object supplied".to_string(),
        _ => {}
    }
    let upper = code & UPPER_MASK;
    let upper_text = match role {
        Role::Partner => partner_text(upper),
        Role::Client => client_text(upper),
        Role::Server => server_text(upper),
    };
    let parts: Vec<String> = [
        tcp_text(code & TCP_MASK),
        iso_text(code & ISO_MASK).map(str::to_string),
        upper_text.map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .collect();
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn start_pair(driver: &MockDriver) -> (RawObject, RawObject) {
        let passive = driver.par_create(false);
        let active = driver.par_create(true);
        let a = CString::new("10.0.0.1").unwrap();
        let b = CString::new("10.0.0.2").unwrap();
        assert_eq!(driver.par_start_to(passive, &a, &b, 0x1002, 0x1002), OK);
        assert_eq!(driver.par_start_to(active, &b, &a, 0x1002, 0x1002), OK);
        (passive, active)
    }

    fn status(driver: &MockDriver, object: RawObject) -> i32 {
        let mut status = -1;
        assert_eq!(driver.par_get_status(object, &mut status), OK);
        status
    }

    #[test]
    fn test_mirrored_addresses_link() {
        let driver = MockDriver::new();
        let (passive, active) = start_pair(&driver);
        assert_eq!(status(&driver, passive), PartnerStatus::Linked as i32);
        assert_eq!(status(&driver, active), PartnerStatus::Linked as i32);

        assert_eq!(driver.par_stop(active), OK);
        assert_eq!(status(&driver, active), PartnerStatus::Stopped as i32);
        assert_eq!(status(&driver, passive), PartnerStatus::Waiting as i32);
    }

    #[test]
    fn test_blocking_transfer() {
        let driver = MockDriver::new();
        let (passive, active) = start_pair(&driver);
        assert_eq!(driver.par_b_send(active, 42, b"hello"), OK);

        let mut r_id = 0;
        let mut buf = vec![0u8; 64];
        let mut size = 0;
        assert_eq!(driver.par_b_recv(passive, &mut r_id, &mut buf, &mut size, 100), OK);
        assert_eq!(r_id, 42);
        assert_eq!(&buf[..size as usize], b"hello");

        assert_eq!(
            driver.par_b_recv(passive, &mut r_id, &mut buf, &mut size, 20),
            ERR_PAR_RECV_TIMEOUT
        );
    }

    #[test]
    fn test_send_unlinked_fails() {
        let driver = MockDriver::new();
        let object = driver.par_create(true);
        assert_eq!(driver.par_start(object), OK);
        assert_eq!(driver.par_b_send(object, 1, b"x"), ERR_PAR_NOT_LINKED);
        let mut last = 0;
        driver.par_get_last_error(object, &mut last);
        assert_eq!(last, ERR_PAR_NOT_LINKED);
    }

    #[test]
    fn test_async_send_completes_in_background() {
        let driver = MockDriver::with_completion_delay(Duration::from_millis(30));
        let (_passive, active) = start_pair(&driver);
        assert_eq!(driver.par_as_b_send(active, 7, b"payload"), OK);
        assert_eq!(driver.par_as_b_send(active, 8, b"again"), ERR_PAR_BUSY);

        let mut op_result = -1;
        assert_eq!(driver.par_check_as_b_send_completion(active, &mut op_result), JOB_PENDING);
        assert_eq!(driver.par_wait_as_b_send_completion(active, 1000), OK);
        assert_eq!(driver.par_check_as_b_send_completion(active, &mut op_result), JOB_COMPLETE);
        assert_eq!(op_result, OK);
    }

    #[test]
    fn test_param_defaults_and_rules() {
        let driver = MockDriver::new();
        let object = driver.par_create(false);
        let mut value = ParamValue::U16(0);
        assert_eq!(driver.par_get_param(object, Parameter::RemotePort.number(), &mut value), OK);
        assert_eq!(value, ParamValue::U16(102));
        assert_eq!(
            driver.par_set_param(object, Parameter::RemotePort.number(), &ParamValue::U16(1)),
            ERR_PAR_CANNOT_CHANGE_PARAM
        );
        assert_eq!(
            driver.par_get_param(object, Parameter::MaxClients.number(), &mut value),
            ERR_PAR_INVALID_PARAM_NUMBER
        );
    }

    #[test]
    fn test_unknown_object() {
        let driver = MockDriver::new();
        assert_eq!(driver.par_start(999), INVALID_OBJECT);
        assert_eq!(driver.par_destroy(999), OK);
        assert_eq!(driver.destroy_calls(), 1);
    }

    #[test]
    fn test_forced_allocation_failure() {
        let driver = MockDriver::new();
        driver.set_fail_alloc(true);
        assert_eq!(driver.par_create(false), 0);
        driver.set_fail_alloc(false);
        assert_ne!(driver.par_create(false), 0);
        assert_eq!(driver.live_objects(), 1);
    }

    #[test]
    fn test_error_text_layers() {
        assert_eq!(describe(Role::Partner, ERR_ISO_CONNECT), "ISO : Connection error");
        assert_eq!(
            describe(Role::Partner, ERR_PAR_NOT_LINKED),
            "PAR : Cannot perform, Partner not linked"
        );
        assert_eq!(
            describe(Role::Client, ERR_CLI_JOB_PENDING | ERR_TCP_NOT_CONNECTED),
            "TCP : Socket not connected | CLI : Job pending"
        );
        assert_eq!(describe(Role::Server, ERR_SRV_CANNOT_START), "SRV : Server cannot start");
    }

    #[test]
    fn test_error_text_truncates_into_buffer() {
        let driver = MockDriver::new();
        let mut buf = [0xFFu8; 8];
        assert_eq!(driver.error_text(Role::Partner, ERR_ISO_CONNECT, &mut buf), OK);
        assert_eq!(&buf, b"ISO : C\0");
    }
}
