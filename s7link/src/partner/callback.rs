//! Completion callbacks.
//!
//! The driver calls [`on_send_complete`] / [`on_recv_complete`] from its own
//! threads with a pointer to the endpoint's [`Shared`] state. They record the
//! completion and post a [`Notice`] to the endpoint's dispatcher thread, which
//! runs the user's handler. User code never runs on a driver thread.

use std::collections::VecDeque;
use std::ffi::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use super::slot::SendSlot;
use super::{ReceivedBlock, RecvCompletion, SendCompletion};
use crate::codes;
use crate::error::Result;

pub(crate) type SendHandler = Arc<dyn Fn(SendCompletion) + Send + Sync>;
pub(crate) type RecvHandler = Arc<dyn Fn(RecvCompletion) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Handlers {
    pub(crate) send: Option<SendHandler>,
    pub(crate) recv: Option<RecvHandler>,
}

#[derive(Debug)]
pub(crate) enum Notice {
    Send(SendCompletion),
    Recv(RecvCompletion),
}

struct Dispatcher {
    tx: Sender<Notice>,
    thread: JoinHandle<()>,
}

/// State reachable from driver threads. The driver holds a raw pointer to
/// it for as long as callbacks are registered, so it must outlive the native
/// object.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) send: Mutex<SendSlot>,
    backlog: Mutex<VecDeque<ReceivedBlock>>,
    pub(crate) handlers: RwLock<Handlers>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl Shared {
    pub(crate) fn usr_ptr(self: &Arc<Self>) -> *mut c_void {
        Arc::as_ptr(self).cast_mut().cast::<c_void>()
    }

    /// Oldest block received while no handler was registered.
    pub(crate) fn take_backlog(&self) -> Option<ReceivedBlock> {
        self.backlog.lock().pop_front()
    }

    /// Start the dispatcher thread if it is not running yet.
    pub(crate) fn ensure_dispatcher(self: &Arc<Self>) -> Result<()> {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return Ok(());
        }
        let (tx, rx) = mpsc::channel::<Notice>();
        let shared = Arc::downgrade(self);
        let thread = thread::Builder::new()
            .name("s7link-dispatch".to_string())
            .spawn(move || run_dispatcher(shared, rx))?;
        tracing::debug!("callback dispatcher started");
        *dispatcher = Some(Dispatcher { tx, thread });
        Ok(())
    }

    /// Stop the dispatcher after it has drained queued notices.
    pub(crate) fn shutdown(&self) {
        self.send.lock().abort();
        let Some(Dispatcher { tx, thread: handle }) = self.dispatcher.lock().take() else {
            return;
        };
        drop(tx);
        // Destroy can run inside a handler; the thread then ends on its own.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::warn!("callback dispatcher panicked");
        }
        tracing::debug!("callback dispatcher stopped");
    }

    fn post(&self, notice: Notice) -> Result<(), Notice> {
        match self.dispatcher.lock().as_ref() {
            Some(dispatcher) => dispatcher.tx.send(notice).map_err(|err| err.0),
            None => Err(notice),
        }
    }

    fn send_completed(&self, code: i32) {
        let Some((r_id, code)) = self.send.lock().notify(code) else {
            tracing::warn!("dropping send completion {code:#x}: nothing pending");
            return;
        };
        if self.post(Notice::Send(SendCompletion { r_id, code })).is_err() {
            tracing::debug!("send completion recorded without dispatcher");
        }
    }

    fn recv_completed(&self, completion: RecvCompletion) {
        if self.handlers.read().recv.is_none() {
            self.keep(completion);
            return;
        }
        if let Err(Notice::Recv(completion)) = self.post(Notice::Recv(completion)) {
            self.keep(completion);
        }
    }

    /// Queue a received block for the next poll or blocking receive.
    fn keep(&self, completion: RecvCompletion) {
        if completion.code == codes::OK {
            self.backlog.lock().push_back(completion.block);
        } else {
            tracing::warn!("dropping failed receive completion {:#x}", completion.code);
        }
    }

    fn dispatch(&self, notice: Notice) {
        match notice {
            Notice::Send(completion) => {
                let handler = self.handlers.read().send.clone();
                if let Some(handler) = handler {
                    run_handler("send", || handler(completion));
                }
            }
            Notice::Recv(completion) => {
                let handler = self.handlers.read().recv.clone();
                match handler {
                    Some(handler) => run_handler("receive", || handler(completion)),
                    // Cleared after the completion was posted.
                    None => self.keep(completion),
                }
            }
        }
    }
}

fn run_dispatcher(shared: Weak<Shared>, rx: mpsc::Receiver<Notice>) {
    while let Ok(notice) = rx.recv() {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.dispatch(notice);
    }
}

fn run_handler(kind: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!("{kind} handler panicked");
    }
}

/// Registered with the driver as the send-completion callback.
///
/// # Safety
///
/// `usr_ptr` must come from [`Shared::usr_ptr`] on a `Shared` that is still
/// alive.
pub(crate) unsafe extern "system" fn on_send_complete(usr_ptr: *mut c_void, op_result: c_int) {
    let shared = unsafe { &*usr_ptr.cast_const().cast::<Shared>() };
    shared.send_completed(op_result);
}

/// Registered with the driver as the receive callback.
///
/// # Safety
///
/// As [`on_send_complete`]; `data` must point to `size` readable bytes.
pub(crate) unsafe extern "system" fn on_recv_complete(
    usr_ptr: *mut c_void,
    op_result: c_int,
    r_id: u32,
    data: *mut c_void,
    size: c_int,
) {
    let shared = unsafe { &*usr_ptr.cast_const().cast::<Shared>() };
    let data = match usize::try_from(size) {
        Ok(len) if len > 0 && !data.is_null() => {
            unsafe { std::slice::from_raw_parts(data.cast_const().cast::<u8>(), len) }.to_vec()
        }
        _ => Vec::new(),
    };
    shared.recv_completed(RecvCompletion {
        code: op_result,
        block: ReceivedBlock { r_id, data },
    });
}
