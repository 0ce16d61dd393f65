//! The partner endpoint: one peer object inside the driver, exchanging data
//! blocks with a remote peer.
//!
//! A [`Partner`] owns exactly one native object from construction until
//! [`Partner::destroy`] (or drop). Every result code the driver returns goes
//! through the partner's [`ErrorTranslator`]: soft status comes back as
//! [`Status::SoftStatus`], hard errors as [`Error::Driver`].
//!
//! At most one asynchronous send is in flight per partner. Its completion can
//! be observed by polling ([`Partner::check_as_b_send_completion`]), by a
//! bounded wait ([`Partner::wait_as_b_send_completion`]) or by a handler
//! ([`Partner::set_send_callback`]); all three see the same result.
//!
//! The receive side is passive: the driver takes incoming blocks on its own.
//! Each block is handed out once, to the receive handler when one is
//! registered, otherwise to the next [`Partner::check_as_b_recv_completion`]
//! or [`Partner::b_recv`].

use std::ffi::CString;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;

mod callback;
mod slot;
mod status;

pub use status::{PartnerStats, PartnerStatus, PartnerTimes};

use self::callback::Shared;
use self::slot::SendState;
use crate::codes;
use crate::driver::{self, Driver, RawObject, MAX_BLOCK_SIZE};
use crate::error::{Direction, Error, Result};
use crate::params::{ParamValue, Parameter};
use crate::translator::{ErrorTranslator, Role, Status};

/// A data block received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedBlock {
    /// Reference id chosen by the sender.
    pub r_id: u32,
    pub data: Vec<u8>,
}

/// Handed to the send handler when an asynchronous send finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendCompletion {
    pub r_id: u32,
    /// Raw driver result; 0 on success.
    pub code: i32,
}

impl SendCompletion {
    pub fn is_ok(&self) -> bool {
        self.code == codes::OK
    }
}

/// Handed to the receive handler for every incoming block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecvCompletion {
    pub code: i32,
    pub block: ReceivedBlock,
}

impl RecvCompletion {
    pub fn is_ok(&self) -> bool {
        self.code == codes::OK
    }
}

pub struct Partner {
    handle: RwLock<Option<RawObject>>,
    active: bool,
    driver: Arc<dyn Driver>,
    translator: ErrorTranslator,
    shared: Arc<Shared>,
}

impl fmt::Debug for Partner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partner")
            .field("handle", &*self.handle.read())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Partner {
    /// Create a partner on the process-wide native driver, loading it
    /// first if needed.
    ///
    /// An active partner connects to its peer; a passive one waits for the
    /// peer to connect.
    pub fn new(active: bool) -> Result<Self> {
        Self::with_driver(driver::loader::driver()?, active)
    }

    pub fn with_driver(driver: Arc<dyn Driver>, active: bool) -> Result<Self> {
        let object = driver.par_create(active);
        if object == 0 {
            return Err(Error::AllocationFailed);
        }
        tracing::debug!("partner {object:#x} created (active: {active})");
        Ok(Self {
            handle: RwLock::new(Some(object)),
            active,
            translator: ErrorTranslator::new(Arc::clone(&driver), Role::Partner),
            driver,
            shared: Arc::new(Shared::default()),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_alive(&self) -> bool {
        self.handle.read().is_some()
    }

    /// The driver's text for `code` in the partner context.
    pub fn error_text(&self, code: i32) -> String {
        self.translator.error_text(code)
    }

    /// Run `f` on the live object. The handle stays locked for reading
    /// until `f` returns, so destroy can't free it underneath.
    fn with_object<T>(&self, f: impl FnOnce(RawObject) -> Result<T>) -> Result<T> {
        let handle = self.handle.read();
        let object = (*handle).ok_or(Error::EndpointDestroyed)?;
        f(object)
    }

    /// Free the native object. Calling it again, or dropping the partner
    /// afterwards, does nothing.
    pub fn destroy(&self) -> Result<()> {
        let Some(object) = self.handle.write().take() else {
            return Ok(());
        };
        let code = self.driver.par_destroy(object);
        tracing::debug!("partner {object:#x} destroyed");
        // No callback can fire once the native object is gone.
        self.shared.shutdown();
        self.translator.check(code).map(drop)
    }

    /// The driver's last internal error code, unclassified.
    pub fn last_error(&self) -> Result<i32> {
        self.with_object(|object| {
            let mut last_error = 0;
            self.translator
                .check(self.driver.par_get_last_error(object, &mut last_error))?;
            Ok(last_error)
        })
    }

    /// Start with the addresses configured by an earlier
    /// [`start_to`](Self::start_to).
    pub fn start(&self) -> Result<Status> {
        self.with_object(|object| {
            tracing::debug!("partner {object:#x} start");
            self.translator.check(self.driver.par_start(object))
        })
    }

    /// Bind to `local_address` and link with the peer at `remote_address`.
    ///
    /// Addresses are dotted-quad IPv4, or empty to leave one unset.
    pub fn start_to(
        &self,
        local_address: &str,
        remote_address: &str,
        local_tsap: u16,
        remote_tsap: u16,
    ) -> Result<Status> {
        self.with_object(|object| {
            let local = self.address(local_address)?;
            let remote = self.address(remote_address)?;
            tracing::debug!(
                "partner {object:#x} start_to {local_address:?} -> {remote_address:?} \
                 (tsap {local_tsap:#06x}/{remote_tsap:#06x})"
            );
            self.translator.check(
                self.driver
                    .par_start_to(object, &local, &remote, local_tsap, remote_tsap),
            )
        })
    }

    fn address(&self, address: &str) -> Result<CString> {
        if !address.is_empty() && address.parse::<Ipv4Addr>().is_err() {
            tracing::debug!("rejecting partner address {address:?}");
            return Err(self.translator.hard_error(codes::ERR_PAR_INVALID_PARAMS));
        }
        CString::new(address).map_err(|_| self.translator.hard_error(codes::ERR_PAR_INVALID_PARAMS))
    }

    /// Stop the partner. A pending asynchronous send is invalidated and
    /// reports a not-linked error from then on.
    pub fn stop(&self) -> Result<Status> {
        self.with_object(|object| {
            tracing::debug!("partner {object:#x} stop");
            let code = self.driver.par_stop(object);
            self.shared.send.lock().abort();
            self.translator.check(code)
        })
    }

    /// Send a block and wait for the peer to take it.
    pub fn b_send(&self, r_id: u32, data: &[u8]) -> Result<Status> {
        self.with_object(|object| {
            self.translator
                .check(self.driver.par_b_send(object, r_id, data))
        })
    }

    /// Start sending a block and return at once.
    ///
    /// Fails with [`Error::OperationPending`] while an earlier send is still
    /// in flight.
    pub fn as_b_send(&self, r_id: u32, data: &[u8]) -> Result<Status> {
        self.with_object(|object| {
            let payload: Arc<[u8]> = Arc::from(data);
            let previous = self.shared.send.lock().begin(r_id, Arc::clone(&payload))?;
            // The slot lock is released: the driver may complete the job
            // on its own thread before this call returns.
            let code = self.driver.par_as_b_send(object, r_id, &payload);
            self.translator.check(code).inspect_err(|_| {
                self.shared.send.lock().restore(previous);
            })
        })
    }

    /// Result of the pending asynchronous send if it has finished.
    ///
    /// `Ok(None)` while it is in flight.
    pub fn check_as_b_send_completion(&self) -> Result<Option<Status>> {
        self.with_object(|object| {
            if let Some(done) = self.settled_send()? {
                return done.map(Some);
            }
            let mut op_result = codes::OK;
            let status = self.translator.check(
                self.driver
                    .par_check_as_b_send_completion(object, &mut op_result),
            )?;
            if status.is_in_progress() {
                return Ok(None);
            }
            let code = self.shared.send.lock().settle(op_result);
            self.translator.check(code).map(Some)
        })
    }

    /// Wait up to `timeout_ms` for the pending asynchronous send.
    ///
    /// On [`Error::Timeout`] the send is still pending and can be waited on
    /// again.
    pub fn wait_as_b_send_completion(&self, timeout_ms: u32) -> Result<Status> {
        self.with_object(|object| {
            if let Some(done) = self.settled_send()? {
                return done;
            }
            let waited = self.driver.par_wait_as_b_send_completion(object, timeout_ms);
            tracing::trace!("partner {object:#x} wait returned {waited:#x}");
            let mut op_result = codes::OK;
            let status = self.translator.check(
                self.driver
                    .par_check_as_b_send_completion(object, &mut op_result),
            )?;
            if status.is_in_progress() {
                // Stopped while waiting.
                if let SendState::Aborted { .. } = self.shared.send.lock().state() {
                    return Err(self.translator.hard_error(codes::ERR_PAR_NOT_LINKED));
                }
                return Err(Error::Timeout { timeout_ms });
            }
            let code = self.shared.send.lock().settle(op_result);
            self.translator.check(code)
        })
    }

    /// The recorded result, if the slot already holds one.
    fn settled_send(&self) -> Result<Option<Result<Status>>> {
        let state = self.shared.send.lock().state();
        match state {
            SendState::Idle => Err(Error::NoPendingOperation(Direction::Send)),
            SendState::Pending { .. } => Ok(None),
            SendState::Completed { code, .. } => Ok(Some(self.translator.check(code))),
            SendState::Aborted { .. } => Ok(Some(Err(self
                .translator
                .hard_error(codes::ERR_PAR_NOT_LINKED)))),
        }
    }

    /// Wait up to `timeout_ms` for a block from the peer.
    pub fn b_recv(&self, timeout_ms: u32) -> Result<ReceivedBlock> {
        self.with_object(|object| {
            if let Some(block) = self.shared.take_backlog() {
                return Ok(block);
            }
            let mut r_id = 0;
            let mut size = 0;
            let mut buf = vec![0u8; MAX_BLOCK_SIZE];
            let code = self
                .driver
                .par_b_recv(object, &mut r_id, &mut buf, &mut size, timeout_ms);
            if code == codes::ERR_PAR_RECV_TIMEOUT {
                return Err(Error::Timeout { timeout_ms });
            }
            self.translator.check(code)?;
            Ok(received(r_id, buf, size))
        })
    }

    /// Take a block the driver has received, if there is one.
    pub fn check_as_b_recv_completion(&self) -> Result<Option<ReceivedBlock>> {
        self.with_object(|object| {
            if let Some(block) = self.shared.take_backlog() {
                return Ok(Some(block));
            }
            let mut op_result = codes::OK;
            let mut r_id = 0;
            let mut size = 0;
            let mut buf = vec![0u8; MAX_BLOCK_SIZE];
            let status = self.translator.check(self.driver.par_check_as_b_recv_completion(
                object,
                &mut op_result,
                &mut r_id,
                &mut buf,
                &mut size,
            ))?;
            if status.is_in_progress() {
                return Ok(None);
            }
            self.translator.check(op_result)?;
            Ok(Some(received(r_id, buf, size)))
        })
    }

    /// Run `handler` on the dispatcher thread whenever an asynchronous send
    /// finishes. Replaces any earlier handler.
    pub fn set_send_callback<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(SendCompletion) + Send + Sync + 'static,
    {
        self.with_object(|object| {
            self.shared.ensure_dispatcher()?;
            let code = unsafe {
                self.driver.par_set_send_callback(
                    object,
                    Some(callback::on_send_complete),
                    self.shared.usr_ptr(),
                )
            };
            self.translator.check(code)?;
            self.shared.handlers.write().send = Some(Arc::new(handler));
            tracing::debug!("partner {object:#x} send callback set");
            Ok(())
        })
    }

    /// Run `handler` on the dispatcher thread for every block received.
    /// Replaces any earlier handler.
    pub fn set_recv_callback<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(RecvCompletion) + Send + Sync + 'static,
    {
        self.with_object(|object| {
            self.shared.ensure_dispatcher()?;
            let code = unsafe {
                self.driver.par_set_recv_callback(
                    object,
                    Some(callback::on_recv_complete),
                    self.shared.usr_ptr(),
                )
            };
            self.translator.check(code)?;
            self.shared.handlers.write().recv = Some(Arc::new(handler));
            tracing::debug!("partner {object:#x} recv callback set");
            Ok(())
        })
    }

    pub fn clear_send_callback(&self) -> Result<()> {
        self.with_object(|object| {
            self.shared.handlers.write().send = None;
            let code = unsafe {
                self.driver
                    .par_set_send_callback(object, None, std::ptr::null_mut())
            };
            self.translator.check(code).map(drop)
        })
    }

    /// Stop delivering to the receive handler. Blocks received from now on
    /// are picked up by polling or [`b_recv`](Self::b_recv).
    pub fn clear_recv_callback(&self) -> Result<()> {
        self.with_object(|object| {
            self.shared.handlers.write().recv = None;
            let code = unsafe {
                self.driver
                    .par_set_recv_callback(object, None, std::ptr::null_mut())
            };
            self.translator.check(code).map(drop)
        })
    }

    pub fn get_param(&self, param: Parameter) -> Result<u32> {
        param.check_readable(Role::Partner)?;
        self.with_object(|object| {
            let mut value = ParamValue::zeroed(param.width());
            self.translator
                .check(self.driver.par_get_param(object, param.number(), &mut value))?;
            value.to_u32().ok_or(Error::InvalidParameter {
                param,
                reason: "driver returned a negative value",
            })
        })
    }

    pub fn set_param(&self, param: Parameter, value: u32) -> Result<()> {
        param.check_writable(Role::Partner)?;
        let value = ParamValue::encode(param, value)?;
        self.with_object(|object| {
            tracing::debug!("partner {object:#x} set {param:?} = {value:?}");
            self.translator
                .check(self.driver.par_set_param(object, param.number(), &value))
                .map(drop)
        })
    }

    pub fn status(&self) -> Result<PartnerStatus> {
        self.with_object(|object| {
            let mut raw = 0;
            self.translator
                .check(self.driver.par_get_status(object, &mut raw))?;
            Ok(PartnerStatus::from_raw(raw))
        })
    }

    pub fn stats(&self) -> Result<PartnerStats> {
        self.with_object(|object| {
            let mut stats = PartnerStats::default();
            self.translator.check(self.driver.par_get_stats(
                object,
                &mut stats.bytes_sent,
                &mut stats.bytes_recv,
                &mut stats.send_errors,
                &mut stats.recv_errors,
            ))?;
            Ok(stats)
        })
    }

    pub fn times(&self) -> Result<PartnerTimes> {
        self.with_object(|object| {
            let mut times = PartnerTimes::default();
            self.translator.check(self.driver.par_get_times(
                object,
                &mut times.send_time,
                &mut times.recv_time,
            ))?;
            Ok(times)
        })
    }
}

fn received(r_id: u32, mut buf: Vec<u8>, size: i32) -> ReceivedBlock {
    let len = usize::try_from(size).unwrap_or(0).min(buf.len());
    buf.truncate(len);
    ReceivedBlock { r_id, data: buf }
}

impl Drop for Partner {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::warn!("partner destroy on drop failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;

    fn partner() -> (Arc<MockDriver>, Partner) {
        let driver = Arc::new(MockDriver::new());
        let partner = Partner::with_driver(driver.clone(), true).unwrap();
        (driver, partner)
    }

    #[test]
    fn test_bad_address_rejected_before_driver() {
        let (_, partner) = partner();
        let err = partner.start_to("10.0.0.300", "10.0.0.2", 0, 0).unwrap_err();
        assert_eq!(err.code(), Some(codes::ERR_PAR_INVALID_PARAMS));
        assert_eq!(partner.status().unwrap(), PartnerStatus::Stopped);
        assert!(partner.start_to("", "", 0, 0).is_ok());
    }

    #[test]
    fn test_destroy_frees_once() {
        let (driver, partner) = partner();
        partner.destroy().unwrap();
        partner.destroy().unwrap();
        assert!(!partner.is_alive());
        drop(partner);
        assert_eq!(driver.destroy_calls(), 1);
        assert_eq!(driver.live_objects(), 0);
    }

    #[test]
    fn test_refused_send_restores_slot() {
        let (_, partner) = partner();
        partner.start().unwrap();
        let err = partner.as_b_send(1, b"data").unwrap_err();
        assert_eq!(err.code(), Some(codes::ERR_PAR_NOT_LINKED));
        assert!(matches!(
            partner.check_as_b_send_completion(),
            Err(Error::NoPendingOperation(Direction::Send))
        ));
    }

    #[test]
    fn test_received_truncates_to_size() {
        let block = received(3, vec![1, 2, 3, 4], 2);
        assert_eq!(block.data, vec![1, 2]);
        assert_eq!(received(3, vec![1], -5).data, Vec::<u8>::new());
    }
}
