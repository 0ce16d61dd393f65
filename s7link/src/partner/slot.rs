//! Asynchronous send bookkeeping.
//!
//! ```text
//! Idle | Completed | Aborted --begin--> Pending --complete--> Completed
//!                                      Pending --abort-----> Aborted
//! ```
//!
//! Settling (by poll or wait) and notifying the handler are tracked apart:
//! whichever side sees the result first, the handler is notified once.

use std::sync::Arc;

use crate::codes;
use crate::error::{Direction, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendState {
    Idle,
    Pending { r_id: u32 },
    /// Finished with the driver's result code. `notified` once the send
    /// handler has been handed the completion.
    Completed { r_id: u32, code: i32, notified: bool },
    /// Invalidated by `stop` before it finished.
    Aborted { r_id: u32 },
}

#[derive(Debug)]
pub(crate) struct SendSlot {
    state: SendState,
    // The driver may read the buffer until the job completes, so it lives
    // until the next job replaces it.
    payload: Option<Arc<[u8]>>,
}

impl Default for SendSlot {
    fn default() -> Self {
        Self {
            state: SendState::Idle,
            payload: None,
        }
    }
}

impl SendSlot {
    pub(crate) fn state(&self) -> SendState {
        self.state
    }

    /// Reserve the slot for a new job. Returns the state to restore if the
    /// driver refuses it.
    pub(crate) fn begin(&mut self, r_id: u32, payload: Arc<[u8]>) -> Result<SendState> {
        if let SendState::Pending { .. } = self.state {
            return Err(Error::OperationPending(Direction::Send));
        }
        let previous = self.state;
        self.state = SendState::Pending { r_id };
        self.payload = Some(payload);
        Ok(previous)
    }

    pub(crate) fn restore(&mut self, previous: SendState) {
        self.state = previous;
    }

    /// Record the result of the pending job without notifying anyone.
    fn complete(&mut self, code: i32) {
        if let SendState::Pending { r_id } = self.state {
            self.state = SendState::Completed {
                r_id,
                code,
                notified: false,
            };
        }
    }

    /// Record the result reported by the driver's callback and mark it
    /// notified. Returns the reference id and the recorded code, or `None`
    /// when there is nothing left to notify.
    pub(crate) fn notify(&mut self, code: i32) -> Option<(u32, i32)> {
        match self.state {
            SendState::Pending { r_id } => {
                self.state = SendState::Completed {
                    r_id,
                    code,
                    notified: true,
                };
                Some((r_id, code))
            }
            SendState::Completed {
                r_id,
                code: recorded,
                notified: false,
            } => {
                self.state = SendState::Completed {
                    r_id,
                    code: recorded,
                    notified: true,
                };
                Some((r_id, recorded))
            }
            _ => None,
        }
    }

    /// Settle the slot with `code` unless it already holds a result, and
    /// return the result it holds afterwards.
    pub(crate) fn settle(&mut self, code: i32) -> i32 {
        self.complete(code);
        match self.state {
            SendState::Completed { code, .. } => code,
            SendState::Aborted { .. } => codes::ERR_PAR_NOT_LINKED,
            SendState::Idle | SendState::Pending { .. } => code,
        }
    }

    pub(crate) fn abort(&mut self) {
        if let SendState::Pending { r_id } = self.state {
            self.state = SendState::Aborted { r_id };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Arc<[u8]> {
        Arc::from(&b"abc"[..])
    }

    #[test]
    fn test_begin_rejects_second_job() {
        let mut slot = SendSlot::default();
        assert_eq!(slot.begin(1, payload()).unwrap(), SendState::Idle);
        assert!(matches!(
            slot.begin(2, payload()),
            Err(Error::OperationPending(Direction::Send))
        ));
        assert_eq!(slot.state(), SendState::Pending { r_id: 1 });
    }

    #[test]
    fn test_first_result_wins() {
        let mut slot = SendSlot::default();
        slot.begin(7, payload()).unwrap();
        assert_eq!(slot.notify(0), Some((7, 0)));
        assert_eq!(slot.notify(codes::ERR_PAR_SEND_TIMEOUT), None);
        assert_eq!(slot.settle(codes::ERR_PAR_BUSY), 0);
        assert_eq!(
            slot.state(),
            SendState::Completed { r_id: 7, code: 0, notified: true }
        );
    }

    #[test]
    fn test_settled_by_poll_still_notifies_once() {
        let mut slot = SendSlot::default();
        slot.begin(9, payload()).unwrap();
        assert_eq!(slot.settle(0), 0);
        assert_eq!(
            slot.state(),
            SendState::Completed { r_id: 9, code: 0, notified: false }
        );
        // The late callback keeps the recorded result.
        assert_eq!(slot.notify(codes::ERR_PAR_BUSY), Some((9, 0)));
        assert_eq!(slot.notify(0), None);
        assert_eq!(slot.settle(codes::ERR_PAR_BUSY), 0);
    }

    #[test]
    fn test_aborted_job_is_not_notified() {
        let mut slot = SendSlot::default();
        slot.begin(2, payload()).unwrap();
        slot.abort();
        assert_eq!(slot.notify(0), None);
    }

    #[test]
    fn test_abort_reports_not_linked() {
        let mut slot = SendSlot::default();
        slot.begin(3, payload()).unwrap();
        slot.abort();
        assert_eq!(slot.state(), SendState::Aborted { r_id: 3 });
        assert_eq!(slot.settle(0), codes::ERR_PAR_NOT_LINKED);
        // A new job may start after an abort.
        assert_eq!(slot.begin(4, payload()).unwrap(), SendState::Aborted { r_id: 3 });
    }

    #[test]
    fn test_restore_after_refusal() {
        let mut slot = SendSlot::default();
        let previous = slot.begin(9, payload()).unwrap();
        slot.restore(previous);
        assert_eq!(slot.state(), SendState::Idle);
    }
}
