//! Per-meter request serialization and response hand-off.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::response::Response;

/// Request currently waiting for its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pending {
    pub to_nic_server: bool,
    /// Invoke-id the response should carry, when invoke-ids are in use.
    pub invoke_id: Option<u8>,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Pending>,
    response: Option<Response>,
}

/// One request in flight at a time, and the slot its response lands in.
#[derive(Debug, Default)]
pub(crate) struct Session {
    /// Message count, held for the whole duration of a request.
    requests: Mutex<u64>,
    slot: Mutex<Slot>,
    done: Condvar,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Block until no other request is in flight. The guard derefs to the message count.
    pub fn begin(&self) -> MutexGuard<'_, u64> {
        lock(&self.requests)
    }

    pub fn message_count(&self) -> u64 {
        *lock(&self.requests)
    }

    /// Arm the slot before the request leaves.
    pub fn expect(&self, pending: Pending) {
        let mut slot = lock(&self.slot);
        slot.pending = Some(pending);
        slot.response = None;
    }

    pub fn pending(&self) -> Option<Pending> {
        lock(&self.slot).pending
    }

    /// Hand `response` to the waiting request. `false` when nothing is waiting.
    pub fn complete(&self, response: Response) -> bool {
        let mut slot = lock(&self.slot);
        if slot.pending.take().is_none() {
            return false;
        }
        slot.response = Some(response);
        self.done.notify_all();
        true
    }

    /// Wait for the armed request to complete, a timeout response after `timeout`.
    pub fn wait(&self, timeout: Duration) -> Response {
        let slot = lock(&self.slot);
        let (mut slot, _) = self
            .done
            .wait_timeout_while(slot, timeout, |slot| slot.response.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.pending = None;
        slot.response.take().unwrap_or_else(Response::timeout)
    }

    /// Disarm the slot of a request that could not be sent.
    pub fn abort(&self) {
        let mut slot = lock(&self.slot);
        slot.pending = None;
        slot.response = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use crate::response::ErrorCode;

    #[test]
    fn test_complete_without_request() {
        let session = Session::default();
        assert!(!session.complete(Response::timeout()));
    }

    #[test]
    fn test_response_from_another_thread() {
        let session = Arc::new(Session::default());
        session.expect(Pending { to_nic_server: true, invoke_id: Some(3) });
        assert_eq!(session.pending(), Some(Pending { to_nic_server: true, invoke_id: Some(3) }));

        let remote = Arc::clone(&session);
        let handle = thread::spawn(move || {
            remote.complete(Response::new(ErrorCode::Ok, None, Some(vec![1, 2, 3]), None))
        });

        let response = session.wait(Duration::from_secs(5));
        assert!(handle.join().unwrap());
        assert_eq!(response.error_code, ErrorCode::Ok);
        assert_eq!(session.pending(), None);
    }

    #[test]
    fn test_wait_times_out() {
        let session = Session::default();
        session.expect(Pending { to_nic_server: false, invoke_id: None });

        let response = session.wait(Duration::from_millis(20));

        assert_eq!(response.error_code, ErrorCode::Timeout);
        assert_eq!(session.pending(), None);
        assert!(!session.complete(Response::timeout()));
    }

    #[test]
    fn test_message_count_is_held_by_the_request() {
        let session = Session::default();
        {
            let mut count = session.begin();
            *count += 1;
        }
        assert_eq!(session.message_count(), 1);
    }
}
