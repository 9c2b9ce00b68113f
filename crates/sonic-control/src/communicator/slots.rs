use std::collections::HashMap;

use sonic_protocol::RequestId;
use tokio::sync::oneshot;

use crate::error::{CommunicatorError, CommunicatorResult};

type Slot = oneshot::Sender<CommunicatorResult<String>>;

/// Pending requests keyed by request id.
///
/// Ids run from 1 up to the limit and then wrap to 1. An id that still has
/// a pending slot is never handed out twice.
#[derive(Debug)]
pub struct SlotTable {
    next_id: RequestId,
    limit: RequestId,
    slots: HashMap<RequestId, Slot>,
}

impl SlotTable {
    pub fn new(limit: RequestId) -> Self {
        SlotTable {
            next_id: 1,
            limit: limit.max(1),
            slots: HashMap::new(),
        }
    }

    /// Install a slot under a fresh id.
    pub fn mint(&mut self, slot: Slot) -> CommunicatorResult<RequestId> {
        if self.slots.len() as u64 >= u64::from(self.limit) {
            return Err(CommunicatorError::SlotsExhausted);
        }
        loop {
            let id = self.next_id;
            self.next_id = if id >= self.limit { 1 } else { id + 1 };
            if !self.slots.contains_key(&id) {
                self.slots.insert(id, slot);
                return Ok(id);
            }
        }
    }

    /// Complete the slot for `id`. Returns `false` if there is none.
    pub fn fulfil(&mut self, id: RequestId, body: String) -> bool {
        match self.slots.remove(&id) {
            Some(slot) => {
                // The waiter may have given up in the meantime.
                let _ = slot.send(Ok(body));
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: RequestId) -> bool {
        self.slots.remove(&id).is_some()
    }

    /// Fail every pending request with the error `cause` makes.
    pub fn fail_all(&mut self, cause: impl Fn() -> CommunicatorError) -> usize {
        let count = self.slots.len();
        for (_, slot) in self.slots.drain() {
            let _ = slot.send(Err(cause()));
        }
        count
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
