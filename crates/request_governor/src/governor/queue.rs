use std::collections::VecDeque;

use tokio::sync::oneshot;

/// A request that was denied immediate admission and waits for a slot.
#[derive(Debug)]
pub(crate) struct RequestSlot {
    seq: u64,
    dispatch: oneshot::Sender<()>,
}

impl RequestSlot {
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// The waiting caller dropped its admission future.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.dispatch.is_closed()
    }

    /// Wakes the waiting caller. Returns `false` if nobody was listening.
    pub(crate) fn dispatch(self) -> bool {
        self.dispatch.send(()).is_ok()
    }
}

/// FIFO of [`RequestSlot`]s. Only the dispatch scheduler pops from the head.
#[derive(Debug, Default)]
pub(crate) struct AdmissionQueue {
    slots: VecDeque<RequestSlot>,
    next_seq: u64,
}

impl AdmissionQueue {
    /// Appends a slot at the tail and returns the receiving end that resolves
    /// when the slot is dispatched.
    pub(crate) fn enqueue(&mut self) -> (u64, oneshot::Receiver<()>) {
        let (dispatch, rx) = oneshot::channel();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push_back(RequestSlot { seq, dispatch });
        (seq, rx)
    }

    pub(crate) fn front(&self) -> Option<&RequestSlot> {
        self.slots.front()
    }

    pub(crate) fn pop_front(&mut self) -> Option<RequestSlot> {
        self.slots.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_enqueue_order() {
        let mut queue = AdmissionQueue::default();
        let receivers: Vec<_> = (0..3).map(|_| queue.enqueue()).collect();

        assert_eq!(queue.len(), 3);
        let order: Vec<u64> = std::iter::from_fn(|| queue.pop_front().map(|slot| slot.seq())).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(queue.is_empty());
        drop(receivers);
    }

    #[test]
    fn dropped_receiver_marks_slot_abandoned() {
        let mut queue = AdmissionQueue::default();
        let (_, rx) = queue.enqueue();
        let (_, kept) = queue.enqueue();
        drop(rx);

        let abandoned = queue.pop_front().unwrap();
        assert!(abandoned.is_abandoned());
        assert!(!abandoned.dispatch());

        let live = queue.pop_front().unwrap();
        assert!(!live.is_abandoned());
        assert!(live.dispatch());
        drop(kept);
    }

    #[tokio::test]
    async fn dispatch_resolves_the_waiter() {
        let mut queue = AdmissionQueue::default();
        let (seq, rx) = queue.enqueue();
        assert_eq!(seq, 0);

        assert!(queue.front().is_some());
        queue.pop_front().unwrap().dispatch();
        assert!(rx.await.is_ok());
    }
}
