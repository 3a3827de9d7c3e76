//! Per-context heap bookkeeping
//!
//! Objects are reference counted. The heap keeps a weak handle to every
//! allocation so that teardown can empty each object and break cycles,
//! and charges allocation sizes against the runtime's budget.

use crate::runtime::RuntimeShared;
use crate::value::{Object, ObjectKind, ObjectRef};
use std::cell::RefCell;
use std::rc::Weak;
use std::sync::Arc;

const INITIAL_PRUNE_AT: usize = 1024;

pub(crate) struct Heap {
    objects: Vec<Weak<RefCell<Object>>>,
    prune_at: usize,
    charged: usize,
    exhausted: bool,
    shared: Arc<RuntimeShared>,
}

impl Heap {
    pub(crate) fn new(shared: Arc<RuntimeShared>) -> Self {
        Self {
            objects: Vec::new(),
            prune_at: INITIAL_PRUNE_AT,
            charged: 0,
            exhausted: false,
            shared,
        }
    }

    pub(crate) fn allocate(&mut self, object: Object) -> ObjectRef {
        let bytes = object.estimated_size();
        let object = ObjectRef::from_object(object);
        self.objects.push(object.downgrade());
        if self.objects.len() >= self.prune_at {
            self.objects.retain(|weak| weak.strong_count() > 0);
            self.prune_at = (self.objects.len() * 2).max(INITIAL_PRUNE_AT);
        }
        self.charge(bytes);
        object
    }

    pub(crate) fn charge(&mut self, bytes: usize) {
        self.charged += bytes;
        if !self.shared.charge(bytes) {
            self.exhausted = true;
        }
    }

    /// Whether the budget was exceeded since the last call
    pub(crate) fn take_exhausted(&mut self) -> bool {
        std::mem::take(&mut self.exhausted)
    }

    pub(crate) fn charged(&self) -> usize {
        self.charged
    }

    pub(crate) fn live_objects(&self) -> usize {
        self.objects.iter().filter(|weak| weak.strong_count() > 0).count()
    }

    /// Empty every live object and return the charged bytes to the runtime
    pub(crate) fn teardown(&mut self) {
        for weak in std::mem::take(&mut self.objects) {
            let Some(cell) = weak.upgrade() else { continue };
            let contents = match cell.try_borrow_mut() {
                Ok(mut object) => Some((
                    std::mem::take(&mut object.props),
                    std::mem::replace(&mut object.kind, ObjectKind::Ordinary),
                    object.proto.take(),
                )),
                Err(_) => None,
            };
            // Dropped after the borrow ends; may free further objects
            drop(contents);
        }
        self.shared.release(self.charged);
        self.charged = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Runtime, RuntimeOptions};
    use crate::value::Value;

    #[test]
    fn test_teardown_breaks_cycles() {
        let runtime = Runtime::new(RuntimeOptions::default()).unwrap();
        let mut heap = Heap::new(runtime.shared().clone());

        let a = heap.allocate(Object::new(ObjectKind::Ordinary, None));
        let b = heap.allocate(Object::new(ObjectKind::Ordinary, Some(a.clone())));
        a.set_own("peer", Value::Object(b.clone()));

        let weak = a.downgrade();
        drop(a);
        drop(b);
        assert_eq!(heap.live_objects(), 2);
        assert!(runtime.heap_usage() > 0);

        heap.teardown();
        assert!(weak.upgrade().is_none());
        assert_eq!(runtime.heap_usage(), 0);
    }

    #[test]
    fn test_exhaustion_flag() {
        let runtime = Runtime::new(RuntimeOptions {
            memory_limit: Some(crate::runtime::MIN_HEAP_BYTES),
            ..Default::default()
        })
        .unwrap();
        let mut heap = Heap::new(runtime.shared().clone());
        heap.charge(crate::runtime::MIN_HEAP_BYTES + 1);
        assert!(heap.take_exhausted());
        assert!(!heap.take_exhausted());
        heap.teardown();
    }
}
