//! Array methods.
//!
//! `splice`, `shift` and `unshift` run as bulk operations: the per-cell
//! writes they make are buffered and the caller's listeners first see one
//! composite event, then the buffered cell events. `push`, `pop` and
//! `set_len` are plain sequences of writes.
//!
//! Every algorithm goes through the wrapper's own traps, so blocking,
//! stopping, wrapping and detaching behave as for direct writes.

use crate::dispatch::emit_function_event;
use crate::error::ProxserveError;
use crate::events::{EventType, MethodArgs};
use crate::nodes::{DataId, NodeStatus};
use crate::unwrap::deep_unwrap;
use crate::value::{Array, Target, Value, MAX_ARRAY_INDEX};
use crate::wrapper::Proxy;

/// Array methods that are reported as one composite event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMethod {
    Splice,
    Shift,
    Unshift,
}

impl ArrayMethod {
    pub fn name(self) -> &'static str {
        match self {
            ArrayMethod::Splice => "splice",
            ArrayMethod::Shift => "shift",
            ArrayMethod::Unshift => "unshift",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "splice" => Some(ArrayMethod::Splice),
            "shift" => Some(ArrayMethod::Shift),
            "unshift" => Some(ArrayMethod::Unshift),
            _ => None,
        }
    }

    fn event_type(self) -> EventType {
        match self {
            ArrayMethod::Splice => EventType::Splice,
            ArrayMethod::Shift => EventType::Shift,
            ArrayMethod::Unshift => EventType::Unshift,
        }
    }
}

fn unwrap_items<I>(items: I) -> Result<Vec<Value>, ProxserveError>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    items.into_iter().map(|item| deep_unwrap(item.into())).collect()
}

impl Proxy {
    fn array_target(&self, method: &'static str) -> Result<(Array, DataId), ProxserveError> {
        match self.target_and_data()? {
            (Target::Array(array), data) => Ok((array, data)),
            (Target::Object(_), _) => Err(ProxserveError::NotAnArray { method }),
        }
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    /// Returns the removed raw values. `start` and `delete_count` are
    /// clamped to the array.
    pub fn splice<I>(
        &self,
        start: usize,
        delete_count: usize,
        items: I,
    ) -> Result<Vec<Value>, ProxserveError>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = unwrap_items(items)?;
        let args = MethodArgs::Splice {
            start,
            delete_count,
            items: items.clone(),
        };
        self.bulk(ArrayMethod::Splice, args, move |proxy| {
            proxy.native_splice(start, delete_count, items)
        })
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Value, ProxserveError> {
        self.bulk(ArrayMethod::Shift, MethodArgs::Shift, Proxy::native_shift)
    }

    /// Insert `items` at the front. Returns the new length.
    pub fn unshift<I>(&self, items: I) -> Result<usize, ProxserveError>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let items = unwrap_items(items)?;
        let args = MethodArgs::Unshift {
            items: items.clone(),
        };
        self.bulk(ArrayMethod::Unshift, args, move |proxy| proxy.native_unshift(items))
    }

    /// Append `items`, one `create` per element. Returns the new length.
    pub fn push<I>(&self, items: I) -> Result<usize, ProxserveError>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let (array, _) = self.array_target("push")?;
        let items = unwrap_items(items)?;
        let len = array.len();
        let count = items.len();
        for (offset, item) in items.into_iter().enumerate() {
            self.set(len + offset, item)?;
        }
        self.set_len(len + count)?;
        Ok(len + count)
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Value, ProxserveError> {
        let (array, _) = self.array_target("pop")?;
        let len = array.len();
        if len == 0 {
            self.set_len(0)?;
            return Ok(Value::Undefined);
        }
        let last = array.get(len - 1);
        self.delete(len - 1)?;
        self.set_len(len - 1)?;
        Ok(last)
    }

    /// Truncate or extend with holes. Truncated elements are detached
    /// without events.
    ///
    /// # Errors
    ///
    /// [`ProxserveError::InvalidIndex`] when `len` exceeds
    /// `MAX_ARRAY_INDEX + 1`.
    pub fn set_len(&self, len: usize) -> Result<(), ProxserveError> {
        self.engine.run_due_destroys();
        let (array, data) = self.array_target("length")?;
        if len > MAX_ARRAY_INDEX + 1 {
            return Err(ProxserveError::InvalidIndex(len.to_string()));
        }
        if self.is_blocked(data, "length") {
            return Ok(());
        }
        for index in len..array.len() {
            self.engine.detach_child(self.id, &index.to_string());
        }
        array.items_mut().resize(len, Value::Undefined);
        Ok(())
    }

    fn bulk<R>(
        &self,
        method: ArrayMethod,
        args: MethodArgs,
        op: impl FnOnce(&Proxy) -> Result<R, ProxserveError>,
    ) -> Result<R, ProxserveError> {
        let (array, data) = self.array_target(method.name())?;
        if self.engine.options.emit_raw_method_events {
            return op(self);
        }
        self.engine.run_due_destroys();

        let own_status = {
            let tree = self.engine.tree.borrow();
            (tree.status(data) == NodeStatus::Active).then(|| tree.data(data).status)
        };
        let Some(own_status) = own_status else {
            return op(self);
        };

        self.engine.tree.borrow_mut().data_mut(data).status = Some(NodeStatus::Splicing);
        let old_value = Value::Array(Array::from_vec(array.to_vec()));
        let result = {
            let _busy = self.engine.enter();
            op(self)
        };
        self.engine.tree.borrow_mut().data_mut(data).status = own_status;

        match result {
            Ok(result) => {
                emit_function_event(
                    &self.engine,
                    data,
                    method.event_type(),
                    args,
                    old_value,
                    Value::Array(array),
                );
                Ok(result)
            }
            Err(err) => {
                self.engine.tree.borrow_mut().data_mut(data).deferred = None;
                Err(err)
            }
        }
    }

    /// Move element `from` to `to`, or clear `to` when `from` is a hole.
    fn move_element(&self, from: usize, to: usize) -> Result<(), ProxserveError> {
        if self.contains_key(from)? {
            let value = self.get(from)?;
            self.set(to, value)
        } else {
            self.delete(to).map(|_| ())
        }
    }

    fn native_splice(
        &self,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, ProxserveError> {
        let (array, _) = self.array_target("splice")?;
        let len = array.len();
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let item_count = items.len();
        let removed: Vec<Value> = (start..start + delete_count).map(|i| array.get(i)).collect();

        if item_count < delete_count {
            for k in start..len - delete_count {
                self.move_element(k + delete_count, k + item_count)?;
            }
            for k in (len - delete_count + item_count..len).rev() {
                self.delete(k)?;
            }
        } else if item_count > delete_count {
            for k in (start..len - delete_count).rev() {
                self.move_element(k + delete_count, k + item_count)?;
            }
        }
        for (offset, item) in items.into_iter().enumerate() {
            self.set(start + offset, item)?;
        }
        self.set_len(len - delete_count + item_count)?;
        Ok(removed)
    }

    fn native_shift(&self) -> Result<Value, ProxserveError> {
        let (array, _) = self.array_target("shift")?;
        let len = array.len();
        if len == 0 {
            self.set_len(0)?;
            return Ok(Value::Undefined);
        }
        let first = array.get(0);
        for k in 1..len {
            self.move_element(k, k - 1)?;
        }
        self.delete(len - 1)?;
        self.set_len(len - 1)?;
        Ok(first)
    }

    fn native_unshift(&self, items: Vec<Value>) -> Result<usize, ProxserveError> {
        let (array, _) = self.array_target("unshift")?;
        let len = array.len();
        let count = items.len();
        if count > 0 {
            for k in (0..len).rev() {
                self.move_element(k, k + count)?;
            }
            for (index, item) in items.into_iter().enumerate() {
                self.set(index, item)?;
            }
        }
        self.set_len(len + count)?;
        Ok(len + count)
    }
}
