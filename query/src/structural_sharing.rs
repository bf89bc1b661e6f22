use std::rc::Rc;

use crate::Value;

// Values are immutable, so they cannot contain cycles. The depth cap only bounds recursion
// on pathological payloads; below it the new subtree is kept as is.
const MAX_DEPTH: usize = 128;

/// Returns `next`, reusing allocations from `prev` for every subtree that is deeply equal.
///
/// If `next` is deeply equal to `prev`, `prev` itself is returned, so identity checks with
/// [`Value::ptr_eq`] succeed and downstream memoization is not defeated.
pub fn replace_equal_deep(prev: &Value, next: Value) -> Value {
    replace(prev, next, 0)
}

fn replace(prev: &Value, next: Value, depth: usize) -> Value {
    if prev.ptr_eq(&next) {
        return prev.clone();
    }
    if depth >= MAX_DEPTH {
        return next;
    }

    match (prev, next) {
        (Value::Array(prev_items), Value::Array(next_items)) => {
            let next_items = Rc::try_unwrap(next_items).unwrap_or_else(|rc| (*rc).clone());
            let mut all_shared = prev_items.len() == next_items.len();
            let items: Vec<Value> = next_items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match prev_items.get(index) {
                    Some(prev_item) => {
                        let item = replace(prev_item, item, depth + 1);
                        all_shared &= prev_item.ptr_eq(&item);
                        item
                    }
                    None => item,
                })
                .collect();
            if all_shared {
                prev.clone()
            } else {
                Value::Array(Rc::new(items))
            }
        }
        (Value::Object(prev_map), Value::Object(next_map)) => {
            let next_map = Rc::try_unwrap(next_map).unwrap_or_else(|rc| (*rc).clone());
            let mut all_shared = prev_map.len() == next_map.len();
            let map = next_map
                .into_iter()
                .map(|(key, value)| match prev_map.get(&key) {
                    Some(prev_value) => {
                        let value = replace(prev_value, value, depth + 1);
                        all_shared &= prev_value.ptr_eq(&value);
                        (key, value)
                    }
                    None => {
                        all_shared = false;
                        (key, value)
                    }
                })
                .collect();
            if all_shared {
                prev.clone()
            } else {
                Value::Object(Rc::new(map))
            }
        }
        (Value::String(a), Value::String(b)) if *a == b => prev.clone(),
        (_, next) => next,
    }
}

/// Structural sharing for optional payloads.
pub(crate) fn replace_equal_deep_opt(prev: Option<&Value>, next: Option<Value>) -> Option<Value> {
    match (prev, next) {
        (Some(prev), Some(next)) => Some(replace_equal_deep(prev, next)),
        (_, next) => next,
    }
}
