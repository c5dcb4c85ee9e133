// SPDX-License-Identifier: GPL-3.0-or-later

use serde_json::Value;

/// Fold pages or chunk results into one value, in the order given.
///
/// Arrays concatenate and objects merge key by key, recursively. For any
/// other pair the value from the earlier page wins, `null` included. No
/// pages merge to `null`.
pub fn merge_pages(pages: Vec<Value>) -> Value {
    let mut pages = pages.into_iter();
    match pages.next() {
        Some(first) => pages.fold(first, merge_into),
        None => Value::Null,
    }
}

fn merge_into(acc: Value, next: Value) -> Value {
    match (acc, next) {
        (Value::Array(mut items), Value::Array(more)) => {
            items.extend(more);
            Value::Array(items)
        }
        (Value::Object(mut fields), Value::Object(more)) => {
            for (key, value) in more {
                match fields.get_mut(&key) {
                    Some(existing) => {
                        let earlier = std::mem::take(existing);
                        *existing = merge_into(earlier, value);
                    }
                    None => {
                        fields.insert(key, value);
                    }
                }
            }
            Value::Object(fields)
        }
        (acc, _) => acc,
    }
}
