//! Stripping wrappers out of values before they are stored.

use std::collections::HashSet;

use crate::error::ProxserveError;
use crate::value::Value;

/// Replace wrappers with their raw targets.
///
/// A wrapper is exchanged for its target outright. A raw container is
/// scanned (cycles tolerated) and any wrapper found inside it is replaced in
/// place. Targets reached through a wrapper are already raw and are not
/// scanned.
///
/// # Errors
///
/// [`ProxserveError::Revoked`] if a destroyed wrapper is encountered.
pub(crate) fn deep_unwrap(value: Value) -> Result<Value, ProxserveError> {
    if let Value::Proxy(proxy) = &value {
        return proxy.original_target();
    }
    let mut seen = HashSet::new();
    unwrap_members(&value, &mut seen)?;
    Ok(value)
}

fn unwrap_members(value: &Value, seen: &mut HashSet<*const ()>) -> Result<(), ProxserveError> {
    match value {
        Value::Object(object) => {
            if !seen.insert(object.as_ptr()) {
                return Ok(());
            }
            let members: Vec<(String, Value)> = object
                .data()
                .entries
                .iter()
                .filter(|(_, member)| member.is_proxy() || member.is_container())
                .map(|(key, member)| (key.clone(), member.clone()))
                .collect();
            for (key, member) in members {
                match member {
                    Value::Proxy(proxy) => {
                        let raw = proxy.original_target()?;
                        object.data_mut().entries.insert(key, raw);
                    }
                    nested => unwrap_members(&nested, seen)?,
                }
            }
        }
        Value::Array(array) => {
            if !seen.insert(array.as_ptr()) {
                return Ok(());
            }
            let members: Vec<(usize, Value)> = array
                .items()
                .iter()
                .enumerate()
                .filter(|(_, member)| member.is_proxy() || member.is_container())
                .map(|(index, member)| (index, member.clone()))
                .collect();
            for (index, member) in members {
                match member {
                    Value::Proxy(proxy) => {
                        let raw = proxy.original_target()?;
                        if let Some(slot) = array.items_mut().get_mut(index) {
                            *slot = raw;
                        }
                    }
                    nested => unwrap_members(&nested, seen)?,
                }
            }
        }
        _ => {}
    }
    Ok(())
}
