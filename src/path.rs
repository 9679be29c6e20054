//! Safe traversal of nested JSON documents by dotted path.
//!
//! Used by the Watch engine to tolerate sparse server responses (event
//! envelopes that may or may not carry `object.metadata.resourceVersion`,
//! for instance) and by auth-provider config to pull a token out of an
//! arbitrary exec-plugin response shape. Kept deliberately small: in a
//! statically-typed rewrite explicit optional-chaining on a concrete type
//! is preferred everywhere else, and this helper is retained only for the
//! handful of call sites that genuinely need a dynamic path read from
//! config (e.g. an auth-provider `token-key`).
use crate::error::PathError;
use serde_json::Value;

/// How [`set`] should create intermediate structure that doesn't exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    /// Missing intermediates are created as JSON objects (maps).
    Object,
    /// Missing intermediates are created as JSON arrays (ordered sequences).
    Array,
}

/// Options controlling [`set`].
#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    /// Whether missing intermediate segments should be created at all.
    pub create_structure: bool,
    /// What kind of structure to create for missing intermediates.
    pub create_structure_type: StructureKind,
}

impl Default for SetOptions {
    fn default() -> Self {
        SetOptions {
            create_structure: true,
            create_structure_type: StructureKind::Object,
        }
    }
}

/// Splits a dotted path into its segments.
///
/// Bracket segments `[k]` are equivalent to `.k`, so `a.b[0].c` and
/// `a.b.0.c` parse identically. An empty path is rejected with
/// [`PathError::BadPath`].
fn segments(path: &str) -> Result<Vec<String>, PathError> {
    if path.is_empty() {
        return Err(PathError::BadPath);
    }
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                let mut key = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    key.push(c);
                }
                out.push(key);
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    if out.is_empty() {
        return Err(PathError::BadPath);
    }
    Ok(out)
}

/// Returns `true` iff `root` has a value at `path` (even if that value is `null`).
pub fn exists(root: &Value, path: &str) -> Result<bool, PathError> {
    let segs = segments(path)?;
    let mut cur = root;
    for seg in &segs {
        match step(cur, seg) {
            Some(next) => cur = next,
            None => return Ok(false),
        }
    }
    Ok(true)
}

fn step<'a>(cur: &'a Value, seg: &str) -> Option<&'a Value> {
    match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(arr) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    }
}

/// Reads the value at `path`, falling back to `default` when any prefix of
/// the path is absent, non-structured, or the resolved value is `null`.
/// Without a default, a missing path raises [`PathError::PathMissing`].
pub fn get(root: &Value, path: &str, default: Option<Value>) -> Result<Value, PathError> {
    let segs = segments(path)?;
    let mut cur = root;
    for seg in &segs {
        match step(cur, seg) {
            Some(next) => cur = next,
            None => {
                return default.ok_or_else(|| PathError::PathMissing(path.to_string()));
            }
        }
    }
    if cur.is_null() {
        if let Some(default) = default {
            return Ok(default);
        }
    }
    Ok(cur.clone())
}

/// Convenience wrapper over [`get`] for the common case of reading a string
/// with no default, used by the auth-provider path lookups.
pub fn get_str(root: &Value, path: &str) -> Result<String, PathError> {
    let v = get(root, path, None)?;
    v.as_str()
        .map(str::to_owned)
        .ok_or_else(|| PathError::PathMissing(path.to_string()))
}

/// Walks (creating intermediates per `options`) to `path` and assigns `value`.
///
/// Descending into an existing non-structured leaf is a [`PathError::PathConflict`].
pub fn set(root: &mut Value, path: &str, value: Value, options: SetOptions) -> Result<(), PathError> {
    let segs = segments(path)?;
    let mut cur = root;
    for (i, seg) in segs.iter().enumerate() {
        let last = i == segs.len() - 1;
        if !cur.is_object() && !cur.is_array() {
            if cur.is_null() && options.create_structure {
                *cur = match options.create_structure_type {
                    StructureKind::Object => Value::Object(Default::default()),
                    StructureKind::Array => Value::Array(Default::default()),
                };
            } else if !cur.is_null() {
                return Err(PathError::PathConflict(path.to_string()));
            }
        }
        if last {
            assign(cur, seg, value)?;
            return Ok(());
        }
        cur = descend(cur, seg, options)?;
    }
    Ok(())
}

fn assign(cur: &mut Value, seg: &str, value: Value) -> Result<(), PathError> {
    match cur {
        Value::Object(map) => {
            map.insert(seg.to_string(), value);
            Ok(())
        }
        Value::Array(arr) => {
            let idx: usize = seg.parse().map_err(|_| PathError::PathConflict(seg.to_string()))?;
            if idx >= arr.len() {
                arr.resize(idx + 1, Value::Null);
            }
            arr[idx] = value;
            Ok(())
        }
        _ => Err(PathError::PathConflict(seg.to_string())),
    }
}

fn descend<'a>(cur: &'a mut Value, seg: &str, options: SetOptions) -> Result<&'a mut Value, PathError> {
    match cur {
        Value::Object(map) => {
            if !map.contains_key(seg) {
                if !options.create_structure {
                    return Err(PathError::PathMissing(seg.to_string()));
                }
                let next = match options.create_structure_type {
                    StructureKind::Object => Value::Object(Default::default()),
                    StructureKind::Array => Value::Array(Default::default()),
                };
                map.insert(seg.to_string(), next);
            }
            Ok(map.get_mut(seg).expect("just inserted or present"))
        }
        Value::Array(arr) => {
            let idx: usize = seg.parse().map_err(|_| PathError::PathConflict(seg.to_string()))?;
            if idx >= arr.len() {
                if !options.create_structure {
                    return Err(PathError::PathMissing(seg.to_string()));
                }
                arr.resize(idx + 1, Value::Null);
            }
            Ok(&mut arr[idx])
        }
        _ => Err(PathError::PathConflict(seg.to_string())),
    }
}

/// Removes the terminal key if present; a no-op if any prefix is absent.
pub fn unset(root: &mut Value, path: &str) -> Result<(), PathError> {
    let segs = segments(path)?;
    let (last, prefix) = segs.split_last().expect("segments() never returns empty");
    let mut cur = root;
    for seg in prefix {
        match step_mut(cur, seg) {
            Some(next) => cur = next,
            None => return Ok(()),
        }
    }
    match cur {
        Value::Object(map) => {
            map.remove(last);
        }
        Value::Array(arr) => {
            if let Ok(idx) = last.parse::<usize>() {
                if idx < arr.len() {
                    arr.remove(idx);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn step_mut<'a>(cur: &'a mut Value, seg: &str) -> Option<&'a mut Value> {
    match cur {
        Value::Object(map) => map.get_mut(seg),
        Value::Array(arr) => seg.parse::<usize>().ok().and_then(move |i| arr.get_mut(i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_with_default_on_missing_prefix() {
        let root = json!({"a": {"b": 1}});
        let v = get(&root, "a.c.d", Some(json!("fallback"))).unwrap();
        assert_eq!(v, json!("fallback"));
    }

    #[test]
    fn get_without_default_raises_path_missing() {
        let root = json!({"a": 1});
        let err = get(&root, "a.b", None).unwrap_err();
        assert!(matches!(err, PathError::PathMissing(_)));
    }

    #[test]
    fn bracket_and_dot_segments_are_equivalent() {
        let root = json!({"a": [10, 20, 30]});
        assert_eq!(get(&root, "a[1]", None).unwrap(), json!(20));
        assert_eq!(get(&root, "a.1", None).unwrap(), json!(20));
    }

    #[test]
    fn empty_path_is_bad_path() {
        let root = json!({});
        assert!(matches!(exists(&root, "").unwrap_err(), PathError::BadPath));
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut root = json!({});
        set(&mut root, "spec.replicas", json!(3), SetOptions::default()).unwrap();
        assert_eq!(get(&root, "spec.replicas", None).unwrap(), json!(3));
    }

    #[test]
    fn unset_then_exists_is_false() {
        let mut root = json!({"a": {"b": 1}});
        unset(&mut root, "a.b").unwrap();
        assert!(!exists(&root, "a.b").unwrap());
        // no-op on an already-absent path
        unset(&mut root, "a.b").unwrap();
    }

    #[test]
    fn set_into_existing_scalar_is_conflict() {
        let mut root = json!({"a": 1});
        let err = set(&mut root, "a.b", json!(2), SetOptions::default()).unwrap_err();
        assert!(matches!(err, PathError::PathConflict(_)));
    }

    #[test]
    fn get_null_value_with_default_returns_default() {
        let root = json!({"a": null});
        let v = get(&root, "a", Some(json!("fallback"))).unwrap();
        assert_eq!(v, json!("fallback"));
    }
}
