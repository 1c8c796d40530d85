use serde_json::{Map, Value};

/// Walk `root` by a dotted path (`a.b.c`).
///
/// Objects are indexed by key and arrays by numeric segment. Resolution stops with `None`
/// as soon as a segment is missing or the current value cannot be indexed.
pub fn get_by_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        current = step(current, part)?;
    }
    Some(current)
}

/// Same as [`get_by_path`], rooted at a JSON object map such as a flow context.
pub fn get_in_map<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let first = root.get(head)?;
    match rest {
        Some(rest) => get_by_path(first, rest),
        None => Some(first),
    }
}

fn step<'a>(current: &'a Value, part: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    }
}
