//! Dot-notation field lookup for backend response bodies.
//!
//! Error payloads differ between endpoints (`{"code": ..}`, `{"error": {"code": ..}}`,
//! `{"errors": [{"code": ..}]}`), so the classifier probes a configured list of
//! paths instead of hardcoding one shape.

use serde_json::Value;

/// Path mapper for extracting values from JSON using dot-notation paths
pub struct PathMapper;

impl PathMapper {
    /// Get value from JSON using dot-notation path (supports array indexing)
    ///
    /// Examples:
    /// - "code"
    /// - "error.code"
    /// - "errors[0].code"
    pub fn get_path<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
        let normalized = path.trim().trim_start_matches("$.");
        if normalized.is_empty() {
            return None;
        }

        let mut current = obj;
        for part in normalized.split('.') {
            if part.is_empty() {
                return None;
            }

            let (key, index) = match part.find('[') {
                Some(pos) => {
                    let idx = part[pos + 1..].trim_end_matches(']').parse::<usize>().ok()?;
                    (&part[..pos], Some(idx))
                }
                None => (part, None),
            };

            if !key.is_empty() {
                current = match current {
                    Value::Object(map) => map.get(key)?,
                    Value::Array(arr) => arr.get(key.parse::<usize>().ok()?)?,
                    _ => return None,
                };
            }
            if let Some(idx) = index {
                current = current.as_array()?.get(idx)?;
            }
        }

        Some(current)
    }

    /// Get a scalar as a string (numbers and booleans are rendered, objects are not)
    pub fn get_string(obj: &Value, path: &str) -> Option<String> {
        match Self::get_path(obj, path)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Get a non-negative integer, accepting numeric strings
    pub fn get_u64(obj: &Value, path: &str) -> Option<u64> {
        match Self::get_path(obj, path)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }

    /// First path in `paths` that yields a string.
    pub fn first_string<S: AsRef<str>>(obj: &Value, paths: &[S]) -> Option<String> {
        paths.iter().find_map(|p| Self::get_string(obj, p.as_ref()))
    }

    /// First path in `paths` that yields an integer.
    pub fn first_u64<S: AsRef<str>>(obj: &Value, paths: &[S]) -> Option<u64> {
        paths.iter().find_map(|p| Self::get_u64(obj, p.as_ref()))
    }
}
