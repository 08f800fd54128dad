//! Agent session id extraction from stdout.

use serde_json::Value;

const SESSION_KEYS: [&str; 2] = ["session_id", "sessionId"];

/// The session id from the last JSON object line that carries one.
pub fn extract_session_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| {
            let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(line) else {
                return None;
            };
            SESSION_KEYS
                .iter()
                .filter_map(|key| obj.get(*key).and_then(Value::as_str))
                .find(|sid| !sid.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_line_with_session_wins() {
        let out = "{\"type\":\"start\"}\n{\"session_id\":\"first\"}\nplain text\n{\"type\":\"result\",\"session_id\":\"last\"}\n";
        assert_eq!(extract_session_id(out).as_deref(), Some("last"));
    }

    #[test]
    fn only_final_line_has_session() {
        let out = "{\"type\":\"a\"}\n{\"type\":\"b\"}\n{\"sessionId\":\"xyz\"}";
        assert_eq!(extract_session_id(out).as_deref(), Some("xyz"));
    }

    #[test]
    fn skips_trailing_lines_without_session() {
        let out = "{\"session_id\":\"abc\"}\n{\"type\":\"done\"}\n{broken json\n";
        assert_eq!(extract_session_id(out).as_deref(), Some("abc"));
    }

    #[test]
    fn none_without_session_lines() {
        assert_eq!(extract_session_id(""), None);
        assert_eq!(extract_session_id("hello\nworld\n"), None);
        assert_eq!(extract_session_id("{\"session_id\":\"\"}\n[1,2]\n"), None);
        assert_eq!(extract_session_id("{\"session_id\": 42}\n"), None);
    }

    #[test]
    fn tolerates_indentation_and_crlf() {
        let out = "  {\"session_id\":\"abc\"}\r\n";
        assert_eq!(extract_session_id(out).as_deref(), Some("abc"));
    }
}
