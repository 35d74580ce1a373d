//! Small string helpers shared by the category registry and the JSON
//! exporter. Ported from the reference implementation's `string_utils.cc`.

/// Matches `text` against a glob pattern supporting `*` (any run, including
/// empty), `+` (any run of at least one character) and `?` (exactly one
/// character). All other characters are literal.
///
/// Implemented as a single left-to-right scan: encountering `*`/`+` enters
/// a "seeking" mode that advances through `text` until the next literal
/// pattern character is found again.
pub fn glob_match(glob: &str, text: &str) -> bool {
    let mut iter = text.chars().peekable();
    let mut star = false;

    for c in glob.chars() {
        if star {
            while let Some(&next) = iter.peek() {
                if next == c {
                    break;
                }
                iter.next();
            }
            if iter.peek().is_none() {
                return false;
            }
        }

        match c {
            '?' => {
                if iter.next().is_none() {
                    return false;
                }
            }
            '*' => {
                star = true;
            }
            '+' => {
                if iter.next().is_none() {
                    return false;
                }
                star = true;
            }
            literal => {
                match iter.next() {
                    Some(ch) if ch == literal => {}
                    _ => return false,
                }
            }
        }
    }

    iter.peek().is_none() || star
}

/// Splits `s` on `delim`, returning `[""]` for an empty string (matching the
/// reference implementation rather than `str::split`'s own empty-string
/// behavior, which callers here rely on).
pub fn split_string(s: &str, delim: char) -> Vec<String> {
    if s.is_empty() {
        return vec![String::new()];
    }
    s.split(delim).map(|piece| piece.to_string()).collect()
}

/// Joins `parts` with `delim`, producing `""` for an empty slice.
pub fn join_string(parts: &[String], delim: char) -> String {
    parts.join(&delim.to_string())
}

/// Escapes the JSON-significant characters in `input`.
pub fn escape_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '/' => out.push_str("\\/"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

/// Wraps `escape_json` in surrounding quotes, ready to be embedded directly
/// into a JSON document.
pub fn to_json_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    out.push_str(&escape_json(input));
    out.push('"');
    out
}

/// Replaces the first occurrence of `from` in `target` with `to`, in place.
/// A no-op if `from` is empty or not found.
pub fn string_replace(target: &mut String, from: &str, to: &str) {
    if from.is_empty() {
        return;
    }
    if let Some(pos) = target.find(from) {
        target.replace_range(pos..pos + from.len(), to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything_including_empty() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn plus_requires_at_least_one_char() {
        assert!(!glob_match("+", ""));
        assert!(glob_match("+", "a"));
        assert!(glob_match("+", "anything"));
    }

    #[test]
    fn question_mark_matches_exactly_one_char() {
        assert!(glob_match("?", "a"));
        assert!(!glob_match("?", ""));
        assert!(!glob_match("?", "ab"));
    }

    #[test]
    fn literal_empty_matches_only_empty() {
        assert!(glob_match("", ""));
        assert!(!glob_match("", "a"));
    }

    #[test]
    fn prefix_star_pattern() {
        assert!(glob_match("memcached:*", "memcached:cmd_get"));
        assert!(!glob_match("memcached:*", "kv:mutation"));
    }

    #[test]
    fn split_empty_string_yields_single_empty_element() {
        assert_eq!(split_string("", ','), vec![""]);
    }

    #[test]
    fn split_and_join_round_trip() {
        let parts = split_string("a,b,c", ',');
        assert_eq!(parts, vec!["a", "b", "c"]);
        assert_eq!(join_string(&parts, ','), "a,b,c");
    }

    #[test]
    fn escape_json_covers_control_chars() {
        assert_eq!(escape_json("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn string_replace_first_occurrence_only() {
        let mut s = "%p-%p".to_string();
        string_replace(&mut s, "%p", "123");
        assert_eq!(s, "123-%p");
    }

    #[test]
    fn string_replace_empty_from_is_noop() {
        let mut s = "unchanged".to_string();
        string_replace(&mut s, "", "x");
        assert_eq!(s, "unchanged");
    }
}
