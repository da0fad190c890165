//! `${NAME}` expansion for raw config text, applied before parsing.

/// Expand placeholders from the process environment.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Expand placeholders through `lookup`.
///
/// A placeholder `lookup` cannot resolve, an empty `${}` and an unterminated
/// `${` are copied through verbatim.
pub fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let Some(end) = body.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &body[..end];
        match Some(name).filter(|n| !n.is_empty()).and_then(&lookup) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + end + 3]),
        }
        rest = &body[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        (name == "PAIRLINE_TEST_TOKEN").then(|| "s3cret".to_string())
    }

    #[test]
    fn substitutes_known_var() {
        assert_eq!(
            substitute_with("token = \"${PAIRLINE_TEST_TOKEN}\"", lookup),
            "token = \"s3cret\""
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_with("${PAIRLINE_NONEXISTENT_XYZ}", lookup),
            "${PAIRLINE_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn malformed_placeholders_are_literal() {
        assert_eq!(substitute_with("cost: ${", lookup), "cost: ${");
        assert_eq!(substitute_with("${}", lookup), "${}");
        assert_eq!(substitute_with("$5 and $HOME", lookup), "$5 and $HOME");
    }

    #[test]
    fn expands_several_in_one_line() {
        assert_eq!(
            substitute_with("${PAIRLINE_TEST_TOKEN}:${MISSING}:${PAIRLINE_TEST_TOKEN}", lookup),
            "s3cret:${MISSING}:s3cret"
        );
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain text"), "plain text");
    }
}
