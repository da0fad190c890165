/// Strip everything but ASCII digits from a user-supplied phone number.
///
/// `+1 (555) 010-2030` becomes `15550102030`. An empty result means the
/// input carried no usable number.
pub fn sanitize_phone(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting() {
        assert_eq!(sanitize_phone("+1 (555) 010-2030"), "15550102030");
    }

    #[test]
    fn letters_only_is_empty() {
        assert_eq!(sanitize_phone("call me"), "");
        assert_eq!(sanitize_phone(""), "");
    }

    #[test]
    fn ignores_non_ascii_digits() {
        assert_eq!(sanitize_phone("٣٤5"), "5");
    }
}
