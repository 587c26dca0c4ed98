//! RUT (Chilean national taxpayer/identity number) checksum and formatting.
//!
//! A RUT is a numeric body plus a verifier character (`0`-`9` or `K`)
//! computed with the modulo-11 algorithm over the body digits, weighted
//! `2..=7` cyclically from the rightmost digit.

/// Inputs this short are treated as still being typed and pass validation.
pub const IN_PROGRESS_MAX_LEN: usize = 4;

/// Strips dots, dashes and whitespace and upper-cases the verifier.
#[must_use]
pub fn clean_rut(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' ' | '\t'))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Computes the verifier character for a digit-only body.
#[must_use]
pub fn verifier_digit(body: &str) -> Option<char> {
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = body
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .zip([2u32, 3, 4, 5, 6, 7].into_iter().cycle())
        .map(|(digit, weight)| digit * weight)
        .sum();
    match 11 - (sum % 11) {
        11 => Some('0'),
        10 => Some('K'),
        n => char::from_digit(n, 10),
    }
}

/// Full validation of a formatted or unformatted RUT: the modulo-11
/// checksum plus one extra rule.
///
/// The extra rule is not part of the checksum: bodies made of one repeated
/// digit (`11.111.111-1`) carry a correct verifier but are placeholder
/// values, so they are rejected.
#[must_use]
pub fn is_valid_rut(input: &str) -> bool {
    let cleaned = clean_rut(input);
    if cleaned.len() < 2 || !cleaned.is_ascii() {
        return false;
    }
    let (body, dv) = cleaned.split_at(cleaned.len() - 1);
    let body = body.trim_start_matches('0');
    if body.is_empty() || body.len() > 9 {
        return false;
    }
    // Repeated-digit placeholder, checked apart from the checksum.
    let mut digits = body.chars();
    let first = digits.next();
    if body.len() > 1 && digits.all(|c| Some(c) == first) {
        return false;
    }
    verifier_digit(body).is_some_and(|expected| dv.starts_with(expected))
}

/// Form-level rule: empty and in-progress inputs (at most
/// [`IN_PROGRESS_MAX_LEN`] characters) pass; longer inputs must be valid.
#[must_use]
pub fn validate_rut_input(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.chars().count() <= IN_PROGRESS_MAX_LEN || is_valid_rut(trimmed)
}

/// Formats a RUT with thousands dots and a dash before the verifier:
/// `79549738` becomes `7.954.973-8`.
#[must_use]
pub fn format_rut(input: &str) -> String {
    let cleaned = clean_rut(input);
    if cleaned.len() < 2 || !cleaned.is_ascii() {
        return cleaned;
    }
    let (body, dv) = cleaned.split_at(cleaned.len() - 1);
    let digits: Vec<char> = body.chars().collect();
    let mut grouped = String::with_capacity(body.len() + body.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*c);
    }
    format!("{grouped}-{dv}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_digits() {
        assert_eq!(verifier_digit("7954973"), Some('8'));
        assert_eq!(verifier_digit("12345678"), Some('5'));
        assert_eq!(verifier_digit("10000013"), Some('K'));
        assert_eq!(verifier_digit("1a"), None);
        assert_eq!(verifier_digit(""), None);
    }

    #[test]
    fn valid_and_invalid_ruts() {
        assert!(is_valid_rut("7.954.973-8"));
        assert!(is_valid_rut("12.345.678-5"));
        assert!(is_valid_rut("12345678-5"));
        assert!(is_valid_rut("10.000.013-k"));
        assert!(!is_valid_rut("7.954.973-5"));
        assert!(!is_valid_rut("12.345.678-9"));
        assert!(!is_valid_rut("abc"));
    }

    #[test]
    fn repeated_digit_bodies_are_rejected() {
        assert_eq!(verifier_digit("11111111"), Some('1'));
        assert!(!is_valid_rut("11.111.111-1"));
    }

    #[test]
    fn short_input_is_in_progress() {
        assert!(validate_rut_input(""));
        assert!(validate_rut_input("11"));
        assert!(validate_rut_input("1234"));
        assert!(!validate_rut_input("12345"));
        assert!(!validate_rut_input("11.111.111-1"));
        assert!(validate_rut_input("7.954.973-8"));
    }

    #[test]
    fn formatting() {
        assert_eq!(format_rut("79549738"), "7.954.973-8");
        assert_eq!(format_rut("12.345.678-5"), "12.345.678-5");
        assert_eq!(format_rut("10000013k"), "10.000.013-K");
        assert_eq!(format_rut("5"), "5");
    }
}
