//! Text filters available to rendered templates.

const PERSIAN_DIGITS: [char; 10] = ['۰', '۱', '۲', '۳', '۴', '۵', '۶', '۷', '۸', '۹'];

/// Replaces ASCII digits with Extended Arabic-Indic (Persian) digits.
/// Every other character, including non-ASCII digits, passes through.
pub fn to_persian_digits(value: &str) -> String {
    value
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if c.is_ascii_digit() => PERSIAN_DIGITS[d as usize],
            _ => c,
        })
        .collect()
}

/// Looks a filter up by its template name.
pub fn apply_filter(name: &str, value: &str) -> Option<String> {
    match name {
        "topersian" => Some(to_persian_digits(value)),
        _ => None,
    }
}
