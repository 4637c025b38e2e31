use std::time::Duration;

/// Parses a compact duration string such as `1d1h1m1s` or `200ms`.
///
/// Units are `ms`, `s`, `m`, `h` and `d`. Returns `None` for malformed input
/// or if the total overflows.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tarn_utils::time::parse_duration;
///
/// assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
/// assert_eq!(parse_duration("200ms"), Some(Duration::from_millis(200)));
/// ```
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut total: u64 = 0;
    let mut chars = input.trim().chars().peekable();

    while chars.peek().is_some() {
        let mut number_str = String::new();
        while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
            number_str.push(c);
        }

        if number_str.is_empty() {
            return None;
        }

        let number: u64 = number_str.parse().ok()?;
        let multiplier: u64 = match chars.next()? {
            'm' if chars.next_if_eq(&'s').is_some() => 1,
            's' => 1000,
            'm' => 60 * 1000,
            'h' => 60 * 60 * 1000,
            'd' => 24 * 60 * 60 * 1000,
            _ => return None,
        };

        total = total.checked_add(number.checked_mul(multiplier)?)?;
    }

    Some(Duration::from_millis(total))
}
