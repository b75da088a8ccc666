pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::new();
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Formats a numeric time-series value for label display, scaling by
/// thousands and appending the item's unit when one is configured.
pub fn convert_units(value: f64, units: &str) -> String {
    const STEPS: [(f64, &str); 4] = [
        (1e12, "T"),
        (1e9, "G"),
        (1e6, "M"),
        (1e3, "K"),
    ];

    let magnitude = value.abs();
    let (scaled, suffix) = STEPS
        .iter()
        .find(|(step, _)| magnitude >= *step)
        .map_or((value, ""), |(step, suffix)| (value / step, *suffix));

    let number = trim_float(scaled);
    if units.is_empty() && suffix.is_empty() {
        number
    } else if units.is_empty() {
        format!("{number} {suffix}")
    } else {
        format!("{number} {suffix}{units}")
    }
}

/// Two decimal places with trailing zeros removed.
pub fn trim_float(value: f64) -> String {
    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
