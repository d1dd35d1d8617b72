/// Parses the given text as a double. The parse is locale-independent: a dot is the only decimal separator. If the text does not parse, the caller's
/// default is returned instead; Operand positions pass `0.0`, which is what lets plain strings participate in arithmetic.
///
/// # Parameters
/// - `text`: The text to parse.
/// - `default`: The value to return when the text is not a number.
///
/// # Returns
/// The parsed value, or `default`.
#[must_use]
pub fn parse(text: &str, default: f64) -> f64 {
	text.trim().parse::<f64>().unwrap_or(default)
}

/// Formats the given double at the given scale. The value is rounded half-up to `scale` decimal digits; Trailing fractional zeros are stripped, and an
/// integer result carries no decimal point at all. A non-finite value formats as `0`, matching the division-by-zero rule.
///
/// # Parameters
/// - `value`: The value to format.
/// - `scale`: The number of decimal digits to retain after the point.
///
/// # Returns
/// The formatted value.
#[must_use]
pub fn format(value: f64, scale: u32) -> String {
	if !value.is_finite() {
		return "0".to_owned();
	}

	// Half-up rounds away from zero on ties, so round the magnitude and restore the sign afterwards.
	let factor = 10f64.powi(scale as i32);
	let magnitude = (value.abs() * factor).round() / factor;

	let mut formatted = format!("{magnitude:.precision$}", precision = scale as usize);
	if formatted.contains('.') {
		formatted = formatted.trim_end_matches('0').trim_end_matches('.').to_owned();
	}

	if value.is_sign_negative() && formatted != "0" {
		formatted.insert(0, '-');
	}

	formatted
}
