/// Two decimals with thousands separators, e.g. `-12,345.60`.
pub fn format_with_commas(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted
        .split_once('.')
        .unwrap_or((formatted.as_str(), "00"));

    let grouped = integer_part
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(",");

    // -0.001 rounds to 0.00 and should not keep its sign
    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{decimal_part}")
}

/// Money in the session currency, symbol placement by currency.
pub fn format_currency(value: f64, currency: &str) -> String {
    let code = currency.to_uppercase();
    let number = format_with_commas(value);

    match code.as_str() {
        "USD" | "CAD" | "AUD" | "HKD" | "SGD" => format!("${number}"),
        "EUR" => format!("{number} €"),
        "GBP" => format!("£{number}"),
        _ => format!("{number} {code}"),
    }
}

pub fn format_quantity(amount: f64) -> String {
    format!("{amount:.4}")
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}
