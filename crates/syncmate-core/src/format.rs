//! Human-readable sizes and transfer rates.
//!
//! Values are scaled by powers of 1024, the exponent picked as
//! `floor(log_1024(value))` and clamped to the last available unit. The
//! number is printed with thousands separators and at most one fractional
//! digit (`#,##0.#`), rounding half to even.

/// Format a byte count, e.g. `1536` → `"1.5 KB"`.
pub fn readable_file_size<S: AsRef<str>>(bytes: i64, units: &[S]) -> String {
    readable(bytes, units)
}

/// Format a per-second byte count as bits, e.g. `128` → `"1 Kb/s"`.
pub fn readable_transfer_rate<S: AsRef<str>>(bytes: i64, units: &[S]) -> String {
    readable(bytes.saturating_mul(8), units)
}

fn readable<S: AsRef<str>>(value: i64, units: &[S]) -> String {
    let unit = |i: usize| units.get(i).map(|u| u.as_ref()).unwrap_or("");
    if value <= 0 {
        return format!("0 {}", unit(0));
    }

    let last = units.len().saturating_sub(1);
    let mut group = 0usize;
    let mut scale = 1i128;
    while group < last && i128::from(value) >= scale * 1024 {
        scale *= 1024;
        group += 1;
    }

    if group == 0 {
        return format!("{} {}", group_thousands(&value.to_string()), unit(0));
    }

    let scaled = value as f64 / scale as f64;
    format!("{} {}", format_decimal(scaled), unit(group))
}

/// `#,##0.#` with half-even rounding.
fn format_decimal(value: f64) -> String {
    let tenths = round_half_even(value * 10.0) as u64;
    let whole = tenths / 10;
    let fraction = tenths % 10;

    let grouped = group_thousands(&whole.to_string());

    if fraction == 0 {
        grouped
    } else {
        format!("{grouped}.{fraction}")
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

fn round_half_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    }
}
