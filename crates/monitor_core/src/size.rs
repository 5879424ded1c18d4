/// Bytes in one binary gigabyte; size bounds are configured in these units.
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Parse a human size token such as `10GB`, `1.5 GiB`, `700 MB`, `1,024 KB` or `52428800`.
///
/// Units are binary (`1 KB == 1024 B`). Commas are treated as thousands
/// separators. Returns `None` for anything that is not a non-negative number
/// followed by an optional known unit.
pub fn parse_size(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let split = cleaned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(cleaned.len());
    let (number, unit) = cleaned.split_at(split);
    if number.is_empty() {
        return None;
    }

    let value: f64 = number.parse().ok()?;
    let multiplier = unit_multiplier(unit.trim())?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes < 0.0 || bytes > u64::MAX as f64 {
        return None;
    }
    Some(bytes.round() as u64)
}

/// Convert a GiB bound to bytes, clamping negatives to zero.
pub fn gigabytes_to_bytes(gigabytes: f64) -> u64 {
    if !gigabytes.is_finite() || gigabytes <= 0.0 {
        return 0;
    }
    (gigabytes * BYTES_PER_GIB as f64).round() as u64
}

/// Render bytes as GiB with two decimals, for log lines.
pub fn format_gigabytes(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / BYTES_PER_GIB as f64)
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    const KIB: u64 = 1024;
    let unit = unit.to_ascii_lowercase();
    let multiplier = match unit.as_str() {
        "" | "b" | "byte" | "bytes" => 1,
        "k" | "kb" | "kib" => KIB,
        "m" | "mb" | "mib" => KIB * KIB,
        "g" | "gb" | "gib" => BYTES_PER_GIB,
        "t" | "tb" | "tib" => BYTES_PER_GIB * KIB,
        _ => return None,
    };
    Some(multiplier)
}
