/// Formats a byte count with binary units (B, KiB, MiB, ...).
///
/// Plain bytes are printed without decimals.
///
/// # Example
///
/// ```
/// use tarn_utils::bytes::format_bytes;
///
/// assert_eq!(format_bytes(1024 * 1024, 2), "1.00 MiB");
/// assert_eq!(format_bytes(512, 2), "512 B");
/// ```
pub fn format_bytes(bytes: u64, precision: usize) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    let mut size = bytes as f64;
    let mut idx = 0;
    while size >= 1024.0 && idx < UNITS.len() - 1 {
        size /= 1024.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.precision$} {}", UNITS[idx])
    }
}
