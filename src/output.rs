//! Output file naming.

/// Make a `YYYY-MM-DD HH:MM:SS` time usable in a file name.
pub fn sanitize_time(value: &str) -> String {
    value.replace([':', ' '], "-")
}

/// `<subject>_<start>_<end>_trace.perfetto`
pub fn output_file_name(subject: &str, start: &str, end: &str) -> String {
    format!(
        "{}_{}_{}_trace.perfetto",
        subject,
        sanitize_time(start),
        sanitize_time(end)
    )
}
