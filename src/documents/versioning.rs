/// Major number of a `vN.M` label, if it parses.
fn major_of(label: &str) -> Option<u32> {
    let body = label.strip_prefix('v').unwrap_or(label);
    let major = body.split('.').next().unwrap_or(body);
    major.trim().parse().ok()
}

/// Computes the label for the next version of a document: one major step
/// above the highest parsable existing label. Falls back to `v2.0` since the
/// initial upload is always `v1.0`.
#[must_use]
pub fn next_version_label<'a>(labels: impl IntoIterator<Item = &'a str>) -> String {
    labels
        .into_iter()
        .filter_map(major_of)
        .max()
        .map_or_else(|| "v2.0".to_string(), |major| format!("v{}.0", major.saturating_add(1)))
}
