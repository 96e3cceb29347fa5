use uuid::Uuid;

/// Extension of `filename` including the leading dot, if it has one.
pub fn file_extension(filename: &str) -> Option<&str> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => Some(&name[idx..]),
        _ => None,
    }
}

/// `<prefix><uuid-without-dashes><ext>`, e.g. `images/3f2a...9c.png`.
pub fn default_object_path(prefix: &str, filename: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}{}{}", prefix, id, file_extension(filename).unwrap_or(""))
}

/// Suffix for staging files, keeping the original extension.
pub fn staging_suffix(filename: &str) -> &str {
    file_extension(filename).unwrap_or(".tmp")
}

pub fn format_file_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let group = ((size as f64).log10() / 1024f64.log10()) as usize;
    let group = group.min(UNITS.len() - 1);
    format!(
        "{:.1} {}",
        size as f64 / 1024f64.powi(group as i32),
        UNITS[group]
    )
}
