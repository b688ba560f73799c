use std::panic::Location;

/// Keep at most the last two segments of a source path.
///
/// `src/handlers/order/create.rs` becomes `order/create.rs`; paths with two
/// or fewer segments are returned as-is. Both separators are accepted so
/// Windows builds render the same way.
pub fn short_path(path: &str) -> &str {
    let mut separators = path.rmatch_indices(['/', '\\']);
    match (separators.next(), separators.next()) {
        (Some(_), Some((idx, _))) => &path[idx + 1..],
        _ => path,
    }
}

/// `dir/file.rs:line` for a captured call site.
pub fn format_location(location: &Location<'_>) -> String {
    format!("{}:{}", short_path(location.file()), location.line())
}
