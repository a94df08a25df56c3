use std::path::Path;

/// Timestamp shared by every backup, log and diagnostics path of one run.
pub fn run_stamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// Render a file mode the way `chmod` takes it.
pub fn octal_mode(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("héllo", 2), "h");
        assert_eq!(truncate_string("short", 64), "short");
    }

    #[test]
    fn run_stamp_is_sortable() {
        let stamp = run_stamp();
        assert_eq!(stamp.len(), 15);
        assert_eq!(stamp.as_bytes()[8], b'-');
    }

    #[test]
    fn octal_mode_is_zero_padded() {
        assert_eq!(octal_mode(0o600), "0600");
        assert_eq!(octal_mode(0o100775), "0775");
    }

    #[test]
    fn display_path_strips_base() {
        assert_eq!(
            display_path(Path::new("/srv/lab/compose.yaml"), Some(Path::new("/srv/lab"))),
            "compose.yaml"
        );
    }
}
