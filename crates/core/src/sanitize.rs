//! Filename character policy: ASCII alphanumerics and `-` only.

/// Sanitizes one filename component. Whitespace, `_`, `/` and `.` turn into
/// separators, everything else outside the safe set is dropped.
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if is_separator_like(ch) {
            out.push('-');
        }
    }
    cleanup_filename(&out)
}

/// Collapses repeated hyphens and trims them from both ends.
pub fn cleanup_filename(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;

    for ch in value.chars() {
        if ch == '-' {
            if prev_sep {
                continue;
            }
            prev_sep = true;
        } else {
            prev_sep = false;
        }
        out.push(ch);
    }

    out.trim_matches('-').to_string()
}

fn is_separator_like(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '_' | '/' | '\\' | '.' | ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_and_punctuation_become_single_hyphens() {
        assert_eq!(sanitize_component("FE 24-70mm F2.8 GM II"), "FE-24-70mm-F2-8-GM-II");
        assert_eq!(sanitize_component("  Mavic   3  Pro "), "Mavic-3-Pro");
    }

    #[test]
    fn unsafe_characters_are_removed() {
        assert_eq!(sanitize_component("a*b?c<d>|\"e"), "abcde");
        assert_eq!(sanitize_component("日本語カメラ"), "");
        assert_eq!(sanitize_component("Über"), "ber");
    }

    #[test]
    fn cleanup_compacts_and_trims() {
        assert_eq!(cleanup_filename("--2025-06-04--153000---x--"), "2025-06-04-153000-x");
    }
}
