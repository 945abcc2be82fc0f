//! URL slugs for products and attributes.

/// Lowercase ASCII slug: alphanumerics kept, every other run becomes one `-`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// A slug is non-empty, at most 120 chars, `[a-z0-9]` segments joined by single dashes.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 120
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Braai Tongs -- Stainless (XL) "), "braai-tongs-stainless-xl");
        assert_eq!(slugify("Café Crème"), "caf-cr-me");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn validity() {
        assert!(is_valid_slug("braai-tongs"));
        assert!(!is_valid_slug("Braai"));
        assert!(!is_valid_slug("-x"));
        assert!(!is_valid_slug("a--b"));
        assert!(!is_valid_slug(""));
    }

    proptest! {
        #[test]
        fn slugify_output_is_valid_or_empty(s in "[ -~]{0,80}") {
            let slug = slugify(&s);
            prop_assert!(slug.is_empty() || is_valid_slug(&slug));
        }
    }
}
