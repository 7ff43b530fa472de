//! Output file naming.

use std::collections::HashSet;

use super::OutputFormat;

/// Prefix of the thumbnail stored next to each main image.
pub const THUMBNAIL_PREFIX: &str = "thumb-";

/// Build a storage-safe file name for a compressed photo.
///
/// The original extension is dropped, every character outside
/// `[A-Za-z0-9_-]` becomes `-`, and the extension of the output format is
/// appended. Path separators are replaced too, so the result is always a
/// bare file name.
pub fn sanitize_file_name(name: &str, format: OutputFormat) -> String {
    let stem = match name.rfind('.') {
        Some(idx) if !name[idx + 1..].is_empty() && !name[idx + 1..].contains(['/', '\\']) => {
            &name[..idx]
        }
        _ => name,
    };

    let mut sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if sanitized.is_empty() {
        sanitized.push_str("image");
    }

    format!("{}.{}", sanitized, format.extension())
}

/// Reserve a name for a main image and its thumbnail within one batch.
///
/// Returns `name` if neither it nor its thumbnail name is taken, otherwise
/// the first free `stem-N.ext`. Both names are added to `taken`.
pub fn claim_output_name(name: &str, taken: &mut HashSet<String>) -> String {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) => (stem, format!(".{}", extension)),
        None => (name, String::new()),
    };

    let mut candidate = name.to_string();
    let mut suffix = 0u32;
    loop {
        let thumbnail = format!("{}{}", THUMBNAIL_PREFIX, candidate);
        if !taken.contains(&candidate) && !taken.contains(&thumbnail) {
            taken.insert(thumbnail);
            taken.insert(candidate.clone());
            return candidate;
        }
        suffix += 1;
        candidate = format!("{}-{}{}", stem, suffix, extension);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_safe(stem: &str) -> bool {
        stem.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    #[test]
    fn test_spaces_and_punctuation_become_dashes() {
        let name = sanitize_file_name("My Photo!!.JPG", OutputFormat::Jpeg);
        assert_eq!(name, "My-Photo--.jpg");
        assert!(is_safe(name.strip_suffix(".jpg").unwrap()));
    }

    #[test]
    fn test_extension_follows_output_format() {
        assert_eq!(sanitize_file_name("logo.png", OutputFormat::Jpeg), "logo.jpg");
        assert_eq!(sanitize_file_name("logo.gif", OutputFormat::Png), "logo.png");
        assert_eq!(sanitize_file_name("noext", OutputFormat::Png), "noext.png");
    }

    #[test]
    fn test_only_last_extension_is_dropped() {
        assert_eq!(
            sanitize_file_name("archive.tar.gz", OutputFormat::Jpeg),
            "archive-tar.jpg"
        );
    }

    #[test]
    fn test_is_idempotent() {
        let once = sanitize_file_name("Été à la plage (1).jpeg", OutputFormat::Jpeg);
        let twice = sanitize_file_name(&once, OutputFormat::Jpeg);
        assert_eq!(once, twice);
        assert!(is_safe(once.strip_suffix(".jpg").unwrap()));
    }

    #[test]
    fn test_path_traversal_is_flattened() {
        let name = sanitize_file_name("../../etc/passwd.png", OutputFormat::Png);
        assert_eq!(name, "------etc-passwd.png");
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_empty_stem_gets_placeholder() {
        assert_eq!(sanitize_file_name("", OutputFormat::Jpeg), "image.jpg");
        assert_eq!(sanitize_file_name(".jpg", OutputFormat::Jpeg), "image.jpg");
    }

    #[test]
    fn test_colliding_names_get_numbered() {
        let mut taken = HashSet::new();
        let first = sanitize_file_name("a.png", OutputFormat::Jpeg);
        let second = sanitize_file_name("a.jpg", OutputFormat::Jpeg);
        let third = sanitize_file_name("a.jpeg", OutputFormat::Jpeg);

        assert_eq!(claim_output_name(&first, &mut taken), "a.jpg");
        assert_eq!(claim_output_name(&second, &mut taken), "a-1.jpg");
        assert_eq!(claim_output_name(&third, &mut taken), "a-2.jpg");
        assert!(taken.contains("thumb-a-1.jpg"));
    }

    #[test]
    fn test_main_name_cannot_shadow_a_thumbnail() {
        let mut taken = HashSet::new();
        assert_eq!(claim_output_name("a.jpg", &mut taken), "a.jpg");
        assert_eq!(claim_output_name("thumb-a.jpg", &mut taken), "thumb-a-1.jpg");
    }
}
