//! MIME detection for attachments.

/// MIME types the extraction providers accept as inline parts.
const MULTIMODAL_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "application/pdf",
];

/// Guess a MIME type from the file extension.
pub fn guess_mime(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// The provider-supported MIME type for `filename`, or `None` when the
/// file must not be sent to a provider.
pub fn supported_mime(filename: &str) -> Option<&'static str> {
    let guessed = mime_guess::from_path(filename).first()?;
    MULTIMODAL_TYPES
        .iter()
        .copied()
        .find(|t| *t == guessed.essence_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_types_by_extension() {
        assert_eq!(supported_mime("schein.JPG"), Some("image/jpeg"));
        assert_eq!(supported_mime("skizze.jpeg"), Some("image/jpeg"));
        assert_eq!(supported_mime("foto.png"), Some("image/png"));
        assert_eq!(supported_mime("foto.webp"), Some("image/webp"));
        assert_eq!(supported_mime("animation.gif"), Some("image/gif"));
        assert_eq!(supported_mime("gutachten.pdf"), Some("application/pdf"));
    }

    #[test]
    fn unsupported_types_are_excluded() {
        assert_eq!(supported_mime("vollmacht.docx"), None);
        assert_eq!(supported_mime("daten.xlsx"), None);
        assert_eq!(supported_mime("ohne_endung"), None);
    }

    #[test]
    fn guess_falls_back_to_octet_stream() {
        assert_eq!(guess_mime("gutachten.pdf"), "application/pdf");
        assert_eq!(guess_mime("unbekannt"), "application/octet-stream");
    }
}
