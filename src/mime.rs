//! Content-based MIME detection for attachment uploads.

const TEXT_PLAIN: &str = "text/plain";
const OCTET_STREAM: &str = "application/octet-stream";

/// Guesses the MIME type of `bytes` from their content, never from a name.
///
/// Known binary signatures win; otherwise valid UTF-8 without NUL bytes is
/// reported as `text/plain`, anything else as `application/octet-stream`.
pub fn sniff_mime_type(bytes: &[u8]) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_owned();
    }

    if looks_like_text(bytes) {
        TEXT_PLAIN.to_owned()
    } else {
        OCTET_STREAM.to_owned()
    }
}

fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::sniff_mime_type;

    #[test]
    fn png_signature() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
        assert_eq!(sniff_mime_type(&png), "image/png");
    }

    #[test]
    fn pdf_signature() {
        assert_eq!(sniff_mime_type(b"%PDF-1.7\n..."), "application/pdf");
    }

    #[test]
    fn utf8_text_falls_back_to_plain() {
        assert_eq!(sniff_mime_type("hello, relax ☕".as_bytes()), "text/plain");
        assert_eq!(sniff_mime_type(b""), "text/plain");
    }

    #[test]
    fn unknown_binary_is_octet_stream() {
        assert_eq!(
            sniff_mime_type(&[0x00, 0xff, 0x13, 0x37]),
            "application/octet-stream"
        );
    }
}
