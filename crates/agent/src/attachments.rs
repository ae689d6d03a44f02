//! Inline image attachments in user messages.
//!
//! A front end attaches an image by writing `[Attached Image: /path/to.png]`
//! into the message. Each marker becomes a base64 data-URL image part; the
//! remaining text becomes the leading text part.

use std::path::Path;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bonza_core::message::{ContentPart, ImageUrl, MessageContent};
use regex_lite::Regex;
use tracing::{error, warn};

static ATTACHMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Attached Image: (.*?)\]").expect("attachment marker regex must compile")
});

/// Build the user content for `text`, expanding image markers.
///
/// Text without markers stays plain text. Missing or unreadable images are
/// dropped from the message.
pub fn build_user_content(text: &str) -> MessageContent {
    if !ATTACHMENT.is_match(text) {
        return MessageContent::Text(text.to_string());
    }

    let mut parts = Vec::new();

    let stripped = ATTACHMENT.replace_all(text, "");
    let stripped = stripped.trim();
    if !stripped.is_empty() {
        parts.push(ContentPart::Text {
            text: stripped.to_string(),
        });
    }

    for cap in ATTACHMENT.captures_iter(text) {
        let path = Path::new(cap[1].trim());
        if !path.exists() {
            warn!(path = %path.display(), "Attached image not found");
            continue;
        }
        match std::fs::read(path) {
            Ok(bytes) => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{};base64,{}", mime_for(path), STANDARD.encode(bytes)),
                },
            }),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to load image"),
        }
    }

    if parts.is_empty() {
        return MessageContent::Text(text.to_string());
    }
    MessageContent::Parts(parts)
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(
            build_user_content("hello"),
            MessageContent::Text("hello".into())
        );
    }

    #[test]
    fn marker_becomes_image_part() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("shot.png");
        std::fs::write(&img, [0x89, b'P', b'N', b'G']).unwrap();

        let content =
            build_user_content(&format!("what is this? [Attached Image: {}]", img.display()));

        let MessageContent::Parts(parts) = content else {
            panic!("expected multipart content");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0],
            ContentPart::Text {
                text: "what is this?".into()
            }
        );
        match &parts[1] {
            ContentPart::ImageUrl { image_url } => {
                assert!(image_url.url.starts_with("data:image/png;base64,"));
                assert!(image_url.url.ends_with(&STANDARD.encode([0x89, b'P', b'N', b'G'])));
            }
            other => panic!("expected image part, got {other:?}"),
        }
    }

    #[test]
    fn missing_image_is_skipped() {
        let content = build_user_content("look [Attached Image: /no/such/file.jpg]");
        assert_eq!(
            content,
            MessageContent::Parts(vec![ContentPart::Text {
                text: "look".into()
            }])
        );
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a")), "image/jpeg");
    }
}
