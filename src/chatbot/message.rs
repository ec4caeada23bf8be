//! Inbound chat messages and outbound text chunking.

use std::path::Path;

/// File extensions treated as code whose contents are inlined into the prompt.
pub const CODE_EXTENSIONS: &[&str] = &[
    "py", "rs", "js", "ts", "go", "c", "h", "cpp", "java", "rb", "sh", "toml", "json", "yaml", "yml", "txt",
];

/// A document attached to an inbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    /// Downloaded contents; `None` when the file was not fetched.
    pub data: Option<Vec<u8>>,
}

/// An inbound chat message with the metadata the orchestrator needs.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub display_name: String,
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// Whether `file_name` has one of the recognised code extensions.
pub fn is_code_file(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CODE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

impl ChatMessage {
    /// Content of the user record: the text, followed by the attached file when
    /// it is a code file that was downloaded.
    pub fn user_content(&self) -> String {
        match self.attachment {
            Some(Attachment { ref file_name, data: Some(ref data) }) if is_code_file(file_name) => {
                format!("{}, existing file content: {}", self.text, String::from_utf8_lossy(data))
            }
            _ => self.text.clone(),
        }
    }

    /// No text and no code file: stickers, photos without captions, member
    /// joins and other service messages.
    pub fn is_blank(&self) -> bool {
        let has_code = matches!(
            &self.attachment,
            Some(Attachment { file_name, data: Some(_) }) if is_code_file(file_name)
        );
        self.text.trim().is_empty() && !has_code
    }
}

/// Split `text` into contiguous chunks of at most `max_chars` characters.
///
/// Never splits inside a character; concatenating the chunks yields `text`.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str, attachment: Option<Attachment>) -> ChatMessage {
        ChatMessage {
            message_id: 1,
            chat_id: -100,
            user_id: 42,
            display_name: "Alice".to_string(),
            text: text.to_string(),
            attachment,
        }
    }

    #[test]
    fn test_is_code_file() {
        assert!(is_code_file("main.py"));
        assert!(is_code_file("lib.RS"));
        assert!(is_code_file("dir.name/config.toml"));
        assert!(!is_code_file("photo.jpg"));
        assert!(!is_code_file("Makefile"));
        assert!(!is_code_file(".py"));
    }

    #[test]
    fn test_user_content_plain() {
        assert_eq!(msg("hello", None).user_content(), "hello");
    }

    #[test]
    fn test_user_content_with_code_file() {
        let attachment = Attachment {
            file_name: "main.py".to_string(),
            data: Some(b"print('hi')".to_vec()),
        };
        assert_eq!(
            msg("fix this", Some(attachment)).user_content(),
            "fix this, existing file content: print('hi')"
        );
    }

    #[test]
    fn test_user_content_ignores_other_files() {
        let attachment = Attachment {
            file_name: "photo.png".to_string(),
            data: Some(vec![0x89, 0x50]),
        };
        assert_eq!(msg("look", Some(attachment)).user_content(), "look");
    }

    #[test]
    fn test_user_content_not_downloaded() {
        let attachment = Attachment { file_name: "main.py".to_string(), data: None };
        assert_eq!(msg("look", Some(attachment)).user_content(), "look");
    }

    #[test]
    fn test_user_content_invalid_utf8_is_lossy() {
        let attachment = Attachment {
            file_name: "a.txt".to_string(),
            data: Some(vec![b'o', b'k', 0xff]),
        };
        assert_eq!(
            msg("t", Some(attachment)).user_content(),
            "t, existing file content: ok\u{fffd}"
        );
    }

    #[test]
    fn test_is_blank() {
        assert!(msg("", None).is_blank());
        assert!(msg("  \n", None).is_blank());
        assert!(!msg("hi", None).is_blank());

        let photo = Attachment { file_name: "photo.png".to_string(), data: Some(vec![1]) };
        assert!(msg("", Some(photo)).is_blank());

        let not_fetched = Attachment { file_name: "main.py".to_string(), data: None };
        assert!(msg("", Some(not_fetched)).is_blank());

        let code = Attachment { file_name: "main.py".to_string(), data: Some(b"x = 1".to_vec()) };
        assert!(!msg("", Some(code)).is_blank());
    }

    #[test]
    fn test_split_short_text() {
        assert_eq!(split_chunks("hello", 2000), vec!["hello"]);
        assert!(split_chunks("", 2000).is_empty());
    }

    #[test]
    fn test_split_long_text() {
        let text = "a".repeat(4500);
        let chunks = split_chunks(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2000);
        assert_eq!(chunks[1].len(), 2000);
        assert_eq!(chunks[2].len(), 500);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_exact_multiple() {
        let text = "b".repeat(4000);
        let chunks = split_chunks(&text, 2000);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 2000));
    }

    #[test]
    fn test_split_counts_chars_not_bytes() {
        let text = "é".repeat(5);
        let chunks = split_chunks(&text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_preserves_order_and_bounds() {
        let text: String = (0..5000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for max in [1, 7, 1999, 2000, 2001, 5000, 6000] {
            let chunks = split_chunks(&text, max);
            assert!(chunks.iter().all(|c| !c.is_empty() && c.chars().count() <= max));
            assert_eq!(chunks.concat(), text);
        }
    }
}
