//! Best-effort HTML sanitizer for message bodies
//!
//! Mail clients sanitize again on their side; this only removes the obvious
//! active content before a body leaves the service:
//!
//! 1. `<script>...</script>` blocks
//! 2. `on*=` event handler attributes (quoted or unquoted)
//! 3. `javascript:` schemes
//! 4. `data:` schemes
//!
//! Rule 4 also removes legitimate inline images (`<img src="data:...">`) and
//! any literal `data:` in prose. It stays until someone decides whether
//! inline images should survive.
//!
//! The four rules are applied as a pass, and the pass is repeated until the
//! output stops changing, so a removal can never splice together a new match
//! (`<scr<script></script>ipt>`). Every rule only deletes text, so this
//! terminates.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Script blocks, including attributes on the opening tag
    static ref SCRIPT_BLOCK: Regex =
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap();

    /// Inline event handlers: onclick="...", onload='...', onerror=alert(1)
    static ref EVENT_HANDLER: Regex =
        Regex::new(r#"(?i)\s*\bon\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#).unwrap();

    static ref JAVASCRIPT_SCHEME: Regex = Regex::new(r"(?i)javascript\s*:").unwrap();

    static ref DATA_SCHEME: Regex = Regex::new(r"(?i)data\s*:").unwrap();
}

/// Strip active content from an HTML body
pub fn sanitize_html(html: &str) -> String {
    let mut current = sanitize_pass(html);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(html: &str) -> String {
    let html = SCRIPT_BLOCK.replace_all(html, "");
    let html = EVENT_HANDLER.replace_all(&html, "");
    let html = JAVASCRIPT_SCHEME.replace_all(&html, "");
    DATA_SCHEME.replace_all(&html, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_removes_script_block() {
        assert_eq!(
            sanitize_html("<p>hi</p><script>alert(1)</script>"),
            "<p>hi</p>"
        );
    }

    #[test]
    fn test_removes_script_with_attributes_and_mixed_case() {
        let html = "<div>a</div><ScRiPt type=\"text/javascript\" src=\"x.js\">\nvar a = 1;\n</SCRIPT >b";
        assert_eq!(sanitize_html(html), "<div>a</div>b");
    }

    #[test]
    fn test_keeps_similar_tag_names() {
        assert_eq!(sanitize_html("<scripture>ok</scripture>"), "<scripture>ok</scripture>");
    }

    #[test]
    fn test_removes_event_handlers() {
        assert_eq!(
            sanitize_html(r#"<img src="a.png" onerror="alert(1)">"#),
            r#"<img src="a.png">"#
        );
        assert_eq!(
            sanitize_html("<body onload=init()><p>x</p></body>"),
            "<body><p>x</p></body>"
        );
        assert_eq!(
            sanitize_html("<a href='#' ONCLICK='steal()'>x</a>"),
            "<a href='#'>x</a>"
        );
    }

    #[test]
    fn test_keeps_words_containing_on() {
        assert_eq!(
            sanitize_html(r#"<input name="button" value="lemon">"#),
            r#"<input name="button" value="lemon">"#
        );
    }

    #[test]
    fn test_neutralizes_javascript_scheme() {
        assert_eq!(
            sanitize_html(r#"<a href="JavaScript :alert(1)">x</a>"#),
            r#"<a href="alert(1)">x</a>"#
        );
    }

    #[test]
    fn test_strips_data_scheme_including_inline_images() {
        assert_eq!(
            sanitize_html(r#"<img src="data:image/png;base64,AAAA">"#),
            r#"<img src="image/png;base64,AAAA">"#
        );
    }

    #[test]
    fn test_spliced_payloads_do_not_survive() {
        assert_eq!(sanitize_html("<scr<script></script>ipt>alert(1)</script>"), "");
        assert_eq!(sanitize_html("javajavascript:script:alert(1)"), "alert(1)");
    }

    #[test]
    fn test_plain_html_unchanged() {
        let html = "<h1>Welcome</h1><p>Thanks for <b>signing up</b>.</p>";
        assert_eq!(sanitize_html(html), html);
    }

    fn fragment() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("<script>".to_string()),
            Just("</script>".to_string()),
            Just("<scr".to_string()),
            Just("ipt>".to_string()),
            Just("javascript:".to_string()),
            Just("java".to_string()),
            Just("script:".to_string()),
            Just("data:".to_string()),
            Just("da".to_string()),
            Just("ta:".to_string()),
            Just(" onclick=\"go()\"".to_string()),
            Just(" on".to_string()),
            Just("load=x".to_string()),
            Just("<p>".to_string()),
            Just("</p>".to_string()),
            "[a-z ]{0,6}",
        ]
    }

    proptest! {
        /// Property: sanitizing twice gives the same result as sanitizing once
        #[test]
        fn sanitize_is_idempotent(parts in prop::collection::vec(fragment(), 0..24)) {
            let html = parts.concat();
            let once = sanitize_html(&html);
            prop_assert_eq!(sanitize_html(&once), once);
        }

        /// Property: idempotence holds for arbitrary text as well
        #[test]
        fn sanitize_is_idempotent_on_any_text(html in "\\PC{0,200}") {
            let once = sanitize_html(&html);
            prop_assert_eq!(sanitize_html(&once), once);
        }

        /// Property: closed script blocks never survive
        #[test]
        fn closed_scripts_removed(before in "[a-zA-Z0-9 ]{0,40}", body in "[a-zA-Z0-9();= ]{0,40}") {
            let html = format!("<p>{before}</p><script>{body}</script>");
            let out = sanitize_html(&html);
            prop_assert!(!out.to_lowercase().contains("<script"));
        }

        /// Property: text without markup or schemes passes through untouched
        #[test]
        fn inert_text_untouched(text in "[a-zA-Z0-9 .,!?]{0,120}") {
            prop_assert_eq!(sanitize_html(&text), text);
        }
    }
}
