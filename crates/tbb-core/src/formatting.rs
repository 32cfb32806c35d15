/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `<a href="...">label</a>` with both parts escaped.
pub fn html_link(label: &str, href: &str) -> String {
    format!(
        r#"<a href="{}">{}</a>"#,
        escape_html(href),
        escape_html(label)
    )
}

/// Cut `s` to `max_chars` characters, appending `...` when something was cut.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
