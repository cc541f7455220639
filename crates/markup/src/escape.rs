//! HTML escaping for text content and attribute values.

/// Escape text content: `&`, `<`, and `>`.
pub fn escape_text(input: &str) -> String {
    if !input.contains(['&', '<', '>']) {
        return input.to_owned();
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape a double-quoted attribute value: text escapes plus `"`.
pub fn escape_attr(input: &str) -> String {
    if !input.contains(['&', '<', '>', '"']) {
        return input.to_owned();
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_escapes_markup_characters() {
        assert_eq!(
            escape_text("a < b && c > d"),
            "a &lt; b &amp;&amp; c &gt; d"
        );
    }

    #[test]
    fn clean_text_is_passed_through() {
        assert_eq!(escape_text("plain text"), "plain text");
    }

    #[test]
    fn attributes_also_escape_quotes() {
        assert_eq!(escape_attr(r#"say "hi" & go"#), "say &quot;hi&quot; &amp; go");
    }
}
