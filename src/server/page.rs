//! Fallback log page
//!
//! Served to clients that do not ask for an event stream (a browser opening
//! the stream URL directly). The page connects back to the same URL with
//! `EventSource` and appends every non-empty message to a scrolling log.

/// Render the page for a request target
pub fn render(target: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body style="background-color: #333; color: #eee">
    <pre id="logs" style="position: fixed; top: 0; bottom: 0; left: 0; right: 0; padding: 0 8px; overflow: auto"></pre>
    <script>
        const logBox = document.getElementById('logs');
        const es = new EventSource('{}');

        es.onmessage = function(event) {{
            const msg = event.data.trim();

            if (!msg.length) return;

            const follow = logBox.scrollTop + logBox.clientHeight >= logBox.scrollHeight - 4;
            logBox.textContent += msg + "\n";
            if (follow) logBox.scrollTop = logBox.scrollHeight;
        }};
    </script>
</body>
</html>
"#,
        escape_js(target)
    )
}

/// Escape a value for a single-quoted script string inside HTML
fn escape_js(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '<' => escaped.push_str("\\x3c"),
            '>' => escaped.push_str("\\x3e"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_points_back_to_target() {
        let page = render("/log?level=info");

        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("new EventSource('/log?level=info')"));
    }

    #[test]
    fn test_target_escaped() {
        let page = render("/x'</script>");

        assert!(page.contains(r"new EventSource('/x\'\x3c/script\x3e')"));
        assert!(!page.contains("/x'</script>"));
    }
}
