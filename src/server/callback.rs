//! Launch callback pages.
//!
//! The platform's authorization response arrives here as a `form_post`. The
//! page's only job is to relay `{id_token, state}` to the window that opened
//! it, restricted to the tool's own origin, and close itself. All
//! verification happens server-side afterwards; nothing on this page trusts
//! the token.

/// Relay page: posts the launch message to the opener and closes.
///
/// The `postMessage` target origin is pinned to the configured tool origin so
/// the token cannot leak to a foreign opener.
pub fn relay_page(tool_origin: &str, id_token: &str, state: &str) -> String {
    let origin = js_string(tool_origin);
    let id_token = js_string(id_token);
    let state = js_string(state);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Completing launch…</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: white;
        }}
        .container {{
            text-align: center;
            padding: 2rem;
            background: rgba(255,255,255,0.1);
            border-radius: 16px;
            backdrop-filter: blur(10px);
        }}
        h1 {{ margin: 0 0 0.5rem 0; }}
        p {{ margin: 0; opacity: 0.9; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Completing launch…</h1>
        <p>Please wait while we finish authenticating with your LMS.</p>
    </div>
    <script>
        (function () {{
            if (window.opener) {{
                window.opener.postMessage(
                    {{ type: 'lti-launch', id_token: {id_token}, state: {state} }},
                    {origin}
                );
            }}
            setTimeout(function () {{ window.close(); }}, 1000);
        }})();
    </script>
</body>
</html>"#
    )
}

/// Embed a value as a JS string literal. JSON encoding handles quotes and
/// control characters; `<` is additionally unicode-escaped so a value can
/// never close the surrounding script block.
fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
}

/// Error page shown when the platform's response is unusable.
pub fn error_page(error: &str, description: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Launch Failed</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: linear-gradient(135deg, #e74c3c 0%, #c0392b 100%);
            color: white;
        }}
        .container {{
            text-align: center;
            padding: 2rem;
            background: rgba(255,255,255,0.1);
            border-radius: 16px;
            backdrop-filter: blur(10px);
            max-width: 400px;
        }}
        h1 {{ margin: 0 0 0.5rem 0; }}
        p {{ margin: 0; opacity: 0.9; }}
        .error-code {{ font-family: monospace; margin-top: 1rem; opacity: 0.7; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Launch Failed</h1>
        <p>{description}</p>
        <p class="error-code">Error: {error}</p>
    </div>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_page_pins_target_origin() {
        let page = relay_page("https://bridge.example", "tok.en.sig", "state-1");
        assert!(page.contains(r#""https://bridge.example""#));
        assert!(page.contains(r#"type: 'lti-launch'"#));
        assert!(page.contains(r#""tok.en.sig""#));
        assert!(page.contains(r#""state-1""#));
    }

    #[test]
    fn test_relay_page_escapes_script_breakout() {
        let page = relay_page("https://bridge.example", "</script><script>alert(1)", "s");
        // The `<` is unicode-escaped, so the raw closing tag never appears
        // inside the script block.
        assert!(!page.contains("</script><script>alert(1)"));
    }

    #[test]
    fn test_error_page_names_the_error() {
        let page = error_page("missing_id_token", "The platform response had no token.");
        assert!(page.contains("missing_id_token"));
        assert!(page.contains("no token"));
    }
}
