//! Inline HTML for the login form

use oauth_core::PreGrant;

/// Login form for an authorization request that has already been checked
pub fn login_page(form_action: &str, grant: &PreGrant, error: Option<&str>) -> String {
    let state_input = grant
        .state
        .as_deref()
        .map(|s| format!(r#"<input type="hidden" name="state" value="{}">"#, html_escape(s)))
        .unwrap_or_default();
    let status = error
        .map(|e| format!(r#"<div class="status error">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sign in</title>
    <style>{css}</style>
</head>
<body>
    <div class="container">
        <h1>Sign in</h1>
        <p><strong>{client_name}</strong> is requesting access to: <code>{scope}</code></p>
        {status}
        <form method="post" action="{action}">
            <input type="hidden" name="response_type" value="code">
            <input type="hidden" name="client_id" value="{client_id}">
            <input type="hidden" name="redirect_uri" value="{redirect_uri}">
            <input type="hidden" name="scope" value="{scope}">
            {state_input}
            <div class="field">
                <label for="username">Email</label>
                <input type="text" id="username" name="username" required autocomplete="username">
            </div>
            <div class="field">
                <label for="password">Password</label>
                <input type="password" id="password" name="password" required autocomplete="current-password">
            </div>
            <button type="submit">Authorize</button>
        </form>
    </div>
</body>
</html>"#,
        css = CSS_STYLES,
        client_name = html_escape(&grant.client_name),
        scope = html_escape(&grant.scope.to_string()),
        status = status,
        action = html_escape(form_action),
        client_id = html_escape(&grant.client_id),
        redirect_uri = html_escape(&grant.redirect_uri),
        state_input = state_input,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

const CSS_STYLES: &str = r#"
* {
    box-sizing: border-box;
}
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #f4f6fb;
    color: #1f2937;
    margin: 0;
    padding: 20px;
    min-height: 100vh;
    display: flex;
    align-items: center;
    justify-content: center;
}
.container {
    background: #fff;
    padding: 40px;
    border-radius: 12px;
    max-width: 420px;
    width: 100%;
    box-shadow: 0 4px 20px rgba(0,0,0,0.08);
}
h1 {
    margin: 0 0 10px 0;
    font-size: 24px;
}
p {
    color: #4b5563;
    margin: 0 0 20px 0;
    line-height: 1.5;
}
.field {
    margin-bottom: 20px;
}
label {
    display: block;
    margin-bottom: 8px;
    font-size: 14px;
}
input {
    width: 100%;
    padding: 12px;
    border: 1px solid #d1d5db;
    border-radius: 6px;
    font-size: 16px;
}
button {
    display: block;
    width: 100%;
    padding: 14px;
    background: #2563eb;
    color: #fff;
    border: none;
    border-radius: 6px;
    font-size: 16px;
    cursor: pointer;
}
.status.error {
    margin-bottom: 20px;
    padding: 12px;
    border-radius: 6px;
    background: #fee2e2;
    color: #991b1b;
}
code {
    background: #eef2ff;
    padding: 2px 6px;
    border-radius: 4px;
}
"#;
