//! Static API documentation served at `/docs`

pub const DOCS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Email Microservice API</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; color: #1f2328; }
    code, pre { background: #f6f8fa; border-radius: 4px; }
    code { padding: 0 0.25rem; }
    pre { padding: 0.75rem; overflow-x: auto; }
    h2 { border-bottom: 1px solid #d0d7de; padding-bottom: 0.25rem; margin-top: 2rem; }
    table { border-collapse: collapse; width: 100%; }
    th, td { border: 1px solid #d0d7de; padding: 0.35rem 0.5rem; text-align: left; vertical-align: top; }
  </style>
</head>
<body>
  <h1>Email Microservice API</h1>
  <p>Relays authenticated HTTP requests to an SMTP server.</p>

  <h2>Authentication</h2>
  <p>Every <code>/api/email/*</code> endpoint requires the API key, sent as either header:</p>
  <pre>X-API-Key: &lt;key&gt;
Authorization: Bearer &lt;key&gt;</pre>

  <h2>Endpoints</h2>
  <table>
    <tr><th>Method</th><th>Path</th><th>Description</th></tr>
    <tr><td>GET</td><td><code>/health</code></td><td>Service and SMTP relay status. <code>503</code> when the relay is unreachable. Not rate limited.</td></tr>
    <tr><td>GET</td><td><code>/</code></td><td>Service metadata.</td></tr>
    <tr><td>GET</td><td><code>/docs</code></td><td>This page.</td></tr>
    <tr><td>GET</td><td><code>/api/email/test</code></td><td>Checks that the API key is accepted.</td></tr>
    <tr><td>POST</td><td><code>/api/email/send</code></td><td>Sends one email. Subject to a stricter rate limit.</td></tr>
  </table>

  <h2>POST /api/email/send</h2>
  <p>JSON (or flat <code>application/x-www-form-urlencoded</code>) body, up to 25&nbsp;MB:</p>
  <pre>{
  "to": "user@example.com",
  "cc": [{ "email": "cc@example.com", "name": "Carbon Copy" }],
  "bcc": ["hidden@example.com"],
  "replyTo": "support@example.com",
  "subject": "Welcome",
  "text": "Plain text body",
  "html": "&lt;p&gt;HTML body&lt;/p&gt;",
  "attachments": [
    { "filename": "report.pdf", "content": "&lt;base64&gt;", "contentType": "application/pdf" }
  ]
}</pre>
  <table>
    <tr><th>Field</th><th>Rules</th></tr>
    <tr><td><code>to</code>, <code>cc</code>, <code>bcc</code></td><td>Address string, <code>{email, name}</code> object, or an array of 1 to 50 of either. Names up to 100 characters.</td></tr>
    <tr><td><code>subject</code></td><td>Required, 1 to 998 characters.</td></tr>
    <tr><td><code>text</code>, <code>html</code></td><td>At least one is required. Up to 1,000,000 and 2,000,000 characters. HTML is sanitized before sending.</td></tr>
    <tr><td><code>attachments</code></td><td>Up to 10. Filename 1 to 255 characters without <code>&lt; &gt; : " / \ | ? *</code>. Content must be base64 and within the configured size limit.</td></tr>
  </table>
  <p>Success:</p>
  <pre>{
  "success": true,
  "message": "Email sent successfully",
  "data": { "messageId": "&lt;...&gt;", "accepted": ["user@example.com"], "rejected": [] }
}</pre>

  <h2>Errors</h2>
  <pre>{ "success": false, "message": "...", "error": { "code": "...", "details": "..." } }</pre>
  <table>
    <tr><th>Code</th><th>Status</th></tr>
    <tr><td><code>AUTH_MISSING</code>, <code>AUTH_INVALID</code></td><td>401</td></tr>
    <tr><td><code>VALIDATION_ERROR</code>, <code>ATTACHMENT_TOO_LARGE</code>, <code>INVALID_ATTACHMENT</code></td><td>400</td></tr>
    <tr><td><code>NOT_FOUND</code></td><td>404</td></tr>
    <tr><td><code>PAYLOAD_TOO_LARGE</code></td><td>413</td></tr>
    <tr><td><code>RATE_LIMIT_EXCEEDED</code>, <code>EMAIL_RATE_LIMIT_EXCEEDED</code></td><td>429</td></tr>
    <tr><td><code>SMTP_SEND_ERROR</code>, <code>INTERNAL_ERROR</code></td><td>500</td></tr>
    <tr><td><code>SMTP_CONNECTION_ERROR</code>, <code>SMTP_AUTH_ERROR</code></td><td>502</td></tr>
  </table>
  <p>Rate-limited responses carry <code>RateLimit-Limit</code>, <code>RateLimit-Remaining</code>, <code>RateLimit-Reset</code> and <code>Retry-After</code> headers.</p>
</body>
</html>
"#;
