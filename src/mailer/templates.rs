/// Message bodies for account emails
///
/// Every template renders a plain-text part and an HTML part sharing one
/// layout.

/// Rendered email content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f4f4f4;">
  <div style="background-color: #ffffff; border-radius: 8px; padding: 30px;">
    <h1 style="color: #2c3e50; margin-top: 0;">{title}</h1>
{body}
  </div>
  <p style="text-align: center; font-size: 12px; color: #777;">This is an automated message, please do not reply.</p>
</body>
</html>"#,
        title = escape(title),
        body = body
    )
}

fn code_block(code: &str, color: &str) -> String {
    format!(
        r#"    <p style="margin: 20px 0; text-align: center;">
      <span style="background-color: {color}; color: white; padding: 15px 30px; border-radius: 5px; display: inline-block; font-size: 24px; font-weight: bold; letter-spacing: 5px;">{code}</span>
    </p>"#,
        color = color,
        code = escape(code)
    )
}

pub fn verification(name: &str, code: &str, ttl_minutes: i64) -> EmailContent {
    let text = format!(
        "Hi {name},\n\nThank you for signing up! Please verify your email address using this verification code:\n\n{code}\n\nThis code will expire in {ttl} minutes.\n\nIf you didn't create an account, please ignore this email.",
        name = name,
        code = code,
        ttl = ttl_minutes
    );
    let body = format!(
        "    <p>Hi {name},</p>\n    <p>Thank you for signing up! Please verify your email address using the verification code below:</p>\n{block}\n    <p>This code will expire in {ttl} minutes.</p>\n    <p>If you didn't create an account, please ignore this email.</p>",
        name = escape(name),
        block = code_block(code, "#4CAF50"),
        ttl = ttl_minutes
    );

    EmailContent {
        subject: "Verify Your Email Address".to_string(),
        text,
        html: layout("Verify Your Email", &body),
    }
}

pub fn password_reset(name: &str, code: &str, ttl_minutes: i64) -> EmailContent {
    let text = format!(
        "Hi {name},\n\nWe received a request to reset your password. Use this reset code:\n\n{code}\n\nThis code will expire in {ttl} minutes.\n\nIf you didn't request a password reset, please ignore this email. Your password will remain unchanged.",
        name = name,
        code = code,
        ttl = ttl_minutes
    );
    let body = format!(
        "    <p>Hi {name},</p>\n    <p>We received a request to reset your password. Use the reset code below:</p>\n{block}\n    <p>This code will expire in {ttl} minutes.</p>\n    <p>If you didn't request a password reset, please ignore this email. Your password will remain unchanged.</p>",
        name = escape(name),
        block = code_block(code, "#2196F3"),
        ttl = ttl_minutes
    );

    EmailContent {
        subject: "Reset Your Password".to_string(),
        text,
        html: layout("Reset Your Password", &body),
    }
}

/// Code for two-factor and login verification
pub fn sign_in_code(name: &str, code: &str, ttl_minutes: i64) -> EmailContent {
    let text = format!(
        "Hi {name},\n\nUse this code to finish signing in:\n\n{code}\n\nThis code will expire in {ttl} minutes.\n\nIf you didn't try to sign in, please change your password.",
        name = name,
        code = code,
        ttl = ttl_minutes
    );
    let body = format!(
        "    <p>Hi {name},</p>\n    <p>Use the code below to finish signing in:</p>\n{block}\n    <p>This code will expire in {ttl} minutes.</p>\n    <p>If you didn't try to sign in, please change your password.</p>",
        name = escape(name),
        block = code_block(code, "#FF9800"),
        ttl = ttl_minutes
    );

    EmailContent {
        subject: "Your Sign-In Code".to_string(),
        text,
        html: layout("Your Sign-In Code", &body),
    }
}

pub fn welcome(name: &str, login_link: &str) -> EmailContent {
    let text = format!(
        "Hi {name},\n\nWelcome aboard! Your account is ready.\n\nLog in: {link}\n\nIf you have any questions, feel free to reach out to our support team.",
        name = name,
        link = login_link
    );
    let body = format!(
        "    <p>Hi {name},</p>\n    <p>Welcome aboard! Your account is ready.</p>\n    <p><a href=\"{link}\">Log in to your account</a></p>\n    <p>If you have any questions, feel free to reach out to our support team.</p>",
        name = escape(name),
        link = escape(login_link)
    );

    EmailContent {
        subject: "Welcome!".to_string(),
        text,
        html: layout("Welcome!", &body),
    }
}
