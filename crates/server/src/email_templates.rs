//! Email template rendering with HTML (Askama) and SCSS styling
use askama::Template;
use once_cell::sync::Lazy;

/// Compiled and inlined CSS from SCSS
static COMPILED_CSS: Lazy<String> = Lazy::new(|| {
    let scss = include_str!("../styles/email.scss");
    grass::from_string(scss.to_string(), &grass::Options::default())
        .expect("Failed to compile SCSS")
});

/// Inline CSS into HTML
#[tracing::instrument(skip(html))]
fn inline_css(html: &str) -> String {
    let options = css_inline::InlineOptions {
        load_remote_stylesheets: false,
        ..css_inline::InlineOptions::default()
    };

    let inliner = css_inline::CSSInliner::new(options);

    // Inject the compiled CSS into the HTML
    let html_with_style = html.replace(
        "</head>",
        &format!("<style>{}</style></head>", COMPILED_CSS.as_str()),
    );

    match inliner.inline(&html_with_style) {
        Ok(inlined) => inlined,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to inline CSS");
            html.to_string()
        }
    }
}

/// Template for password reset emails
#[derive(Template)]
#[template(path = "password_reset_email.html")]
pub struct PasswordResetEmailTemplate {
    pub reset_url: String,
    pub expiry_minutes: i64,
}

impl PasswordResetEmailTemplate {
    #[tracing::instrument(skip(self))]
    pub fn render_html(&self) -> Result<String, askama::Error> {
        let html = self.render()?;
        Ok(inline_css(&html))
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        format!(
            r#"Hello,

We received a request to reset the password for your CloseAuth account.

Use the link below to choose a new password (valid for {} minutes):
{}

If you did not request a reset, you can safely ignore this email - your
password will not be changed.

Best regards,
The CloseAuth Team"#,
            self.expiry_minutes, self.reset_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_reset_email_template() {
        let template = PasswordResetEmailTemplate {
            reset_url: "https://console.example.org/auth/reset-password?token=abc123".to_string(),
            expiry_minutes: 60,
        };

        let html = template.render_html().expect("Failed to render HTML");
        assert!(html.contains("abc123"));
        assert!(html.contains("style="));

        let text = template.render_text();
        assert!(text.contains("abc123"));
        assert!(text.contains("60 minutes"));
    }

    #[test]
    fn test_scss_compilation() {
        let css = &*COMPILED_CSS;
        assert!(!css.is_empty());
        assert!(css.contains("email-container"));
    }
}
