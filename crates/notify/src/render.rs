//! HTML bodies for outbox events. Each template is registered from a
//! compiled-in source; unknown template names fall back to a generic
//! field listing so a stray event still produces a readable mail.

use std::collections::BTreeMap;

use tera::{Context, Tera};
use thiserror::Error;

const OVERTIME_APPROVED: &str = r#"<html>
  <body>
    <p>Your overtime order <strong>{{ internal_id }}</strong> has been approved.</p>
    <ul>
      <li>Work date: {{ work_date }}</li>
      <li>Hours: {{ hours }}</li>
      <li>Headcount: {{ headcount }}</li>
    </ul>
    <p>This is an automated message from plantdesk.</p>
  </body>
</html>
"#;

const GENERIC: &str = r#"<html>
  <body>
    <p>A workflow event occurred.</p>
    <ul>
    {% for key, value in fields %}
      <li>{{ key }}: {{ value }}</li>
    {% endfor %}
    </ul>
    <p>This is an automated message from plantdesk.</p>
  </body>
</html>
"#;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template setup failed: {0}")]
    Setup(tera::Error),
    #[error("template rendering failed: {0}")]
    Render(tera::Error),
}

/// Renders the named template with the event's flat field map.
pub fn render_html(
    template: &str,
    fields: &BTreeMap<String, String>,
) -> Result<String, RenderError> {
    let mut tera = Tera::default();
    tera.add_raw_template("overtime-approved", OVERTIME_APPROVED)
        .map_err(RenderError::Setup)?;
    tera.add_raw_template("generic", GENERIC).map_err(RenderError::Setup)?;

    let known = tera.get_template_names().any(|name| name == template);
    if known {
        let mut context = Context::new();
        for (key, value) in fields {
            context.insert(key, value);
        }
        tera.render(template, &context).map_err(RenderError::Render)
    } else {
        let mut context = Context::new();
        context.insert("fields", fields);
        tera.render("generic", &context).map_err(RenderError::Render)
    }
}
