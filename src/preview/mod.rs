//! Turns generated code into something an isolated frame can show.

pub mod debounce;

use minijinja::{context, Environment};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

pub use debounce::Debouncer;

pub const DEFAULT_COMPONENT_NAME: &str = "Component";
pub const EMPTY_PREVIEW_MESSAGE: &str = "Generated code will appear here";

pub const PREVIEW_SCRIPTS: &[&str] = &[
    "https://unpkg.com/react@18/umd/react.development.js",
    "https://unpkg.com/react-dom@18/umd/react-dom.development.js",
    "https://unpkg.com/@babel/standalone/babel.min.js",
    "https://cdn.tailwindcss.com",
];

const WRAPPER: &str = "wrapper";
const PLACEHOLDER: &str = "placeholder";

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    for (name, source) in [
        (WRAPPER, include_str!("templates/wrapper.j2")),
        (PLACEHOLDER, include_str!("templates/placeholder.j2")),
    ] {
        env.add_template(name, source)
            .unwrap_or_else(|err| panic!("invalid preview template `{name}`: {err}"));
    }
    env
});

static FULL_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE\s+html|<html[\s>]").expect("valid document regex"));

static IMPORT_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(?:[\w*{}\s,]+?\s+from\s+)?['"][^'"\n]+['"][ \t]*;?[ \t]*\r?\n?"#)
        .expect("valid import regex")
});

static EXPORT_DEFAULT_ANON_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+default\s+(async\s+)?function\s*\(").expect("valid export regex")
});

static EXPORT_DEFAULT_ANON_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+default\s+class\s*(\{|extends\b)").expect("valid export regex")
});

static EXPORT_DEFAULT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+default\s+(async\s+function|function|class)\b")
        .expect("valid export regex")
});

static EXPORT_DEFAULT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*\r?$\n?")
        .expect("valid export regex")
});

static EXPORT_DEFAULT_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bexport\s+default\s+").expect("valid export regex"));

static EXPORT_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+(const|let|var|function|async\s+function|class)\b")
        .expect("valid export regex")
});

static DEFAULT_EXPORT_DECL_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+default\s+(?:async\s+)?(?:function\s*\*?|class)\s+([A-Za-z_$][\w$]*)")
        .expect("valid export regex")
});

static COMPONENT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:function|class)\s+([A-Z][\w$]*)|\b(?:const|let|var)\s+([A-Z][\w$]*)\s*(?::[^=]+)?=")
        .expect("valid component regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    /// Nothing to show yet.
    Placeholder,
    /// A complete document, loaded byte-for-byte.
    Passthrough,
    /// A fragment wrapped into a runnable document.
    Synthesized,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewDocument {
    pub kind: PreviewKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub html: String,
}

/// What the sandboxed document posts to its parent when mounting fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RenderError {
    /// Accepts only the narrow `{type:"preview-error", ...}` shape.
    pub fn from_message(value: &serde_json::Value) -> Option<Self> {
        if value.get("type")?.as_str()? != "preview-error" {
            return None;
        }
        let message = value.get("message")?.as_str()?.to_string();
        let stack = value
            .get("stack")
            .and_then(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Some(Self { message, stack })
    }

    /// Reported errors are logged and never escalated.
    pub fn report(&self, source: &str) {
        warn!(
            source,
            message = self.message.as_str(),
            stack = self.stack.as_deref().unwrap_or(""),
            "preview render error"
        );
    }
}

pub fn is_full_document(code: &str) -> bool {
    FULL_DOCUMENT.is_match(code)
}

pub fn render(code: &str) -> AppResult<PreviewDocument> {
    if code.trim().is_empty() {
        let html = TEMPLATES
            .get_template(PLACEHOLDER)
            .and_then(|t| t.render(context! { message => EMPTY_PREVIEW_MESSAGE }))
            .map_err(template_error)?;
        return Ok(PreviewDocument {
            kind: PreviewKind::Placeholder,
            component: None,
            html,
        });
    }

    if is_full_document(code) {
        return Ok(PreviewDocument {
            kind: PreviewKind::Passthrough,
            component: None,
            html: code.to_string(),
        });
    }

    let component = find_component_name(code);
    let source = strip_module_syntax(code);
    let html = TEMPLATES
        .get_template(WRAPPER)
        .and_then(|t| {
            t.render(context! {
                scripts => PREVIEW_SCRIPTS,
                source_json => script_literal(&source),
                component_json => script_literal(&component),
            })
        })
        .map_err(template_error)?;

    Ok(PreviewDocument {
        kind: PreviewKind::Synthesized,
        component: Some(component),
        html,
    })
}

/// Module syntax has no meaning inside a single inline script.
pub fn strip_module_syntax(code: &str) -> String {
    let code = IMPORT_STATEMENT.replace_all(code, "");
    let code = EXPORT_DEFAULT_ANON_FUNCTION.replace_all(&code, "${1}function Component(");
    let code = EXPORT_DEFAULT_ANON_CLASS.replace_all(&code, "class Component $1");
    let code = EXPORT_DEFAULT_DECL.replace_all(&code, "$1");
    let code = EXPORT_DEFAULT_NAME.replace_all(&code, "");
    let code = EXPORT_DEFAULT_EXPR.replace_all(&code, "const Component = ");
    EXPORT_KEYWORD.replace_all(&code, "$1").trim().to_string()
}

/// The default export wins; anonymous ones are bound to `Component` by
/// [`strip_module_syntax`]. Without one, the first capitalized declaration.
pub fn find_component_name(code: &str) -> String {
    if EXPORT_DEFAULT_ANON_FUNCTION.is_match(code) || EXPORT_DEFAULT_ANON_CLASS.is_match(code) {
        return DEFAULT_COMPONENT_NAME.to_string();
    }
    if let Some(name) = DEFAULT_EXPORT_DECL_NAME
        .captures(code)
        .or_else(|| EXPORT_DEFAULT_NAME.captures(code))
        .and_then(|c| c.get(1))
    {
        return name.as_str().to_string();
    }
    if EXPORT_DEFAULT_EXPR.is_match(code) {
        return DEFAULT_COMPONENT_NAME.to_string();
    }

    COMPONENT_DECL
        .captures(code)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_COMPONENT_NAME.to_string())
}

/// The isolated frame: scripts on, same-origin access off.
pub fn sandbox_frame(doc: &PreviewDocument) -> String {
    format!(
        r#"<iframe title="Preview" sandbox="allow-scripts" srcdoc="{}" style="width:100%;height:100%;border:0"></iframe>"#,
        html_escape::encode_double_quoted_attribute(&doc.html)
    )
}

/// JSON string literal that cannot close the surrounding script element.
fn script_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('<', "\\u003c")
}

fn template_error(err: minijinja::Error) -> AppError {
    AppError::Config(format!("preview template: {err}"))
}
