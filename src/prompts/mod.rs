use minijinja::{context, Environment};
use once_cell::sync::Lazy;

use crate::{
    error::{AppError, AppResult},
    model::generation::{
        AnimationLib, CssFramework, GenerationOptions, GenerationType, IconSet, OutputFormat,
    },
};

// NOTE:
// Directive templates are compiled into the binary; the builder is pure and
// only the option set and the user prompt flow into them.

const SINGLE_HTML: &str = "single_html";
const COMPONENT: &str = "component";
const PAGE: &str = "page";
const APP: &str = "app";
const DESIGN_SPEC: &str = "design_spec";
const IMAGE: &str = "image";

pub const DEFAULT_STYLE: &str = "modern";

macro_rules! directive_file {
    ($name:literal) => {
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/src/prompts/templates/",
            $name,
            ".j2"
        ))
    };
}

static DIRECTIVES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    for (name, source) in [
        (SINGLE_HTML, directive_file!("single_html")),
        (COMPONENT, directive_file!("component")),
        (PAGE, directive_file!("page")),
        (APP, directive_file!("app")),
        (DESIGN_SPEC, directive_file!("design_spec")),
        (IMAGE, directive_file!("image")),
    ] {
        env.add_template(name, source)
            .unwrap_or_else(|err| panic!("invalid directive template `{name}`: {err}"));
    }
    env
});

/// Which rule set a request is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Component,
    Page,
    App,
    DesignSpec,
    SingleHtml,
}

impl DirectiveKind {
    pub fn select(generation_type: GenerationType, options: &GenerationOptions) -> Self {
        match (generation_type, options.output_format) {
            (GenerationType::DesignSpec, _) => DirectiveKind::DesignSpec,
            (_, OutputFormat::SingleHtml) => DirectiveKind::SingleHtml,
            (GenerationType::Component, OutputFormat::Snippet) => DirectiveKind::Component,
            (GenerationType::Page, OutputFormat::Snippet) => DirectiveKind::Page,
            (GenerationType::App, OutputFormat::Snippet) => DirectiveKind::App,
        }
    }

    fn template(&self) -> &'static str {
        match self {
            DirectiveKind::Component => COMPONENT,
            DirectiveKind::Page => PAGE,
            DirectiveKind::App => APP,
            DirectiveKind::DesignSpec => DESIGN_SPEC,
            DirectiveKind::SingleHtml => SINGLE_HTML,
        }
    }
}

/// One `<link>`/`<script>` hint per selected library; `none` contributes nothing.
pub fn cdn_hints(options: &GenerationOptions) -> Vec<&'static str> {
    let mut hints = Vec::with_capacity(3);

    match options.css_framework {
        CssFramework::None => {}
        CssFramework::Tailwind => {
            hints.push(r#"- Tailwind: <script src="https://cdn.tailwindcss.com"></script>"#)
        }
        CssFramework::Bootstrap => hints.push(
            r#"- Bootstrap 5 CSS: <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/bootstrap@5/dist/css/bootstrap.min.css"> and JS: <script src="https://cdn.jsdelivr.net/npm/bootstrap@5/dist/js/bootstrap.bundle.min.js"></script>"#,
        ),
        CssFramework::Bulma => hints.push(
            r#"- Bulma: <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/bulma@0.9.4/css/bulma.min.css">"#,
        ),
        CssFramework::Materialize => hints.push(
            r#"- Materialize: <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/materialize/1.0.0/css/materialize.min.css"> and JS: <script src="https://cdnjs.cloudflare.com/ajax/libs/materialize/1.0.0/js/materialize.min.js"></script>"#,
        ),
    }

    match options.icon_set {
        IconSet::None => {}
        IconSet::Fontawesome => hints.push(
            r#"- Font Awesome: <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.5.2/css/all.min.css">"#,
        ),
        IconSet::Lucide => hints.push(
            r#"- Lucide: <script src="https://unpkg.com/lucide@latest"></script> (use <i data-lucide="icon-name"></i> and lucide.createIcons())"#,
        ),
        IconSet::MaterialIcons => hints.push(
            r#"- Material Icons: <link href="https://fonts.googleapis.com/icon?family=Material+Icons" rel="stylesheet">"#,
        ),
    }

    match options.animation_lib {
        AnimationLib::None => {}
        AnimationLib::AnimateCss => hints.push(
            r#"- Animate.css: <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/animate.css/4.1.1/animate.min.css">"#,
        ),
        AnimationLib::Aos => hints.push(
            r#"- AOS: <link rel="stylesheet" href="https://unpkg.com/aos@2.3.4/dist/aos.css"> and <script src="https://unpkg.com/aos@2.3.4/dist/aos.js"></script> then AOS.init()"#,
        ),
    }

    hints
}

/// Directive text for a request, without the user prompt.
pub fn directive(kind: DirectiveKind, options: &GenerationOptions, style: &str) -> AppResult<String> {
    let hints = cdn_hints(options);
    render(
        kind.template(),
        context! {
            site_type => options.site_type.as_str(),
            css => options.css_framework.as_str(),
            icons => options.icon_set.as_str(),
            anim => options.animation_lib.as_str(),
            hints => hints,
            style => style,
        },
    )
}

/// Final instruction string: directive followed by the raw user request.
pub fn build_prompt(
    generation_type: GenerationType,
    options: &GenerationOptions,
    user_prompt: &str,
) -> AppResult<String> {
    let kind = DirectiveKind::select(generation_type, options);
    let directive = directive(kind, options, DEFAULT_STYLE)?;
    Ok(append_request(&directive, user_prompt))
}

pub fn build_design_prompt(style: &str, user_prompt: &str) -> AppResult<String> {
    let directive = directive(
        DirectiveKind::DesignSpec,
        &GenerationOptions::default(),
        normalize_style(style),
    )?;
    Ok(append_request(&directive, user_prompt))
}

pub fn build_image_prompt(style: &str, user_prompt: &str) -> AppResult<String> {
    let directive = render(IMAGE, context! { style => normalize_style(style) })?;
    Ok(append_request(&directive, user_prompt))
}

fn append_request(directive: &str, user_prompt: &str) -> String {
    format!("{directive}\n\nUser Request:\n{user_prompt}")
}

fn normalize_style(style: &str) -> &str {
    let trimmed = style.trim();
    if trimmed.is_empty() {
        DEFAULT_STYLE
    } else {
        trimmed
    }
}

fn render(name: &str, ctx: minijinja::Value) -> AppResult<String> {
    DIRECTIVES
        .get_template(name)
        .and_then(|tmpl| tmpl.render(ctx))
        .map_err(|err| AppError::Config(format!("directive `{name}` failed to render: {err}")))
}
