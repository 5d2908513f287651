use serde::{Deserialize, Serialize};

/// What the model is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Option<String>")]
pub enum GenerationType {
    #[default]
    Component,
    Page,
    App,
    DesignSpec,
}

impl From<Option<String>> for GenerationType {
    fn from(raw: Option<String>) -> Self {
        match normalize(raw).as_str() {
            "page" => GenerationType::Page,
            "app" => GenerationType::App,
            "designspec" | "design" | "image" => GenerationType::DesignSpec,
            _ => GenerationType::Component,
        }
    }
}

impl GenerationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationType::Component => "component",
            GenerationType::Page => "page",
            GenerationType::App => "app",
            GenerationType::DesignSpec => "designSpec",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum SiteType {
    #[default]
    Website,
    Webapp,
}

impl From<Option<String>> for SiteType {
    fn from(raw: Option<String>) -> Self {
        match normalize(raw).as_str() {
            "webapp" => SiteType::Webapp,
            _ => SiteType::Website,
        }
    }
}

impl SiteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteType::Website => "website",
            SiteType::Webapp => "webapp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum CssFramework {
    None,
    #[default]
    Tailwind,
    Bootstrap,
    Bulma,
    Materialize,
}

impl From<Option<String>> for CssFramework {
    fn from(raw: Option<String>) -> Self {
        match normalize(raw).as_str() {
            "none" => CssFramework::None,
            "bootstrap" => CssFramework::Bootstrap,
            "bulma" => CssFramework::Bulma,
            "materialize" => CssFramework::Materialize,
            _ => CssFramework::Tailwind,
        }
    }
}

impl CssFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            CssFramework::None => "none",
            CssFramework::Tailwind => "tailwind",
            CssFramework::Bootstrap => "bootstrap",
            CssFramework::Bulma => "bulma",
            CssFramework::Materialize => "materialize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>")]
pub enum IconSet {
    #[serde(rename = "none")]
    None,
    #[default]
    #[serde(rename = "fontawesome")]
    Fontawesome,
    #[serde(rename = "lucide")]
    Lucide,
    #[serde(rename = "material-icons")]
    MaterialIcons,
}

impl From<Option<String>> for IconSet {
    fn from(raw: Option<String>) -> Self {
        match normalize(raw).as_str() {
            "none" => IconSet::None,
            "lucide" => IconSet::Lucide,
            "materialicons" => IconSet::MaterialIcons,
            _ => IconSet::Fontawesome,
        }
    }
}

impl IconSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            IconSet::None => "none",
            IconSet::Fontawesome => "fontawesome",
            IconSet::Lucide => "lucide",
            IconSet::MaterialIcons => "material-icons",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>")]
pub enum AnimationLib {
    #[serde(rename = "none")]
    None,
    #[default]
    #[serde(rename = "animatecss")]
    AnimateCss,
    #[serde(rename = "aos")]
    Aos,
}

impl From<Option<String>> for AnimationLib {
    fn from(raw: Option<String>) -> Self {
        match normalize(raw).as_str() {
            "none" => AnimationLib::None,
            "aos" => AnimationLib::Aos,
            _ => AnimationLib::AnimateCss,
        }
    }
}

impl AnimationLib {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationLib::None => "none",
            AnimationLib::AnimateCss => "animatecss",
            AnimationLib::Aos => "aos",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>")]
pub enum OutputFormat {
    #[default]
    #[serde(rename = "single-html")]
    SingleHtml,
    #[serde(rename = "snippet")]
    Snippet,
}

impl From<Option<String>> for OutputFormat {
    fn from(raw: Option<String>) -> Self {
        match normalize(raw).as_str() {
            "snippet" => OutputFormat::Snippet,
            _ => OutputFormat::SingleHtml,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOptions {
    pub site_type: SiteType,
    pub css_framework: CssFramework,
    pub icon_set: IconSet,
    pub animation_lib: AnimationLib,
    #[serde(alias = "format")]
    pub output_format: OutputFormat,
}

/// Body accepted by the generate routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, rename = "type")]
    pub generation_type: GenerationType,
    #[serde(default)]
    pub options: Option<GenerationOptions>,
}

impl GenerationRequest {
    pub fn options(&self) -> GenerationOptions {
        self.options.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub mime_type: String,
    pub data_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub raw_text: String,
    pub extracted_code: String,
    pub model_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_spec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<GeneratedImage>>,
}

fn normalize(raw: Option<String>) -> String {
    raw.unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .replace(['-', '_', ' '], "")
}
