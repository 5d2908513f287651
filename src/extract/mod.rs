use once_cell::sync::Lazy;
use regex::Regex;

pub const FENCE: &str = "```";

/// ``` + optional language tag + newline, then the interior up to the next fence.
static TAGGED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```[\w+#.\-]*[^\S\r\n]*\r?\n([\s\S]*?)```").expect("valid fenced-block regex")
});

/// Same-line fences: ```const x = 1```.
static INLINE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```([\s\S]*?)```").expect("valid inline-fence regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub code: String,
    pub design_spec: Option<String>,
}

/// Interior of the first fenced block, trimmed; the whole text trimmed when there is none.
pub fn extract_code(raw: &str) -> String {
    fenced_interior(raw)
        .unwrap_or(raw)
        .trim()
        .to_string()
}

/// Design-spec mode: prose before the first fence is returned next to the code.
pub fn extract_design(raw: &str) -> Extracted {
    let prose = raw.split(FENCE).next().unwrap_or_default().trim();
    Extracted {
        code: extract_code(raw),
        design_spec: Some(prose.to_string()),
    }
}

fn fenced_interior(raw: &str) -> Option<&str> {
    TAGGED_BLOCK
        .captures(raw)
        .or_else(|| INLINE_BLOCK.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
