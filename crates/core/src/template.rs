use std::collections::BTreeMap;

/// Errors produced while filling a template.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("template references unknown variable: {0}")]
    MissingVariable(String),

    #[error("unmatched '{{' in template")]
    UnclosedPlaceholder,
}

/// The variable set available to content templates.
#[derive(Debug, Clone)]
pub struct PromptVars {
    pub assistant_name: String,
    pub brand_type: String,
    pub topic: String,
    pub target_audience: String,
    pub tone: String,
}

impl PromptVars {
    /// View the variables as a name -> value map for substitution.
    pub fn as_map(&self) -> BTreeMap<&'static str, &str> {
        BTreeMap::from([
            ("assistant_name", self.assistant_name.as_str()),
            ("brand_type", self.brand_type.as_str()),
            ("topic", self.topic.as_str()),
            ("target_audience", self.target_audience.as_str()),
            ("tone", self.tone.as_str()),
        ])
    }
}

/// Substitute `{name}` placeholders in a template.
///
/// Doubled braces (`{{` and `}}`) are escapes for literal braces. A
/// placeholder naming a variable that is not in the map is an error, so a
/// typo in a template surfaces instead of leaking `{braces}` into a prompt.
pub fn fill_template(
    template: &str,
    vars: &BTreeMap<&str, &str>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(TemplateError::UnclosedPlaceholder),
                    }
                }
                match vars.get(name.as_str()) {
                    Some(value) => out.push_str(value),
                    None => return Err(TemplateError::MissingVariable(name)),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Wrap a user prompt with optional system instructions.
///
/// With instructions present the prompt is framed under fixed
/// `[SYSTEM INSTRUCTIONS]` / `[USER TASK]` headers; without them the user
/// prompt passes through untouched.
pub fn frame_prompt(user_prompt: &str, system_instructions: Option<&str>) -> String {
    match system_instructions {
        Some(instructions) => format!(
            "[SYSTEM INSTRUCTIONS]\n{instructions}\n\n[USER TASK]\n{user_prompt}"
        ),
        None => user_prompt.to_string(),
    }
}

/// Pull the `instructions` string out of a system-instructions JSON document.
///
/// Returns None for anything that is not a JSON object with a string
/// `instructions` field. Callers treat None as "no system instructions";
/// a broken side file must never fail a generation request.
pub fn parse_system_instructions(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("instructions")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
