//! Placeholder expansion for user-prompt templates.

pub const INDUSTRY_TOKEN: &str = "{industry}";
pub const ROLE_TOKEN: &str = "{role}";
pub const RESUME_TEXT_TOKEN: &str = "{resume_text}";

pub const PLACEHOLDER_TOKENS: [&str; 3] = [INDUSTRY_TOKEN, ROLE_TOKEN, RESUME_TEXT_TOKEN];

/// Replaces every placeholder occurrence with its value in one left-to-right pass.
///
/// Substituted values are copied verbatim and never re-scanned, so a resume that
/// happens to contain `{role}` is not rewritten. Unknown `{...}` sequences are kept.
pub fn expand_template(template: &str, industry: &str, role: &str, resume_text: &str) -> String {
    let substitutions = [
        (INDUSTRY_TOKEN, industry),
        (ROLE_TOKEN, role),
        (RESUME_TEXT_TOKEN, resume_text),
    ];

    let mut out = String::with_capacity(template.len() + resume_text.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match substitutions
            .iter()
            .find(|(token, _)| tail.starts_with(token))
        {
            Some((token, value)) => {
                out.push_str(value);
                rest = &tail[token.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Placeholders the template never mentions. Used to warn admins, not to reject.
pub fn missing_placeholders(template: &str) -> Vec<&'static str> {
    PLACEHOLDER_TOKENS
        .iter()
        .copied()
        .filter(|token| !template.contains(token))
        .collect()
}
