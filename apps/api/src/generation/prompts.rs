// Built-in prompt pair, used when the registry has neither an active nor a default
// version. Bootstrap also seeds it as the default version.

/// Name given to the seeded default prompt version.
pub const BUILT_IN_PROMPT_NAME: &str = "built-in default";

pub const TAILOR_SYSTEM: &str = "You are an expert resume writer and career coach. \
    You rewrite resumes so they read as a strong, honest match for a specific industry and role. \
    Keep every fact from the original resume accurate: never invent employers, titles, dates, \
    degrees, certifications or metrics. \
    Respond with the tailored resume only, as plain text, with no preamble or commentary.";

/// Tailoring prompt template. Placeholders: {industry}, {role}, {resume_text}
pub const TAILOR_PROMPT_TEMPLATE: &str = r#"Tailor the resume below for a {role} position in the {industry} industry.

Guidelines:
1. Lead with a 2-3 sentence professional summary aimed at a {role} in {industry}
2. Reorder and reword experience so the most relevant achievements for {industry} come first
3. Use the vocabulary a {industry} hiring manager expects, but only where the original supports it
4. Keep quantified results; never add numbers that are not in the original
5. Group skills so the ones a {role} needs are listed first
6. Keep the standard sections: Summary, Experience, Education, Skills

ORIGINAL RESUME:
{resume_text}"#;
