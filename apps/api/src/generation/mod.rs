// Resume generation: prompt resolution, template expansion and the model call, plus
// the tailor flow that charges the entitlement ledger.
// All LLM calls go through llm_client; no direct Anthropic API calls here.

pub mod generator;
pub mod handlers;
pub mod prompts;
pub mod tailor;
pub mod template;
