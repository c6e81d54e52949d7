// Background analysis pipeline.
// Flow: load upload → render pages → stage 1 (enhance JD) → stage 2 (score resume) → persist.
// All model calls go through llm_client; no direct Anthropic calls here.

pub mod prompts;
pub mod render;
pub mod stages;
pub mod worker;
