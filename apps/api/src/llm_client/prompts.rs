// Shared prompt fragments.
// Each stage keeps its own prompts next to the code that sends them (see pipeline::prompts);
// this file only holds instructions reused across stages.

/// Appended to any system prompt whose reply is parsed as JSON.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Joins a stage system prompt with the JSON-only instruction.
pub fn json_only_system(system: &str) -> String {
    format!("{}\n\n{}", system.trim_end(), JSON_ONLY_INSTRUCTION)
}
