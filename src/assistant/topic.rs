//! Topic detection for chat statistics

/// Ordered topic rules; the first rule with a matching keyword wins
const TOPIC_RULES: &[(&[&str], &str)] = &[
    (&["quantum"], "quantum_mechanics"),
    (&["relativity", "einstein"], "relativity"),
    (&["black hole"], "black_holes"),
    (&["particle", "standard model"], "particle_physics"),
    (&["equation", "formula"], "mathematics"),
    (&["cosmology", "universe"], "cosmology"),
];

/// Topic recorded when no rule matches
pub const GENERAL_TOPIC: &str = "general_physics";

/// Label a message with a physics topic
///
/// # Examples
///
/// ```
/// use horizon::assistant::detect_topic;
///
/// assert_eq!(detect_topic("How did Einstein get there?"), "relativity");
/// assert_eq!(detect_topic("Why is the sky blue?"), "general_physics");
/// ```
pub fn detect_topic(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    TOPIC_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map(|(_, topic)| *topic)
        .unwrap_or(GENERAL_TOPIC)
}
