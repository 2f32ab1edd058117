//! Fixed prompt templates and the user-visible fallback strings.

use super::AssistKind;
use crate::research::Accuracy;

pub fn summary(topic: &str, accuracy: Accuracy, result_hash: &str) -> String {
    format!(
        "Summarize a medical research finding on the topic of '{topic}' that achieved an \
         accuracy of {accuracy}%. Assume this is a successful initial phase of research. \
         The result hash is {result_hash}. Focus on potential implications, next steps, and \
         its significance in decentralized medical research. Keep the summary concise, \
         around 100-150 words."
    )
}

pub fn next_steps(topic: &str, accuracy: Accuracy) -> String {
    format!(
        "Given a medical research finding on the topic of '{topic}' with an accuracy of \
         {accuracy}%, suggest 3-5 concrete next steps or areas for further investigation. \
         Consider both scientific methodology and the potential for decentralized \
         collaboration. Format as a bulleted list."
    )
}

pub fn explain_term(term: &str) -> String {
    format!(
        "Explain the medical term '{term}' in simple, easy-to-understand language, suitable \
         for a general audience. Keep it concise, around 50-70 words."
    )
}

/// Shown in place of the result when the response had the wrong shape.
pub fn unexpected_response_fallback(kind: AssistKind) -> &'static str {
    match kind {
        AssistKind::Summary => "Failed to generate summary. Unexpected API response.",
        AssistKind::NextSteps => "Failed to suggest next steps. Unexpected API response.",
        AssistKind::ExplainTerm => "Failed to explain term. Unexpected API response.",
    }
}

/// Shown in place of the result when the call itself failed.
pub fn network_failure_fallback(kind: AssistKind) -> &'static str {
    match kind {
        AssistKind::Summary => "Failed to generate summary due to a network error or API issue.",
        AssistKind::NextSteps => {
            "Failed to suggest next steps due to a network error or API issue."
        }
        AssistKind::ExplainTerm => "Failed to explain term due to a network error or API issue.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prompt_embeds_inputs() {
        let accuracy = Accuracy::new(92).expect("valid");
        let prompt = summary("Drug Discovery - Phase 1", accuracy, "0xabc");
        assert!(prompt.starts_with(
            "Summarize a medical research finding on the topic of 'Drug Discovery - Phase 1' \
             that achieved an accuracy of 92%."
        ));
        assert!(prompt.contains("The result hash is 0xabc."));
        assert!(prompt.ends_with("around 100-150 words."));
    }

    #[test]
    fn continuation_lines_keep_single_spaces() {
        let prompt = next_steps("Oncology", Accuracy::new(85).expect("valid"));
        assert!(!prompt.contains("  "));
        assert!(prompt.contains("with an accuracy of 85%, suggest 3-5 concrete next steps"));
        assert!(explain_term("angina").contains("'angina' in simple"));
    }
}
