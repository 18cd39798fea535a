//! Prompt template for Gherkin generation
//!
//! One fixed instruction block with a single substitution point for the user story.

/// Instruction text placed before the user story
const GHERKIN_INSTRUCTIONS: &str = r#"You are a QA automation expert. Output only a **single valid Gherkin scenario** using the user story below.

Your output must follow *exactly* this format and structure:

Feature: <short feature name>

  Scenario: <concise scenario title>
    Given <initial condition>
    When <trigger action>
    Then <result>

"#;

/// Build the model prompt for a user story.
///
/// The story is inserted verbatim; nothing in it is interpreted as a placeholder.
pub fn format_prompt(input: &str) -> String {
    let mut prompt = String::with_capacity(GHERKIN_INSTRUCTIONS.len() + input.len() + 16);
    prompt.push_str(GHERKIN_INSTRUCTIONS);
    prompt.push_str("User story: ");
    prompt.push_str(input);
    prompt.push('\n');
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_at_end_of_template() {
        let prompt = format_prompt("X");
        assert!(prompt.starts_with("You are a QA automation expert."));
        assert!(prompt.ends_with("    Then <result>\n\nUser story: X\n"));
    }

    #[test]
    fn test_single_substitution_point() {
        let prompt = format_prompt("As a user, I want to log in.");
        assert_eq!(prompt.matches("User story:").count(), 1);
        assert!(prompt.contains("User story: As a user, I want to log in."));
    }

    #[test]
    fn test_braces_are_not_expanded() {
        let prompt = format_prompt("{input} and {{literal}}");
        assert!(prompt.ends_with("User story: {input} and {{literal}}\n"));
    }

    #[test]
    fn test_empty_and_multiline_input() {
        assert!(format_prompt("").ends_with("User story: \n"));

        let prompt = format_prompt("line one\nline two");
        assert!(prompt.ends_with("User story: line one\nline two\n"));
    }
}
