use std::fs;
use std::path::Path;

use anyhow::Context;
use pricewise_core::recommend::{score, RecommendationResult, Responses, ScoreError};
use serde::Serialize;
use tracing::info;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct RecommendReport<'a> {
    command: &'static str,
    status: &'static str,
    answers: String,
    recommendation: &'a RecommendationResult,
}

pub fn run(answers: &Path) -> CommandResult {
    let responses = match load_responses(answers) {
        Ok(responses) => responses,
        Err(error) => {
            return CommandResult::failure("recommend", "answers_invalid", format!("{error:#}"), 2);
        }
    };

    let result = match score(&responses) {
        Ok(result) => result,
        Err(ScoreError::NoAnswers) => {
            return CommandResult::failure(
                "recommend",
                "no_answers",
                format!("`{}` does not answer any question", answers.display()),
                7,
            );
        }
    };

    info!(
        event_name = "cli.recommend.scored",
        answers = %answers.display(),
        kind = kind_label(&result),
    );

    let report = RecommendReport {
        command: "recommend",
        status: "ok",
        answers: answers.display().to_string(),
        recommendation: &result,
    };
    match serde_json::to_string(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("recommend", "serialization", error.to_string(), 8),
    }
}

/// Reads a TOML answers file whose `kind` selects the questionnaire.
pub fn load_responses(path: &Path) -> anyhow::Result<Responses> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read answers file `{}`", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("could not parse answers file `{}`", path.display()))
}

fn kind_label(result: &RecommendationResult) -> &'static str {
    match result {
        RecommendationResult::Tier(_) => "tier",
        RecommendationResult::Level(_) => "level",
        RecommendationResult::Services(_) => "services",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pricewise_core::recommend::Responses;

    use super::load_responses;

    #[test]
    fn answers_file_selects_the_questionnaire_by_kind() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "kind = \"services\"\npain_points = \"nobody finds us\"")
            .expect("write answers");

        let responses = load_responses(file.path()).expect("answers should parse");
        let Responses::Services(services) = responses else {
            panic!("expected service answers");
        };
        assert_eq!(services.pain_points.as_deref(), Some("nobody finds us"));
    }

    #[test]
    fn unknown_questions_are_rejected_with_the_path_in_context() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "kind = \"tier\"\nfavourite_colour = \"teal\"").expect("write answers");

        let error = load_responses(file.path()).expect_err("unknown field should fail");
        assert!(format!("{error:#}").contains("could not parse answers file"));
    }
}
