use super::ScoringRequest;
use crate::job::Dimension;

/// Longest transcript or question passed to the model, in characters.
const MAX_FIELD_CHARS: usize = 8000;

/// English name of a language code, used to tell the model which language
/// to write its explanations in. Unknown codes are passed through.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "pl" => "Polish",
        "ru" => "Russian",
        "uk" => "Ukrainian",
        "tr" => "Turkish",
        "uz" => "Uzbek",
        "kk" => "Kazakh",
        "ar" => "Arabic",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "ko" => "Korean",
        "hi" => "Hindi",
        other => other,
    }
}

/// Strips control characters (except newlines and tabs) and caps the length
/// of user-provided text before it is embedded in the prompt.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(MAX_FIELD_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

fn response_template() -> String {
    let mut lines = vec!["  \"level\": \"one of A1, A2, B1, B2, C1, C2\"".to_string()];
    for dimension in Dimension::ALL {
        lines.push(format!(
            "  \"{key}\": \"{desc}\"",
            key = dimension.key(),
            desc = dimension.description()
        ));
        lines.push(format!("  \"{}_score\": number from 0 to 100", dimension.key()));
    }
    lines.push("  \"overall_score\": average of all scores above".to_string());
    format!("{{\n{}\n}}", lines.join(",\n"))
}

/// Builds the single user message sent to the chat model.
pub fn build_prompt(request: &ScoringRequest) -> String {
    let language = language_name(&request.language);
    format!(
        "We need to evaluate the user's language proficiency. Below are the details:\n\
         Language: {language}\n\
         Question content: {question}\n\
         User's answer to this question: {transcript}\n\n\
         Evaluate the answer on every field below, with scores from 0 to 100.\n\
         Return the result in exactly this JSON format:\n\
         {template}\n\n\
         Important notes:\n\
         1. Write all descriptive fields in {language}.\n\
         2. The response must strictly follow the JSON structure above.\n\
         3. Send only the JSON object, without any additional text or explanation.",
        language = language,
        question = sanitize_for_prompt(&request.question),
        transcript = sanitize_for_prompt(&request.transcript),
        template = response_template(),
    )
}
