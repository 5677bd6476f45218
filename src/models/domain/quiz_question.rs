use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub question_type: QuizQuestionType,
    pub correct_answer: AnswerValue,
    pub points: i32,
    pub order_index: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Copy)]
#[serde(rename_all = "snake_case")]
pub enum QuizQuestionType {
    SingleChoice, // One option id or value
    TrueFalse,
    MultiSelect, // Every correct option and nothing else
    ShortAnswer, // Free text, case-insensitive
}

/// A submitted or expected answer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    /// True/false answers arrive both as JSON booleans and as strings.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AnswerValue::Flag(value) => Some(*value),
            AnswerValue::Text(text) => match text.trim().to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            AnswerValue::Choices(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// A single string is accepted as a one-element selection.
    pub fn as_choices(&self) -> Option<Vec<&str>> {
        match self {
            AnswerValue::Choices(values) => Some(values.iter().map(String::as_str).collect()),
            AnswerValue::Text(text) => Some(vec![text.as_str()]),
            AnswerValue::Flag(_) => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Flag(_) => false,
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Choices(values) => values.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_type_uses_snake_case_names() {
        let json = serde_json::to_string(&QuizQuestionType::MultiSelect).expect("serialize");
        assert_eq!(json, "\"multi_select\"");

        let parsed: Result<QuizQuestionType, _> = serde_json::from_str("\"essay\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn answer_value_deserializes_each_shape() {
        let flag: AnswerValue = serde_json::from_str("true").expect("flag");
        let text: AnswerValue = serde_json::from_str("\"b\"").expect("text");
        let choices: AnswerValue = serde_json::from_str("[\"a\",\"c\"]").expect("choices");

        assert_eq!(flag, AnswerValue::Flag(true));
        assert_eq!(text, AnswerValue::Text("b".to_string()));
        assert_eq!(
            choices,
            AnswerValue::Choices(vec!["a".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn as_flag_accepts_string_booleans() {
        assert_eq!(AnswerValue::Text(" True ".to_string()).as_flag(), Some(true));
        assert_eq!(AnswerValue::Text("nope".to_string()).as_flag(), None);
    }

    #[test]
    fn blank_answers_are_detected() {
        assert!(AnswerValue::Text("   ".to_string()).is_blank());
        assert!(AnswerValue::Choices(vec![]).is_blank());
        assert!(!AnswerValue::Flag(false).is_blank());
    }
}
