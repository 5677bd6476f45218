use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::{
        domain::{
            quiz::Quiz,
            quiz_attempt::{QuestionResult, QuizAttempt, QuizAttemptStatus},
            quiz_question::{AnswerValue, QuizQuestion, QuizQuestionType},
        },
        dto::request::SubmitQuizAttemptInput,
    },
    repositories::QuizAttemptRepository,
};

/// Outcome of grading an answer set, before anything is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeResult {
    pub question_results: Vec<QuestionResult>,
    pub points_earned: i32,
    pub total_points: i32,
    pub score: f64,
    pub passed: bool,
}

/// Grades `answers` against `quiz`. Pure: the same inputs always give the same result.
/// Unanswered questions count as incorrect.
pub fn grade(quiz: &Quiz, answers: &BTreeMap<String, AnswerValue>) -> GradeResult {
    let mut questions: Vec<&QuizQuestion> = quiz.questions.iter().collect();
    questions.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut points_earned = 0;
    let mut total_points = 0;
    let mut question_results = Vec::with_capacity(questions.len());

    for question in questions {
        let points_possible = question.points.max(0);
        let submitted = answers.get(&question.id).filter(|answer| !answer.is_blank());
        let is_correct = submitted
            .map(|answer| is_correct(question, answer))
            .unwrap_or(false);
        let earned = if is_correct { points_possible } else { 0 };

        total_points += points_possible;
        points_earned += earned;
        question_results.push(QuestionResult {
            question_id: question.id.clone(),
            answered: submitted.is_some(),
            is_correct,
            points_earned: earned,
            points_possible,
        });
    }

    let score = score_percentage(points_earned, total_points);

    GradeResult {
        question_results,
        points_earned,
        total_points,
        score,
        passed: score >= f64::from(quiz.passing_score),
    }
}

/// Points as a percentage of the total, rounded to two decimals.
pub fn score_percentage(points_earned: i32, total_points: i32) -> f64 {
    if total_points <= 0 {
        return 0.0;
    }
    let raw = f64::from(points_earned) / f64::from(total_points) * 100.0;
    (raw * 100.0).round() / 100.0
}

fn is_correct(question: &QuizQuestion, answer: &AnswerValue) -> bool {
    match question.question_type {
        QuizQuestionType::SingleChoice => {
            let expected = question.correct_answer.as_choices().unwrap_or_default();
            match answer.as_choices().as_deref() {
                Some([single]) => expected
                    .first()
                    .map(|correct| correct.trim() == single.trim())
                    .unwrap_or(false),
                _ => false,
            }
        }
        QuizQuestionType::TrueFalse => match (question.correct_answer.as_flag(), answer.as_flag()) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        },
        QuizQuestionType::MultiSelect => {
            match (question.correct_answer.as_choices(), answer.as_choices()) {
                (Some(expected), Some(given)) => {
                    let expected: BTreeSet<&str> = expected.into_iter().map(str::trim).collect();
                    let given: BTreeSet<&str> = given.into_iter().map(str::trim).collect();
                    !expected.is_empty() && expected == given
                }
                _ => false,
            }
        }
        QuizQuestionType::ShortAnswer => {
            let Some(given) = answer.as_text() else {
                return false;
            };
            let given = given.trim().to_lowercase();
            // Any of several accepted spellings may be stored.
            question
                .correct_answer
                .as_choices()
                .unwrap_or_default()
                .iter()
                .any(|accepted| accepted.trim().to_lowercase() == given)
        }
    }
}

/// Grades a submission and appends it as the learner's next attempt.
pub struct QuizGrader {
    attempts: Arc<dyn QuizAttemptRepository>,
}

impl QuizGrader {
    pub fn new(attempts: Arc<dyn QuizAttemptRepository>) -> Self {
        Self { attempts }
    }

    /// Refuses with `AttemptLimitExceeded` before writing anything when the quiz's
    /// attempts are used up. A submission past the time limit is stored as an
    /// expired, failed attempt. A concurrent submission that took the same attempt
    /// number surfaces as `ConflictRetryable`.
    pub async fn submit(
        &self,
        user_id: &str,
        quiz: &Quiz,
        input: &SubmitQuizAttemptInput,
        now: DateTime<Utc>,
    ) -> AppResult<QuizAttempt> {
        let previous = self.attempts.find_by_user_and_quiz(user_id, &quiz.id).await?;
        let used = previous.len() as i32;

        if let Some(max_attempts) = quiz.max_attempts.filter(|max| *max > 0) {
            if used >= max_attempts {
                return Err(AppError::AttemptLimitExceeded(format!(
                    "All {} attempts for quiz \"{}\" have been used",
                    max_attempts, quiz.title
                )));
            }
        }

        let attempt_number = previous
            .iter()
            .map(|attempt| attempt.attempt_number)
            .max()
            .unwrap_or(0)
            + 1;

        let over_time = match (quiz.time_limit_seconds(), input.elapsed_seconds) {
            (Some(limit), Some(elapsed)) => elapsed > limit,
            _ => false,
        };

        let graded = grade(quiz, &input.answers);
        let (status, points_earned, score, passed) = if over_time {
            log::info!(
                "Attempt {} on quiz {} by user {} exceeded the time limit",
                attempt_number,
                quiz.id,
                user_id
            );
            (QuizAttemptStatus::Expired, 0, 0.0, false)
        } else {
            (
                QuizAttemptStatus::Graded,
                graded.points_earned,
                graded.score,
                graded.passed,
            )
        };

        let attempt = QuizAttempt {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            quiz_id: quiz.id.clone(),
            attempt_number,
            status,
            answers: input.answers.clone(),
            question_results: graded.question_results,
            points_earned,
            total_points: graded.total_points,
            score,
            passing_score: quiz.passing_score,
            passed,
            elapsed_seconds: input.elapsed_seconds,
            submitted_at: now,
        };

        match self.attempts.create(attempt).await {
            Ok(saved) => {
                log::info!(
                    "User {} attempt {} on quiz {}: score {} passed {}",
                    user_id,
                    saved.attempt_number,
                    quiz.id,
                    saved.score,
                    saved.passed
                );
                Ok(saved)
            }
            Err(AppError::AlreadyExists(_)) => Err(AppError::ConflictRetryable(format!(
                "Attempt {} on quiz '{}' was recorded concurrently",
                attempt_number, quiz.id
            ))),
            Err(e) => Err(e),
        }
    }
}
