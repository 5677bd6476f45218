use std::collections::{HashMap, HashSet};

use crate::models::{
    domain::{
        course::CourseModule,
        progress::ModuleProgress,
        quiz::{gating_quiz, Quiz},
    },
    dto::response::ModuleAccess,
};

/// Everything the gate looks at for one learner in one course.
pub struct GateContext<'a> {
    /// Published modules in course order.
    pub modules: &'a [CourseModule],
    /// Keyed by module id.
    pub progress: &'a HashMap<String, ModuleProgress>,
    pub quizzes: &'a [Quiz],
    /// Quiz ids the learner holds a passing attempt for.
    pub passed_quizzes: &'a HashSet<String>,
}

/// Accessibility of `module_id`, derived fresh from the context. Returns `None`
/// when the module is not part of the course's published sequence.
pub fn evaluate(ctx: &GateContext<'_>, module_id: &str) -> Option<ModuleAccess> {
    let position = ctx.modules.iter().position(|m| m.id == module_id)?;
    let module = &ctx.modules[position];

    // First in course order.
    if position == 0 {
        return Some(ModuleAccess::unlocked(&module.id));
    }
    if !module.requires_previous_completion {
        return Some(ModuleAccess::unlocked(&module.id));
    }

    let prior = &ctx.modules[position - 1];

    if let Some(quiz) = gating_quiz(ctx.quizzes, &prior.id) {
        if ctx.passed_quizzes.contains(&quiz.id) {
            return Some(ModuleAccess::unlocked(&module.id));
        }
        return Some(ModuleAccess {
            module_id: module.id.clone(),
            accessible: false,
            reason: Some(format!(
                "Complete and pass the quiz for \"{}\" to unlock this module",
                prior.title
            )),
            required_module_id: Some(prior.id.clone()),
            required_quiz_id: Some(quiz.id.clone()),
        });
    }

    let prior_completed = ctx
        .progress
        .get(&prior.id)
        .map(|p| p.is_completed)
        .unwrap_or(false);
    if prior_completed {
        return Some(ModuleAccess::unlocked(&module.id));
    }

    Some(ModuleAccess {
        module_id: module.id.clone(),
        accessible: false,
        reason: Some(format!("Complete \"{}\" to unlock this module", prior.title)),
        required_module_id: Some(prior.id.clone()),
        required_quiz_id: None,
    })
}

/// Gate decision for every module, in course order.
pub fn evaluate_all(ctx: &GateContext<'_>) -> Vec<ModuleAccess> {
    ctx.modules
        .iter()
        .filter_map(|module| evaluate(ctx, &module.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::quiz_question::{AnswerValue, QuizQuestion, QuizQuestionType};
    use chrono::Utc;

    fn module(id: &str, title: &str, order_index: i32, requires_previous: bool) -> CourseModule {
        CourseModule {
            id: id.to_string(),
            course_id: "course-1".to_string(),
            title: title.to_string(),
            order_index,
            requires_previous_completion: requires_previous,
            is_published: true,
        }
    }

    fn quiz_for(module_id: &str, is_required: bool) -> Quiz {
        Quiz {
            id: format!("quiz-{}", module_id),
            course_id: "course-1".to_string(),
            module_id: module_id.to_string(),
            lesson_id: None,
            title: "Checkpoint".to_string(),
            passing_score: 70,
            max_attempts: None,
            time_limit_minutes: None,
            is_required,
            is_published: true,
            questions: vec![QuizQuestion {
                id: "q1".to_string(),
                prompt: "?".to_string(),
                question_type: QuizQuestionType::TrueFalse,
                correct_answer: AnswerValue::Flag(true),
                points: 1,
                order_index: 0,
            }],
        }
    }

    fn completed(module_id: &str) -> ModuleProgress {
        let mut progress = ModuleProgress::new("user-1", "course-1", module_id);
        progress.mark_completed(Utc::now());
        progress
    }

    fn modules() -> Vec<CourseModule> {
        vec![
            module("m-a", "Getting Started", 0, true),
            module("m-b", "Traits", 1, true),
            module("m-c", "Async", 2, false),
        ]
    }

    #[test]
    fn first_module_is_always_unlocked() {
        let modules = modules();
        let ctx = GateContext {
            modules: &modules,
            progress: &HashMap::new(),
            quizzes: &[],
            passed_quizzes: &HashSet::new(),
        };

        let access = evaluate(&ctx, "m-a").expect("module in course");
        assert!(access.accessible);
    }

    #[test]
    fn locked_module_names_predecessor() {
        let modules = modules();
        let ctx = GateContext {
            modules: &modules,
            progress: &HashMap::new(),
            quizzes: &[],
            passed_quizzes: &HashSet::new(),
        };

        let access = evaluate(&ctx, "m-b").expect("module in course");
        assert!(!access.accessible);
        assert_eq!(access.required_module_id.as_deref(), Some("m-a"));
        assert!(access
            .reason
            .as_deref()
            .unwrap_or_default()
            .contains("Getting Started"));
    }

    #[test]
    fn completed_predecessor_unlocks_next() {
        let modules = modules();
        let progress = HashMap::from([("m-a".to_string(), completed("m-a"))]);
        let ctx = GateContext {
            modules: &modules,
            progress: &progress,
            quizzes: &[],
            passed_quizzes: &HashSet::new(),
        };

        assert!(evaluate(&ctx, "m-b").expect("module").accessible);
    }

    #[test]
    fn required_quiz_gates_even_when_predecessor_completed() {
        let modules = modules();
        let quizzes = vec![quiz_for("m-a", true)];
        let progress = HashMap::from([("m-a".to_string(), completed("m-a"))]);
        let ctx = GateContext {
            modules: &modules,
            progress: &progress,
            quizzes: &quizzes,
            passed_quizzes: &HashSet::new(),
        };

        let access = evaluate(&ctx, "m-b").expect("module");
        assert!(!access.accessible);
        assert_eq!(access.required_quiz_id.as_deref(), Some("quiz-m-a"));
        assert!(access
            .reason
            .as_deref()
            .unwrap_or_default()
            .starts_with("Complete and pass the quiz"));

        let passed = HashSet::from(["quiz-m-a".to_string()]);
        let ctx = GateContext {
            passed_quizzes: &passed,
            ..ctx
        };
        assert!(evaluate(&ctx, "m-b").expect("module").accessible);
    }

    #[test]
    fn optional_quiz_does_not_gate() {
        let modules = modules();
        let quizzes = vec![quiz_for("m-a", false)];
        let progress = HashMap::from([("m-a".to_string(), completed("m-a"))]);
        let ctx = GateContext {
            modules: &modules,
            progress: &progress,
            quizzes: &quizzes,
            passed_quizzes: &HashSet::new(),
        };

        assert!(evaluate(&ctx, "m-b").expect("module").accessible);
    }

    #[test]
    fn module_without_prerequisite_flag_is_open() {
        let modules = modules();
        let ctx = GateContext {
            modules: &modules,
            progress: &HashMap::new(),
            quizzes: &[],
            passed_quizzes: &HashSet::new(),
        };

        let all = evaluate_all(&ctx);
        assert_eq!(all.len(), 3);
        assert!(all[2].accessible);
        assert!(evaluate(&ctx, "missing").is_none());
    }
}
