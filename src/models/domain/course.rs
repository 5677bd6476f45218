use serde::{Deserialize, Serialize};

/// Catalog entries are owned by the content service; the engine only reads them.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub is_published: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CourseModule {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub order_index: i32,
    pub requires_previous_completion: bool,
    pub is_published: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Lesson {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub order_index: i32,
}

/// Orders modules by position, breaking ties on id so the order is total.
pub fn sort_modules(modules: &mut [CourseModule]) {
    modules.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, order_index: i32) -> CourseModule {
        CourseModule {
            id: id.to_string(),
            course_id: "course-1".to_string(),
            title: format!("Module {}", id),
            order_index,
            requires_previous_completion: true,
            is_published: true,
        }
    }

    #[test]
    fn sort_modules_orders_by_index_then_id() {
        let mut modules = vec![module("c", 2), module("b", 1), module("a", 1)];
        sort_modules(&mut modules);

        let ids: Vec<_> = modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
