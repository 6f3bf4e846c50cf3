use std::collections::{BTreeSet, HashSet};

use crate::models::Tables;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseFilter {
    All,
    Course(String),
}

impl CourseFilter {
    pub fn from_arg(course: Option<&str>) -> Self {
        match course.map(str::trim) {
            None | Some("") => CourseFilter::All,
            Some(name) => CourseFilter::Course(name.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            CourseFilter::All => "all courses",
            CourseFilter::Course(name) => name,
        }
    }
}

/// Distinct non-blank course names, sorted, for the course selector.
pub fn available_courses(tables: &Tables) -> Vec<String> {
    tables
        .enrollments
        .iter()
        .map(|e| e.course_name.as_str())
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Narrows both tables to one course. Discipline records follow the students
/// enrolled in that course; membership in any course is enough.
pub fn apply(tables: &Tables, filter: &CourseFilter) -> Tables {
    let course = match filter {
        CourseFilter::All => return tables.clone(),
        CourseFilter::Course(course) => course,
    };

    let enrollments: Vec<_> = tables
        .enrollments
        .iter()
        .filter(|e| &e.course_name == course)
        .cloned()
        .collect();

    let students: HashSet<&str> = enrollments.iter().map(|e| e.student_id.as_str()).collect();

    let disciplines: Vec<_> = tables
        .disciplines
        .iter()
        .filter(|d| students.contains(d.student_id.as_str()))
        .cloned()
        .collect();

    tracing::debug!(
        course = %course,
        enrollments = enrollments.len(),
        disciplines = disciplines.len(),
        "applied course filter"
    );

    Tables {
        enrollments,
        disciplines,
    }
}
