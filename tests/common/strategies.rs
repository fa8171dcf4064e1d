use proptest::prelude::*;

use super::{Course, Student};

/// Strategy for generating course names
pub fn course_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z0-9 ]{0,40}"
}

/// Strategy for generating unsaved courses
pub fn new_course_strategy() -> impl Strategy<Value = Course> {
    course_name_strategy().prop_map(|name| Course { id: None, name })
}

/// Strategy for generating unsaved students, with or without a profile
pub fn new_student_strategy() -> impl Strategy<Value = Student> {
    ("[A-Z][a-z]{1,20}", prop::option::of(1i64..=1000)).prop_map(|(name, profile_id)| Student {
        id: None,
        name,
        profile_id,
    })
}

/// Strategy for a storage pre-populated with a few students
pub fn seeded_students_strategy() -> impl Strategy<Value = Vec<Student>> {
    prop::collection::vec(new_student_strategy(), 1..6)
}
