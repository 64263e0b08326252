// Typed rows returned by the aggregation catalog. Field names mirror the
// projection output of each pipeline (camelCase on the wire).

use crate::model::{Course, User};
use serde::{Deserialize, Serialize};

/// Course detail with its instructor resolved. A missing instructor is
/// reported as absent, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseDetails {
    pub course: Course,
    pub instructor: Option<User>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentMetrics {
    pub course_id: String,
    pub course_title: String,
    pub total_enrollments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroup {
    pub category: String,
    pub courses: Vec<String>,
    pub average_rating: Option<f64>,
    pub total_courses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrade {
    pub student_id: String,
    pub student_name: Option<String>,
    pub average_grade: Option<f64>,
    pub submissions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRate {
    pub course_id: String,
    pub total_enrolled: u64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorStudents {
    pub instructor_id: String,
    pub total_students: u64,
    pub courses_taught: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorRating {
    pub instructor_id: String,
    pub instructor_name: Option<String>,
    pub average_rating: Option<f64>,
    pub courses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorRevenue {
    pub instructor_id: String,
    pub instructor_name: Option<String>,
    pub revenue: f64,
    pub courses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyEnrollments {
    pub year: i32,
    pub month: u32,
    pub total_enrollments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: String,
    pub total_courses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetrics {
    pub student_id: String,
    pub student_name: Option<String>,
    pub total_submissions: u64,
    pub average_grade: Option<f64>,
}
