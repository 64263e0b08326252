// The named query/aggregation catalog. Every operation is a deterministic
// function of its parameters and the current collection state; pipelines
// order their stages filter-before-join-before-group-before-sort wherever
// the results are equivalent, to keep intermediate sets small.

mod results;

pub use results::*;

use crate::document::Document;
use crate::error::{EduHubError, Result};
use crate::filter::Filter;
use crate::model::{Course, Lesson, Role, User};
use crate::pipeline::{
    Accumulator, GroupKey, ProjectField, ProjectSource, SortKey, Stage,
};
use crate::store::{Store, UpdateReport};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Named operations over an EduHub store.
pub struct Catalog<'a> {
    store: &'a Store,
}

impl<'a> Catalog<'a> {
    pub fn new(store: &'a Store) -> Self {
        Catalog { store }
    }

    // ── Point lookups ──────────────────────────────────────────────

    pub fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        match self.store.collection("users")?.get(user_id) {
            Some(doc) => Ok(Some(typed(doc)?)),
            None => Ok(None),
        }
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        match self
            .store
            .collection("users")?
            .find_one(&Filter::eq("email", email))?
        {
            Some(doc) => Ok(Some(typed(doc)?)),
            None => Ok(None),
        }
    }

    // ── Filtered scans ─────────────────────────────────────────────

    /// All users with role=student and isActive=true.
    pub fn active_students(&self) -> Result<Vec<User>> {
        let filter = Filter::and(vec![
            Filter::eq("role", "student"),
            Filter::eq("isActive", true),
        ]);
        docs_to(self.store.collection("users")?.find(&filter)?)
    }

    pub fn courses_by_category(&self, category: &str) -> Result<Vec<Course>> {
        docs_to(
            self.store
                .collection("courses")?
                .find(&Filter::eq("category", category))?,
        )
    }

    /// Courses priced within [min, max], bounds inclusive.
    pub fn courses_in_price_range(&self, min: f64, max: f64) -> Result<Vec<Course>> {
        let filter = Filter::and(vec![Filter::gte("price", min), Filter::lte("price", max)]);
        docs_to(self.store.collection("courses")?.find(&filter)?)
    }

    /// Courses whose tags array contains at least one of the keywords.
    pub fn courses_with_keywords(&self, keywords: &[&str]) -> Result<Vec<Course>> {
        let values = keywords.iter().map(|k| json!(k)).collect();
        docs_to(
            self.store
                .collection("courses")?
                .find(&Filter::AnyIn("tags".into(), values))?,
        )
    }

    /// Users who joined on or after the given instant.
    pub fn recent_signups(&self, since: DateTime<Utc>) -> Result<Vec<User>> {
        docs_to(
            self.store
                .collection("users")?
                .find(&Filter::gte("dateJoined", since.to_rfc3339()))?,
        )
    }

    /// Assignments due within [from, to], bounds inclusive.
    pub fn assignments_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<crate::model::Assignment>> {
        let filter = Filter::and(vec![
            Filter::gte("dueDate", from.to_rfc3339()),
            Filter::lte("dueDate", to.to_rfc3339()),
        ]);
        docs_to(self.store.collection("assignments")?.find(&filter)?)
    }

    /// Case-insensitive substring search against course titles.
    pub fn search_courses_by_title(&self, text: &str) -> Result<Vec<Course>> {
        docs_to(
            self.store
                .collection("courses")?
                .find(&Filter::contains("title", text))?,
        )
    }

    // ── Joined views ───────────────────────────────────────────────

    /// Every course with its instructor profile resolved. A course whose
    /// instructorId matches no user still appears, with instructor absent.
    pub fn course_details(&self) -> Result<Vec<CourseDetails>> {
        let rows = self.store.aggregate(
            "courses",
            &[
                Stage::Lookup {
                    from: "users".into(),
                    local_field: "instructorId".into(),
                    foreign_field: "userId".into(),
                    as_field: "instructor".into(),
                },
                Stage::Unwind {
                    path: "instructor".into(),
                    preserve_empty: true,
                },
            ],
        )?;

        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            let instructor_value = row
                .as_object_mut()
                .and_then(|obj| obj.remove("instructor"))
                .unwrap_or(Value::Null);
            let instructor = match instructor_value {
                Value::Null => None,
                v => Some(serde_json::from_value(v)?),
            };
            let course: Course = serde_json::from_value(row)?;
            out.push(CourseDetails { course, instructor });
        }
        Ok(out)
    }

    /// Users enrolled in the given course.
    pub fn students_in_course(&self, course_id: &str) -> Result<Vec<User>> {
        let enrollments = self
            .store
            .collection("enrollments")?
            .find(&Filter::eq("courseId", course_id))?;

        let student_ids: Vec<Value> = enrollments
            .iter()
            .filter_map(|e| e.field("studentId").cloned())
            .collect();

        docs_to(
            self.store
                .collection("users")?
                .find(&Filter::In("userId".into(), student_ids))?,
        )
    }

    // ── CRUD operations ────────────────────────────────────────────

    /// Insert a new student; the role is forced regardless of input.
    pub fn insert_student(&self, mut user: User) -> Result<String> {
        user.role = Role::Student;
        self.store
            .collection("users")?
            .insert(serde_json::to_value(&user)?)
    }

    pub fn insert_course(&self, course: Course) -> Result<String> {
        self.store
            .collection("courses")?
            .insert(serde_json::to_value(&course)?)
    }

    pub fn insert_lesson(&self, lesson: Lesson) -> Result<String> {
        self.store
            .collection("lessons")?
            .insert(serde_json::to_value(&lesson)?)
    }

    /// Register a student to a course: creates a fresh enrollment with
    /// zero progress. Returns the generated enrollment id.
    pub fn enroll_student(&self, student_id: &str, course_id: &str) -> Result<String> {
        self.store.collection("enrollments")?.insert(json!({
            "studentId": student_id,
            "courseId": course_id,
            "enrollmentDate": Utc::now().to_rfc3339(),
            "progress": 0.0,
            "completed": false,
            "certificateIssued": false,
        }))
    }

    /// Replace a user's profile object.
    pub fn update_profile(&self, user_id: &str, profile: Value) -> Result<UpdateReport> {
        self.store
            .collection("users")?
            .update(user_id, json!({ "profile": profile }))
    }

    pub fn publish_course(&self, course_id: &str) -> Result<UpdateReport> {
        self.store
            .collection("courses")?
            .update(course_id, json!({ "isPublished": true }))
    }

    pub fn grade_submission(
        &self,
        submission_id: &str,
        grade: f64,
        feedback: Option<&str>,
    ) -> Result<UpdateReport> {
        let mut fields = json!({ "grade": grade });
        if let Some(feedback) = feedback {
            fields["feedback"] = json!(feedback);
        }
        self.store
            .collection("submissions")?
            .update(submission_id, fields)
    }

    /// Add tags to a course with set semantics.
    pub fn add_course_tags(&self, course_id: &str, tags: &[&str]) -> Result<UpdateReport> {
        let values = tags.iter().map(|t| json!(t)).collect();
        self.store
            .collection("courses")?
            .add_to_set(course_id, "tags", values)
    }

    /// Soft delete: the user document stays, with isActive=false.
    pub fn deactivate_user(&self, user_id: &str) -> Result<UpdateReport> {
        self.store
            .collection("users")?
            .update(user_id, json!({ "isActive": false }))
    }

    /// Hard delete an enrollment. Returns false when the id is absent.
    pub fn delete_enrollment(&self, enrollment_id: &str) -> Result<bool> {
        self.store.collection("enrollments")?.delete(enrollment_id)
    }

    /// Detach a lesson from a course by clearing its courseId. No-op when
    /// the lesson does not exist or belongs to a different course.
    pub fn detach_lesson(&self, lesson_id: &str, course_id: &str) -> Result<UpdateReport> {
        let lessons = self.store.collection("lessons")?;
        match lessons.get(lesson_id) {
            Some(doc) if doc.field("courseId").and_then(Value::as_str) == Some(course_id) => {
                lessons.update(lesson_id, json!({ "courseId": "" }))
            }
            _ => Ok(UpdateReport::NONE),
        }
    }

    // ── Aggregations ───────────────────────────────────────────────

    /// Enrollment count per course, with the course title resolved.
    pub fn enrollment_metrics(&self) -> Result<Vec<EnrollmentMetrics>> {
        let rows = self.store.aggregate(
            "enrollments",
            &[
                Stage::Group {
                    key: GroupKey::Field("courseId".into()),
                    accumulators: vec![("totalEnrollments".into(), Accumulator::Count)],
                },
                Stage::Lookup {
                    from: "courses".into(),
                    local_field: "_id".into(),
                    foreign_field: "courseId".into(),
                    as_field: "course".into(),
                },
                Stage::Unwind {
                    path: "course".into(),
                    preserve_empty: false,
                },
                Stage::Project(vec![
                    ProjectField::path("courseId", "_id"),
                    ProjectField::path("courseTitle", "course.title"),
                    ProjectField::path("totalEnrollments", "totalEnrollments"),
                ]),
            ],
        )?;
        rows_to(rows)
    }

    /// Average rating across all courses.
    pub fn average_course_rating(&self) -> Result<RatingSummary> {
        let rows = self.store.aggregate(
            "courses",
            &[Stage::Group {
                key: GroupKey::Null,
                accumulators: vec![
                    ("averageRating".into(), Accumulator::Avg("rating".into())),
                    ("count".into(), Accumulator::Count),
                ],
            }],
        )?;

        match rows.into_iter().next() {
            Some(row) => Ok(serde_json::from_value(row)?),
            None => Ok(RatingSummary {
                average_rating: None,
                count: 0,
            }),
        }
    }

    /// Per-category course titles, average rating, and count.
    pub fn courses_grouped_by_category(&self) -> Result<Vec<CategoryGroup>> {
        let rows = self.store.aggregate(
            "courses",
            &[
                Stage::Group {
                    key: GroupKey::Field("category".into()),
                    accumulators: vec![
                        ("courses".into(), Accumulator::Push("title".into())),
                        ("averageRating".into(), Accumulator::Avg("rating".into())),
                        ("totalCourses".into(), Accumulator::Count),
                    ],
                },
                Stage::Project(vec![
                    ProjectField::path("category", "_id"),
                    ProjectField::path("courses", "courses"),
                    ProjectField::path("averageRating", "averageRating"),
                    ProjectField::path("totalCourses", "totalCourses"),
                ]),
            ],
        )?;
        rows_to(rows)
    }

    /// Average grade and submission count per student, with the student
    /// name resolved. Empty submissions yield an empty result, not an error.
    pub fn average_grade_per_student(&self) -> Result<Vec<StudentGrade>> {
        let rows = self
            .store
            .aggregate("submissions", &grade_per_student_stages(None))?;
        rows_to(rows)
    }

    /// Completion rate per course: completed enrollments over total.
    pub fn course_completion_rate(&self) -> Result<Vec<CompletionRate>> {
        let rows = self.store.aggregate(
            "enrollments",
            &[Stage::Group {
                key: GroupKey::Field("courseId".into()),
                accumulators: vec![
                    ("total".into(), Accumulator::Count),
                    ("completed".into(), Accumulator::Sum("completed".into())),
                ],
            }],
        )?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let total = row["total"].as_u64().unwrap_or(0);
            let completed = row["completed"].as_f64().unwrap_or(0.0);
            out.push(CompletionRate {
                course_id: row["_id"].as_str().unwrap_or_default().to_string(),
                total_enrolled: total,
                completion_rate: if total == 0 {
                    0.0
                } else {
                    completed / total as f64
                },
            });
        }
        Ok(out)
    }

    /// Top N students by average grade, descending.
    pub fn top_performing_students(&self, limit: usize) -> Result<Vec<StudentGrade>> {
        let rows = self
            .store
            .aggregate("submissions", &grade_per_student_stages(Some(limit)))?;
        rows_to(rows)
    }

    /// Distinct students and courses taught, per instructor.
    pub fn students_per_instructor(&self) -> Result<Vec<InstructorStudents>> {
        let rows = self.store.aggregate(
            "enrollments",
            &[
                Stage::Lookup {
                    from: "courses".into(),
                    local_field: "courseId".into(),
                    foreign_field: "courseId".into(),
                    as_field: "course".into(),
                },
                Stage::Unwind {
                    path: "course".into(),
                    preserve_empty: false,
                },
                Stage::Group {
                    key: GroupKey::Field("course.instructorId".into()),
                    accumulators: vec![
                        ("students".into(), Accumulator::AddToSet("studentId".into())),
                        (
                            "coursesTaught".into(),
                            Accumulator::AddToSet("course.courseId".into()),
                        ),
                    ],
                },
            ],
        )?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let students = row["students"].as_array().map(Vec::len).unwrap_or(0);
            out.push(InstructorStudents {
                instructor_id: row["_id"].as_str().unwrap_or_default().to_string(),
                total_students: students as u64,
                courses_taught: serde_json::from_value(row["coursesTaught"].clone())?,
            });
        }
        Ok(out)
    }

    /// Average course rating per instructor, with the instructor resolved.
    pub fn average_rating_per_instructor(&self) -> Result<Vec<InstructorRating>> {
        let rows = self.store.aggregate(
            "courses",
            &[
                Stage::Group {
                    key: GroupKey::Field("instructorId".into()),
                    accumulators: vec![
                        ("averageRating".into(), Accumulator::Avg("rating".into())),
                        ("courses".into(), Accumulator::Push("title".into())),
                    ],
                },
                Stage::Lookup {
                    from: "users".into(),
                    local_field: "_id".into(),
                    foreign_field: "userId".into(),
                    as_field: "instructor".into(),
                },
                Stage::Unwind {
                    path: "instructor".into(),
                    preserve_empty: false,
                },
                Stage::Project(vec![
                    ProjectField::path("instructorId", "_id"),
                    instructor_name_field(),
                    ProjectField::path("averageRating", "averageRating"),
                    ProjectField::path("courses", "courses"),
                ]),
            ],
        )?;
        rows_to(rows)
    }

    /// Revenue per instructor: the sum of course prices over enrollments.
    pub fn revenue_per_instructor(&self) -> Result<Vec<InstructorRevenue>> {
        let rows = self.store.aggregate(
            "enrollments",
            &[
                Stage::Lookup {
                    from: "courses".into(),
                    local_field: "courseId".into(),
                    foreign_field: "courseId".into(),
                    as_field: "course".into(),
                },
                Stage::Unwind {
                    path: "course".into(),
                    preserve_empty: false,
                },
                Stage::Group {
                    key: GroupKey::Field("course.instructorId".into()),
                    accumulators: vec![
                        ("revenue".into(), Accumulator::Sum("course.price".into())),
                        (
                            "courses".into(),
                            Accumulator::AddToSet("course.courseId".into()),
                        ),
                    ],
                },
                Stage::Lookup {
                    from: "users".into(),
                    local_field: "_id".into(),
                    foreign_field: "userId".into(),
                    as_field: "instructor".into(),
                },
                Stage::Unwind {
                    path: "instructor".into(),
                    preserve_empty: false,
                },
                Stage::Project(vec![
                    ProjectField::path("instructorId", "_id"),
                    instructor_name_field(),
                    ProjectField::path("revenue", "revenue"),
                    ProjectField::path("courses", "courses"),
                ]),
            ],
        )?;
        rows_to(rows)
    }

    /// Enrollment counts per calendar month, chronological.
    pub fn monthly_enrollment_trend(&self) -> Result<Vec<MonthlyEnrollments>> {
        let rows = self.store.aggregate(
            "enrollments",
            &[
                Stage::Match(Filter::Exists("enrollmentDate".into(), true)),
                Stage::Group {
                    key: GroupKey::YearMonth("enrollmentDate".into()),
                    accumulators: vec![("totalEnrollments".into(), Accumulator::Count)],
                },
                Stage::Sort {
                    keys: vec![SortKey::asc("_id.year"), SortKey::asc("_id.month")],
                },
                Stage::Project(vec![
                    ProjectField::path("year", "_id.year"),
                    ProjectField::path("month", "_id.month"),
                    ProjectField::path("totalEnrollments", "totalEnrollments"),
                ]),
            ],
        )?;
        rows_to(rows)
    }

    /// Most popular categories by course count, descending.
    pub fn popular_categories(&self, limit: usize) -> Result<Vec<CategoryCount>> {
        let rows = self.store.aggregate(
            "courses",
            &[
                Stage::Group {
                    key: GroupKey::Field("category".into()),
                    accumulators: vec![("totalCourses".into(), Accumulator::Count)],
                },
                Stage::Sort {
                    keys: vec![SortKey::desc("totalCourses")],
                },
                Stage::Limit(limit),
                Stage::Project(vec![
                    ProjectField::path("category", "_id"),
                    ProjectField::path("totalCourses", "totalCourses"),
                ]),
            ],
        )?;
        rows_to(rows)
    }

    /// Submission counts and average grade per student.
    pub fn student_engagement(&self) -> Result<Vec<EngagementMetrics>> {
        let rows = self.store.aggregate(
            "submissions",
            &[
                Stage::Group {
                    key: GroupKey::Field("studentId".into()),
                    accumulators: vec![
                        ("totalSubmissions".into(), Accumulator::Count),
                        ("averageGrade".into(), Accumulator::Avg("grade".into())),
                    ],
                },
                Stage::Lookup {
                    from: "users".into(),
                    local_field: "_id".into(),
                    foreign_field: "userId".into(),
                    as_field: "student".into(),
                },
                Stage::Unwind {
                    path: "student".into(),
                    preserve_empty: false,
                },
                Stage::Project(vec![
                    ProjectField::path("studentId", "_id"),
                    student_name_field(),
                    ProjectField::path("totalSubmissions", "totalSubmissions"),
                    ProjectField::path("averageGrade", "averageGrade"),
                ]),
            ],
        )?;
        rows_to(rows)
    }
}

/// Group submissions per student, optionally sorted and limited for the
/// top-performers variant. The sort/limit run before the user lookup so
/// only the surviving rows are joined.
fn grade_per_student_stages(limit: Option<usize>) -> Vec<Stage> {
    let mut stages = vec![Stage::Group {
        key: GroupKey::Field("studentId".into()),
        accumulators: vec![
            ("averageGrade".into(), Accumulator::Avg("grade".into())),
            ("submissions".into(), Accumulator::Count),
        ],
    }];

    if let Some(n) = limit {
        stages.push(Stage::Sort {
            keys: vec![SortKey::desc("averageGrade")],
        });
        stages.push(Stage::Limit(n));
    }

    stages.push(Stage::Lookup {
        from: "users".into(),
        local_field: "_id".into(),
        foreign_field: "userId".into(),
        as_field: "student".into(),
    });
    stages.push(Stage::Unwind {
        path: "student".into(),
        preserve_empty: false,
    });
    stages.push(Stage::Project(vec![
        ProjectField::path("studentId", "_id"),
        student_name_field(),
        ProjectField::path("averageGrade", "averageGrade"),
        ProjectField::path("submissions", "submissions"),
    ]));

    stages
}

fn student_name_field() -> ProjectField {
    ProjectField::concat(
        "studentName",
        vec![
            ProjectSource::path("student.firstName"),
            ProjectSource::literal(" "),
            ProjectSource::path("student.lastName"),
        ],
    )
}

fn instructor_name_field() -> ProjectField {
    ProjectField::concat(
        "instructorName",
        vec![
            ProjectSource::path("instructor.firstName"),
            ProjectSource::literal(" "),
            ProjectSource::path("instructor.lastName"),
        ],
    )
}

fn typed<T: DeserializeOwned>(doc: Document) -> Result<T> {
    serde_json::from_value(doc.data).map_err(EduHubError::from)
}

fn docs_to<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>> {
    docs.into_iter().map(typed).collect()
}

fn rows_to<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    serde_json::from_value(Value::Array(rows)).map_err(EduHubError::from)
}
