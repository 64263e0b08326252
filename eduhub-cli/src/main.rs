use clap::{Parser, Subcommand, ValueEnum};
use eduhub::schema::default_schema;
use eduhub::{index, seed, Filter, Store};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;

/// Built-in sample dataset used by `seed` when no file is given.
const SAMPLE_DATA: &str = include_str!("../data/sample_data.json");

/// EduHub CLI — interact with an EduHub store from the command line
#[derive(Parser)]
#[command(name = "eduhub", version, about)]
struct Cli {
    /// Path to the store snapshot file (created on first write)
    #[arg(long, default_value = "eduhub.json")]
    data: PathBuf,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Load sample data into the store
    Seed {
        /// Sample data file (defaults to the built-in dataset)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Get a single document by ID
    Get {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
    },

    /// List documents in a collection
    List {
        /// Collection name
        collection: String,
        /// Field filters (e.g. --filter role=student)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// Insert a new document
    Insert {
        /// Collection name
        collection: String,
        /// Field values (e.g. --field email=alice@example.com)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update fields of an existing document
    Update {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
        /// Field values to set (e.g. --field isPublished=true)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a document (only collections that allow hard deletes)
    Delete {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
    },

    /// Run a named parameterized query
    Query {
        /// Query name (e.g. active-students, courses-by-category)
        name: String,
        /// Query parameters (e.g. --param category=Programming)
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },

    /// Run a named aggregation report
    Report {
        /// Report name (e.g. enrollment-metrics, top-students)
        name: String,
        /// Report parameters (e.g. --param limit=5)
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },

    /// Check all documents against the schema
    Validate,

    /// Show collection stats
    Status,

    /// List declared indexes
    Indexes {
        /// Also register the recommended index set first
        #[arg(long)]
        recommended: bool,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        // Machine-readable error on stderr for scripting
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&cli.data)?;

    match cli.command {
        Command::Seed { file } => {
            let data = match file {
                Some(path) => seed::load_sample_data(&path)?,
                None => serde_json::from_str(SAMPLE_DATA)?,
            };
            let report = seed::seed(&store, &data)?;
            store.save(&cli.data)?;
            print_output(&serde_json::to_value(&report)?, &cli.format);
        }

        Command::Get { collection, id } => {
            let doc = store.collection(&collection)?.get(&id);
            match doc {
                Some(doc) => print_output(&doc.data, &cli.format),
                None => print_output(&serde_json::Value::Null, &cli.format),
            }
        }

        Command::List {
            collection,
            filters,
        } => {
            let filter = filters_to_filter(&filters);
            let docs = store.collection(&collection)?.find(&filter)?;
            let data: Vec<_> = docs.into_iter().map(|d| d.data).collect();
            print_output(&serde_json::Value::Array(data), &cli.format);
        }

        Command::Insert { collection, fields } => {
            let data = fields_to_value(&fields);
            let id = store.collection(&collection)?.insert(data)?;
            store.save(&cli.data)?;
            print_output(&serde_json::json!({ "id": id }), &cli.format);
        }

        Command::Update {
            collection,
            id,
            fields,
        } => {
            let data = fields_to_value(&fields);
            let report = store.collection(&collection)?.update(&id, data)?;
            store.save(&cli.data)?;
            print_output(
                &serde_json::json!({
                    "matched": report.matched,
                    "modified": report.modified,
                }),
                &cli.format,
            );
        }

        Command::Delete { collection, id } => {
            let deleted = store.collection(&collection)?.delete(&id)?;
            store.save(&cli.data)?;
            print_output(&serde_json::json!({ "deleted": deleted }), &cli.format);
        }

        Command::Query { name, params } => {
            let params: HashMap<String, String> = params.into_iter().collect();
            let result = run_query(&store, &name, &params)?;
            print_output(&result, &cli.format);
        }

        Command::Report { name, params } => {
            let params: HashMap<String, String> = params.into_iter().collect();
            let result = run_report(&store, &name, &params)?;
            print_output(&result, &cli.format);
        }

        Command::Validate => {
            print_output(&store.validate_all(), &cli.format);
        }

        Command::Status => {
            print_output(&store.status(), &cli.format);
        }

        Command::Indexes { recommended } => {
            if recommended {
                store.register_indexes(index::recommended_indexes());
            }
            print_output(&serde_json::to_value(store.indexes())?, &cli.format);
        }
    }

    Ok(())
}

fn open_store(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(Store::load(path, default_schema())?)
    } else {
        Ok(Store::open_default())
    }
}

fn run_query(
    store: &Store,
    name: &str,
    params: &HashMap<String, String>,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let catalog = store.catalog();

    let value = match name {
        "find-user" => serde_json::to_value(catalog.find_user(require(params, "id")?)?)?,
        "find-user-by-email" => {
            serde_json::to_value(catalog.find_user_by_email(require(params, "email")?)?)?
        }
        "active-students" => serde_json::to_value(catalog.active_students()?)?,
        "courses-by-category" => {
            serde_json::to_value(catalog.courses_by_category(require(params, "category")?)?)?
        }
        "courses-in-price-range" => {
            let min: f64 = require(params, "min")?.parse()?;
            let max: f64 = require(params, "max")?.parse()?;
            serde_json::to_value(catalog.courses_in_price_range(min, max)?)?
        }
        "courses-with-keywords" => {
            let raw = require(params, "keywords")?;
            let keywords: Vec<&str> = raw.split(',').map(str::trim).collect();
            serde_json::to_value(catalog.courses_with_keywords(&keywords)?)?
        }
        "recent-signups" => {
            let since = require(params, "since")?.parse()?;
            serde_json::to_value(catalog.recent_signups(since)?)?
        }
        "assignments-due-between" => {
            let from = require(params, "from")?.parse()?;
            let to = require(params, "to")?.parse()?;
            serde_json::to_value(catalog.assignments_due_between(from, to)?)?
        }
        "search-courses" => {
            serde_json::to_value(catalog.search_courses_by_title(require(params, "text")?)?)?
        }
        "course-details" => serde_json::to_value(catalog.course_details()?)?,
        "students-in-course" => {
            serde_json::to_value(catalog.students_in_course(require(params, "course")?)?)?
        }
        other => {
            return Err(format!(
                "unknown query '{other}' (try: find-user, find-user-by-email, \
                 active-students, courses-by-category, courses-in-price-range, \
                 courses-with-keywords, recent-signups, assignments-due-between, \
                 search-courses, course-details, students-in-course)"
            )
            .into())
        }
    };

    Ok(value)
}

fn run_report(
    store: &Store,
    name: &str,
    params: &HashMap<String, String>,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let catalog = store.catalog();

    let value = match name {
        "enrollment-metrics" => serde_json::to_value(catalog.enrollment_metrics()?)?,
        "average-course-rating" => serde_json::to_value(catalog.average_course_rating()?)?,
        "courses-by-category" => serde_json::to_value(catalog.courses_grouped_by_category()?)?,
        "grades-per-student" => serde_json::to_value(catalog.average_grade_per_student()?)?,
        "completion-rate" => serde_json::to_value(catalog.course_completion_rate()?)?,
        "top-students" => {
            let limit = limit_param(params, 10)?;
            serde_json::to_value(catalog.top_performing_students(limit)?)?
        }
        "students-per-instructor" => serde_json::to_value(catalog.students_per_instructor()?)?,
        "instructor-ratings" => serde_json::to_value(catalog.average_rating_per_instructor()?)?,
        "instructor-revenue" => serde_json::to_value(catalog.revenue_per_instructor()?)?,
        "monthly-trend" => serde_json::to_value(catalog.monthly_enrollment_trend()?)?,
        "popular-categories" => {
            let limit = limit_param(params, 10)?;
            serde_json::to_value(catalog.popular_categories(limit)?)?
        }
        "engagement" => serde_json::to_value(catalog.student_engagement()?)?,
        other => {
            return Err(format!(
                "unknown report '{other}' (try: enrollment-metrics, \
                 average-course-rating, courses-by-category, grades-per-student, \
                 completion-rate, top-students, students-per-instructor, \
                 instructor-ratings, instructor-revenue, monthly-trend, \
                 popular-categories, engagement)"
            )
            .into())
        }
    };

    Ok(value)
}

fn require<'a>(
    params: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, Box<dyn std::error::Error>> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| format!("missing required parameter '{key}'").into())
}

fn limit_param(
    params: &HashMap<String, String>,
    default: usize,
) -> Result<usize, Box<dyn std::error::Error>> {
    match params.get("limit") {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(default),
    }
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).unwrap());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value).unwrap());
        }
    }
}

fn filters_to_filter(filters: &[(String, String)]) -> Filter {
    Filter::And(
        filters
            .iter()
            .map(|(key, val)| {
                // Parse numbers and booleans so --filter price=50 compares numerically
                let json_val =
                    serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
                Filter::Eq(key.clone(), json_val)
            })
            .collect(),
    )
}

fn fields_to_value(fields: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, val) in fields {
        // Try to parse as JSON value (for numbers, booleans, arrays, objects)
        let json_val = serde_json::from_str(val).unwrap_or(serde_json::Value::String(val.clone()));
        map.insert(key.clone(), json_val);
    }
    serde_json::Value::Object(map)
}
