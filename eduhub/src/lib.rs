pub mod catalog;
pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod model;
pub mod pipeline;
pub mod schema;
pub mod seed;
pub mod store;
pub mod validation;

pub use document::Document;
pub use error::{EduHubError, Result};
pub use filter::Filter;
pub use pipeline::Stage;
pub use schema::SchemaDefinition;
pub use store::{Store, UpdateReport};
