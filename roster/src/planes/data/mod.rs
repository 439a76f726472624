pub mod registration_operations;
pub mod registration_queries;

pub use registration_operations::RegistrationOperations;
pub use registration_queries::RegistrationQueries;
