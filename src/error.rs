use thiserror::Error;

/// Error taxonomy for every failure surface the engine exposes: registry
/// validation, parameter binding, dynamic SQL evaluation, driver execution,
/// result mapping, session lifecycle, and interceptor dispatch.
#[derive(Error, Debug)]
pub enum SqlweaveError {
    /// Raised at registry freeze when references don't resolve: missing
    /// parent ResultMap, unknown cache namespace, duplicate MappedStatement
    /// id, or a mapping declaring both `nested_query_id` and
    /// `nested_result_map_id`. Fatal — the factory refuses to build.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transient variant used only while a mapper file is loading, for a
    /// reference that may resolve once the rest of the file is read. Never
    /// escapes `Environment::freeze` — it upgrades to `Configuration` there.
    #[error("incomplete element: {0}")]
    IncompleteElement(String),

    /// Invoked statement id not found, or a parameter name didn't resolve
    /// against the parameter object.
    #[error("binding error: {0}")]
    Binding(String),

    /// The underlying driver call failed. Carries the statement id and the
    /// finalized SQL (never the bound values) alongside the driver's message.
    #[error("execution error on statement '{statement_id}': {source} (sql: {sql})")]
    Execution {
        statement_id: String,
        sql: String,
        #[source]
        source: Box<SqlweaveError>,
    },

    /// A required non-null column was null, a type-handler conversion
    /// failed, or `select_one` matched more than one row.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// An operation was attempted on a session that is already closed.
    #[error("session is closed")]
    SessionClosed,

    /// An interceptor raised an error; tagged with the interceptor's name so
    /// the fault can be attributed to the plugin that caused it.
    #[error("interceptor '{interceptor}' failed: {source}")]
    Interceptor {
        interceptor: String,
        #[source]
        source: Box<SqlweaveError>,
    },

    /// Transport-level failure: connection acquisition, I/O, or a driver
    /// reporting something outside the taxonomy above.
    #[error("driver error: {0}")]
    Driver(String),
}

impl serde::ser::Error for SqlweaveError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        SqlweaveError::Mapping(msg.to_string())
    }
}

impl serde::de::Error for SqlweaveError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        SqlweaveError::Mapping(msg.to_string())
    }
}
