use uuid::Uuid;

/// Correlation ID that follows a request through the engine and its logs.
#[derive(Clone, Debug)]
pub struct TraceId(Uuid);

impl Default for TraceId {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}
