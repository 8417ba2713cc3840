use super::base::ToolContext;
use uuid::Uuid;

impl ToolContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    /// Context for a one-off call (CLI, tests) with a fresh request id
    pub fn detached() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_contexts_get_distinct_ids() {
        let a = ToolContext::detached();
        let b = ToolContext::detached();
        assert_ne!(a.request_id, b.request_id);
        assert!(Uuid::parse_str(&a.request_id).is_ok());
        assert_eq!(ToolContext::new("req-1").request_id, "req-1");
    }
}
