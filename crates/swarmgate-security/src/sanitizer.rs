/// Outcome of content validation: either clean or a list of violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Content passed all checks.
    Valid,
    /// Content was rejected; each entry names one violated rule.
    Invalid(Vec<String>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    /// The violation list, empty when valid.
    pub fn violations(&self) -> &[String] {
        match self {
            Validation::Valid => &[],
            Validation::Invalid(v) => v,
        }
    }
}

/// Content validation and sanitization seam consumed by the message router.
pub trait ContentGuard: Send + Sync {
    /// Check content against policy without modifying it.
    fn validate(&self, content: &str) -> Validation;

    /// Normalize content for storage and delivery.
    fn sanitize(&self, content: &str) -> String;
}

/// Default content guard: strips control characters and enforces length
/// and non-emptiness limits to prevent log poisoning and oversized frames.
pub struct Sanitizer {
    max_content_length: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_content_length: 100_000,
        }
    }
}

impl Sanitizer {
    pub fn new(max_content_length: usize) -> Self {
        Self { max_content_length }
    }
}

impl ContentGuard for Sanitizer {
    fn validate(&self, content: &str) -> Validation {
        let mut violations = Vec::new();

        if content.is_empty() {
            violations.push("content must not be empty".to_string());
        }
        if content.len() > self.max_content_length {
            violations.push(format!(
                "content exceeds maximum length of {} bytes",
                self.max_content_length
            ));
        }

        let stripped = self.sanitize(content);
        if stripped.is_empty() && !content.is_empty() {
            violations.push("content contains only control characters".to_string());
        }

        if violations.is_empty() {
            Validation::Valid
        } else {
            Validation::Invalid(violations)
        }
    }

    fn sanitize(&self, content: &str) -> String {
        content
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect()
    }
}
