//! Job domain types for image generation requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// Transitions only move forward: `Pending -> Running -> Succeeded | Failed`.
/// A job may also fail straight from `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        )
    }

    /// All states a job may be in right before entering `target`.
    pub fn sources_of(target: JobState) -> Vec<JobState> {
        JobState::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }

    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Running,
        JobState::Succeeded,
        JobState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result attached to a job once it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Name of the stored artifact.
    Image { image_ref: String },
    /// Human-readable failure description.
    Error { detail: String },
}

/// A single prompt-to-image request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub prompt: String,
    pub model: String,
    pub state: JobState,
    /// Present iff `state` is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            prompt: prompt.into(),
            model: model.into(),
            state: JobState::Pending,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name of the stored image, if the job succeeded.
    pub fn image_ref(&self) -> Option<&str> {
        match &self.outcome {
            Some(JobOutcome::Image { image_ref }) => Some(image_ref),
            _ => None,
        }
    }

    /// Failure detail, if the job failed.
    pub fn error_detail(&self) -> Option<&str> {
        match &self.outcome {
            Some(JobOutcome::Error { detail }) => Some(detail),
            _ => None,
        }
    }

    /// Check that the outcome agrees with the state.
    pub fn is_consistent(&self) -> bool {
        match (self.state, &self.outcome) {
            (JobState::Pending | JobState::Running, None) => true,
            (JobState::Succeeded, Some(JobOutcome::Image { .. })) => true,
            (JobState::Failed, Some(JobOutcome::Error { .. })) => true,
            _ => false,
        }
    }
}

const PROMPT_PREVIEW_CHARS: usize = 32;

/// Shorten a prompt for log lines.
pub fn redact_prompt(prompt: &str) -> String {
    let total = prompt.chars().count();
    if total <= PROMPT_PREVIEW_CHARS {
        return prompt.to_string();
    }
    let head: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
    format!("{head}... ({total} chars)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_monotonic() {
        use JobState::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));

        assert!(!Running.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Succeeded));
        for terminal in [Succeeded, Failed] {
            for next in JobState::ALL {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn sources_of_failed_are_both_live_states() {
        assert_eq!(
            JobState::sources_of(JobState::Failed),
            vec![JobState::Pending, JobState::Running]
        );
        assert_eq!(
            JobState::sources_of(JobState::Succeeded),
            vec![JobState::Running]
        );
        assert!(JobState::sources_of(JobState::Pending).is_empty());
    }

    #[test]
    fn state_serializes_upper_case() {
        let json = serde_json::to_string(&JobState::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
        let parsed: JobState = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(parsed, JobState::Running);
    }

    #[test]
    fn new_job_is_pending_without_outcome() {
        let job = Job::new("a red fox", "stable-diffusion");
        assert_eq!(job.state, JobState::Pending);
        assert!(job.outcome.is_none());
        assert!(job.is_consistent());
        assert_ne!(job.id, Job::new("a red fox", "stable-diffusion").id);
    }

    #[test]
    fn outcome_must_match_state() {
        let mut job = Job::new("p", "m");
        job.state = JobState::Succeeded;
        assert!(!job.is_consistent());

        job.outcome = Some(JobOutcome::Image {
            image_ref: "x.png".into(),
        });
        assert!(job.is_consistent());
        assert_eq!(job.image_ref(), Some("x.png"));
        assert_eq!(job.error_detail(), None);

        job.state = JobState::Failed;
        assert!(!job.is_consistent());
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
        assert!(JobId::parse("../../etc/passwd").is_err());
    }

    #[test]
    fn long_prompts_are_shortened() {
        assert_eq!(redact_prompt("a red fox"), "a red fox");

        let long = "x".repeat(100);
        let redacted = redact_prompt(&long);
        assert!(redacted.starts_with(&"x".repeat(PROMPT_PREVIEW_CHARS)));
        assert!(redacted.ends_with("(100 chars)"));
    }
}
