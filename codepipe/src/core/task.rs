//! The unit of work a pipeline processes.

use super::TaskStatus;
use crate::errors::{PipelineError, PipelineResult};
use crate::utils::{generate_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// A coding task: what to build, and under which constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: String,
    /// One-line description.
    pub description: String,
    /// Requirements; never empty.
    pub requirements: Vec<String>,
    /// Constraints.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Ids of context items relevant to the task.
    #[serde(default)]
    pub context_ids: Vec<String>,
    /// Lifecycle status.
    #[serde(default)]
    status: TaskStatus,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Task {
    /// Creates a pending task with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the description is blank or there are no
    /// requirements.
    pub fn new(
        description: impl Into<String>,
        requirements: Vec<String>,
    ) -> PipelineResult<Self> {
        Self::with_id(generate_id(), description, requirements)
    }

    /// Creates a pending task with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        description: impl Into<String>,
        requirements: Vec<String>,
    ) -> PipelineResult<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Task description cannot be empty".to_string(),
            ));
        }
        if requirements.is_empty() {
            return Err(PipelineError::Validation(
                "At least one requirement must be specified".to_string(),
            ));
        }

        Ok(Self {
            id: id.into(),
            description,
            requirements,
            constraints: Vec::new(),
            context_ids: Vec::new(),
            status: TaskStatus::Pending,
            created_at: now_utc(),
        })
    }

    /// Sets the constraints.
    #[must_use]
    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Sets the related context item ids.
    #[must_use]
    pub fn with_context_ids(mut self, context_ids: Vec<String>) -> Self {
        self.context_ids = context_ids;
        self
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Moves the task to `next`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when `next` is not reachable from the current status.
    pub fn transition_to(&mut self, next: TaskStatus) -> PipelineResult<()> {
        if !self.status.can_transition_to(next) {
            let valid: Vec<String> = self
                .status
                .allowed_transitions()
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(PipelineError::Validation(format!(
                "Invalid status transition from {} to {next}. Valid transitions: {}",
                self.status,
                valid.join(", ")
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Parses free-form user input into a task.
    ///
    /// The first non-empty line is the description. Lines under a header
    /// ending in `:` whose name mentions "requirement" or "constraint" are
    /// collected into that list, with `-`/`*` bullets stripped. Without such
    /// sections every later non-header line is a requirement, and without any
    /// the description itself becomes the only requirement.
    pub fn parse_from_user_input(input: &str) -> PipelineResult<Self> {
        let lines: Vec<&str> = input.trim().lines().map(str::trim).collect();
        let description = lines
            .iter()
            .find(|line| !line.is_empty())
            .map(|line| (*line).to_string())
            .unwrap_or_default();

        let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
        for line in lines.iter().filter(|line| !line.is_empty()) {
            if line.ends_with(':') {
                let header = line.trim_end_matches(':').trim().to_lowercase();
                sections.push((header, Vec::new()));
            } else if let Some((_, body)) = sections.last_mut() {
                body.push(*line);
            }
        }

        let mut requirements = Vec::new();
        let mut constraints = Vec::new();
        for (header, body) in &sections {
            if header.contains("requirement") {
                requirements.extend(body.iter().map(|line| strip_bullet(line)));
            } else if header.contains("constraint") {
                constraints.extend(body.iter().map(|line| strip_bullet(line)));
            }
        }

        if requirements.is_empty() && constraints.is_empty() {
            requirements = lines
                .iter()
                .skip(1)
                .filter(|line| !line.is_empty() && !line.ends_with(':'))
                .map(|line| strip_bullet(line))
                .collect();
        }

        if requirements.is_empty() {
            requirements.push(description.clone());
        }

        Ok(Self::new(description, requirements)?.with_constraints(constraints))
    }
}

fn strip_bullet(line: &str) -> String {
    line.strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .unwrap_or(line)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new("Build a CLI", vec!["parse args".to_string()]).unwrap();
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(task.constraints.is_empty());
        assert!(!task.id.is_empty());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Task::new("  ", vec!["r".to_string()]),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            Task::new("desc", Vec::new()),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_status_transitions() {
        let mut task = Task::new("desc", vec!["r".to_string()]).unwrap();
        assert!(task.transition_to(TaskStatus::Completed).is_err());

        task.transition_to(TaskStatus::InProgress).unwrap();
        task.transition_to(TaskStatus::Failed).unwrap();
        task.transition_to(TaskStatus::InProgress).unwrap();
        task.transition_to(TaskStatus::Completed).unwrap();

        let err = task.transition_to(TaskStatus::InProgress).unwrap_err();
        assert!(err.to_string().contains("from completed to in_progress"));
    }

    #[test]
    fn test_parse_with_sections() {
        let input = "Build a todo API\n\nRequirements:\n- create items\n* list items\n\nConstraints:\n- no unsafe code\n";
        let task = Task::parse_from_user_input(input).unwrap();

        assert_eq!(task.description, "Build a todo API");
        assert_eq!(task.requirements, vec!["create items", "list items"]);
        assert_eq!(task.constraints, vec!["no unsafe code"]);
    }

    #[test]
    fn test_parse_without_sections() {
        let input = "Write a parser\n- handle numbers\nhandle strings";
        let task = Task::parse_from_user_input(input).unwrap();

        assert_eq!(task.requirements, vec!["handle numbers", "handle strings"]);
        assert!(task.constraints.is_empty());
    }

    #[test]
    fn test_parse_description_only() {
        let task = Task::parse_from_user_input("Refactor the logger").unwrap();
        assert_eq!(task.requirements, vec!["Refactor the logger"]);
    }

    #[test]
    fn test_parse_empty_input_fails() {
        assert!(Task::parse_from_user_input("   ").is_err());
    }
}
